//! Aggregate function family: `sum, product, min, max, count, first, last,
//! average, and, or`, reducing a variadic list of numeric expressions
//! (spec.md §4.4). Non-numeric (including control-token) parameters are
//! silently skipped rather than coercing to zero, matching the original's
//! "if v1.type == NUMERIC" guard (SPEC_FULL.md §B.4).
//!
//! `product` starts its accumulator at `0.0`, the same as every other
//! aggregate, so `PRODUCT(...)` is always `0.0` — spec.md §9 flags this as
//! an open choice and SPEC_FULL.md §B.4 documents the decision to preserve
//! it bug-for-bug rather than special-case an identity seed.

use crate::ast::Node;
use crate::cube::Cube;
use crate::error::ValidationError;
use crate::history::RuleHistory;
use crate::ids::CellPath;
use crate::value::{RuleValue, ValueType};

const NAMES: &[&str] = &[
    "SUM", "PRODUCT", "MIN", "MAX", "COUNT", "FIRST", "LAST", "AVERAGE", "AND", "OR",
];

pub fn is_aggregate(name: &str) -> bool {
    NAMES.contains(&name.to_ascii_uppercase().as_str())
}

pub fn validate(name: &str, param_types: &[ValueType]) -> Option<Result<ValueType, ValidationError>> {
    if !is_aggregate(name) {
        return None;
    }
    Some(if param_types.is_empty() {
        Err(ValidationError::new(format!(
            "'{name}' requires at least one argument"
        )))
    } else {
        Ok(ValueType::Numeric)
    })
}

pub fn evaluate(
    name: &str,
    params: &[Node],
    path: &CellPath,
    cube: &dyn Cube,
    user: Option<&str>,
    history: &mut RuleHistory,
) -> RuleValue {
    let values: Vec<f64> = params
        .iter()
        .filter_map(|p| p.get_value(path, cube, user, history).as_numeric())
        .collect();

    let result = match name.to_ascii_uppercase().as_str() {
        "SUM" => values.iter().sum(),
        "PRODUCT" => {
            // acc starts at 0.0 -- see module docs.
            let mut acc = 0.0;
            for v in &values {
                acc *= v;
            }
            acc
        }
        "MIN" => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().cloned().fold(f64::INFINITY, f64::min)
            }
        }
        "MAX" => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            }
        }
        "COUNT" => values.len() as f64,
        "FIRST" => values.first().copied().unwrap_or(0.0),
        "LAST" => values.last().copied().unwrap_or(0.0),
        "AVERAGE" => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
        "AND" => {
            let mut acc = 0.0f64;
            for v in &values {
                if *v == 0.0 {
                    acc = 1.0;
                }
            }
            1.0 - acc
        }
        "OR" => {
            let mut acc = 0.0f64;
            for v in &values {
                if *v != 0.0 {
                    acc = 1.0;
                }
            }
            acc
        }
        _ => 0.0,
    };
    RuleValue::numeric(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::test_fixtures::sample_cube;

    fn eval(name: &str, vals: &[f64]) -> f64 {
        let cube = sample_cube();
        let mut history = RuleHistory::new();
        let path = cube.classify_path(vec![1, 0, 1]);
        let params: Vec<Node> = vals.iter().map(|v| Node::Double(*v)).collect();
        evaluate(name, &params, &path, &cube, None, &mut history)
            .as_numeric()
            .unwrap()
    }

    #[test]
    fn sum_adds_all() {
        assert_eq!(eval("SUM", &[1.0, 2.0, 3.0]), 6.0);
    }

    #[test]
    fn product_is_always_zero() {
        assert_eq!(eval("PRODUCT", &[2.0, 3.0, 4.0]), 0.0);
    }

    #[test]
    fn count_of_empty_is_zero() {
        let cube = sample_cube();
        let mut history = RuleHistory::new();
        let path = cube.classify_path(vec![1, 0, 1]);
        let result = evaluate("COUNT", &[], &path, &cube, None, &mut history);
        assert_eq!(result.as_numeric(), Some(0.0));
    }

    #[test]
    fn average_divides_by_count() {
        assert_eq!(eval("AVERAGE", &[2.0, 4.0, 6.0]), 4.0);
    }

    #[test]
    fn and_is_inverse_logic() {
        assert_eq!(eval("AND", &[1.0, 1.0, 1.0]), 1.0);
        assert_eq!(eval("AND", &[1.0, 0.0, 1.0]), 0.0);
    }

    #[test]
    fn or_true_on_any_nonzero() {
        assert_eq!(eval("OR", &[0.0, 0.0, 1.0]), 1.0);
        assert_eq!(eval("OR", &[0.0, 0.0]), 0.0);
    }
}
