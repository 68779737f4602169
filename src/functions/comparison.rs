//! Comparison operators, returning `1.0`/`0.0` (spec.md §4.4 "comparisons
//! returning 1.0/0.0"). Operands may be numeric or string; a numeric vs.
//! string comparison is always `false` rather than an error, matching the
//! permissive coercion the rest of the value model uses (e.g. missing cells
//! reading as zero rather than failing).

use crate::ast::Node;
use crate::cube::Cube;
use crate::error::ValidationError;
use crate::history::RuleHistory;
use crate::ids::CellPath;
use crate::value::{RuleValue, ValueType};

const OPS: &[&str] = &["<", "<=", "=", ">=", ">", "<>"];

pub fn is_comparison(name: &str) -> bool {
    OPS.contains(&name)
}

pub fn validate(name: &str, param_types: &[ValueType]) -> Option<Result<ValueType, ValidationError>> {
    if !is_comparison(name) {
        return None;
    }
    Some(if param_types.len() == 2 {
        Ok(ValueType::Numeric)
    } else {
        Err(ValidationError::new(format!(
            "'{name}' takes exactly 2 operands, got {}",
            param_types.len()
        )))
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
    let lhs = params[0].get_value(path, cube, user, history);
    if lhs.is_control() {
        return lhs;
    }
    let rhs = params[1].get_value(path, cube, user, history);
    if rhs.is_control() {
        return rhs;
    }

    let result = match (lhs.as_numeric(), rhs.as_numeric()) {
        (Some(a), Some(b)) => compare_numeric(name, a, b),
        _ => match (lhs.as_string(), rhs.as_string()) {
            (Some(a), Some(b)) => compare_string(name, a, b),
            _ => false,
        },
    };
    RuleValue::numeric(if result { 1.0 } else { 0.0 })
}

fn compare_numeric(op: &str, a: f64, b: f64) -> bool {
    match op {
        "<" => a < b,
        "<=" => a <= b,
        "=" => a == b,
        ">=" => a >= b,
        ">" => a > b,
        "<>" => a != b,
        _ => false,
    }
}

fn compare_string(op: &str, a: &str, b: &str) -> bool {
    match op {
        "<" => a < b,
        "<=" => a <= b,
        "=" => a == b,
        ">=" => a >= b,
        ">" => a > b,
        "<>" => a != b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::test_fixtures::sample_cube;

    #[test]
    fn string_equality_matches_variable_resolution() {
        let cube = sample_cube();
        let mut var = Node::variable("Year");
        var.validate(&crate::ast::ValidateContext::full(&cube)).unwrap();
        let node = Node::call("=", vec![var, Node::String("2024".into())]);
        let path = cube.classify_path(vec![1, 0, 0]);
        let mut history = RuleHistory::new();
        if let Node::FunctionCall { name, params } = &node {
            let result = evaluate(name, params, &path, &cube, None, &mut history);
            assert_eq!(result.as_numeric(), Some(1.0));
        }
    }
}
