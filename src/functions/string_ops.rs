//! String-slicing functions (`LEFT`, `RIGHT`, `MID`) and the
//! dimension-transformation hooks the optimizer's textual-transform passes
//! use (spec.md §4.1 "isDimensionTransformation", §4.4).

use std::collections::HashMap;

use crate::ast::Node;
use crate::cube::{Cube, Element};
use crate::error::ValidationError;
use crate::history::RuleHistory;
use crate::ids::CellPath;
use crate::value::{RuleValue, ValueType};

const NAMES: &[&str] = &["LEFT", "RIGHT", "MID"];

pub fn is_string_op(name: &str) -> bool {
    NAMES.contains(&name.to_ascii_uppercase().as_str())
}

pub fn validate(name: &str, param_types: &[ValueType]) -> Option<Result<ValueType, ValidationError>> {
    if !is_string_op(name) {
        return None;
    }
    let upper = name.to_ascii_uppercase();
    let expected = if upper == "MID" { 3 } else { 2 };
    Some(if param_types.len() == expected {
        Ok(ValueType::String)
    } else {
        Err(ValidationError::new(format!(
            "'{name}' takes {expected} arguments, got {}",
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
    let source = params[0].get_value(path, cube, user, history);
    if source.is_control() {
        return source;
    }
    let s = source.as_string().unwrap_or("").to_string();

    match name.to_ascii_uppercase().as_str() {
        "LEFT" => {
            let n = params[1]
                .get_value(path, cube, user, history)
                .as_numeric()
                .unwrap_or(0.0) as usize;
            RuleValue::string(s.chars().take(n).collect::<String>())
        }
        "RIGHT" => {
            let n = params[1]
                .get_value(path, cube, user, history)
                .as_numeric()
                .unwrap_or(0.0) as usize;
            let len = s.chars().count();
            let skip = len.saturating_sub(n);
            RuleValue::string(s.chars().skip(skip).collect::<String>())
        }
        "MID" => {
            let start = params[1]
                .get_value(path, cube, user, history)
                .as_numeric()
                .unwrap_or(0.0) as usize;
            let len = params[2]
                .get_value(path, cube, user, history)
                .as_numeric()
                .unwrap_or(0.0) as usize;
            let start0 = start.saturating_sub(1); // spec-level 1-based index
            RuleValue::string(s.chars().skip(start0).take(len).collect::<String>())
        }
        _ => RuleValue::string(""),
    }
}

/// `true` if `node` is a string-slicing call over a `Variable` — the shape
/// the optimizer's textual transforms recognize (spec.md §4.1
/// `isDimensionTransformation`).
pub fn is_dimension_transformation(node: &Node) -> Option<usize> {
    let Node::FunctionCall { name, params } = node else {
        return None;
    };
    if !is_string_op(name) || params.is_empty() {
        return None;
    }
    match &params[0] {
        Node::Variable { dimension_index: Some(d), .. } => Some(*d),
        _ => None,
    }
}

/// `{element name -> transformed string}` for every element of the
/// transformation's dimension, evaluated as constants (all other operands
/// must already be constant for this hook to apply) — spec.md §4.1
/// `computeDimensionTransformations`.
pub fn compute_dimension_transformations(
    node: &Node,
    cube: &dyn Cube,
    dimension_index: usize,
) -> Option<HashMap<String, String>> {
    let Node::FunctionCall { name, params } = node else {
        return None;
    };
    let dim = cube.dimensions().into_iter().nth(dimension_index)?;
    let mut out = HashMap::new();
    for element in dim.get_elements() {
        let transformed = apply_string_op_literal(name, params, element.as_ref())?;
        out.insert(element.name().to_string(), transformed);
    }
    Some(out)
}

fn apply_string_op_literal(name: &str, params: &[Node], element: &dyn Element) -> Option<String> {
    let literal_int = |node: &Node| -> Option<usize> {
        match node {
            Node::Double(v) => Some(*v as usize),
            _ => None,
        }
    };
    let s = element.name();
    match name.to_ascii_uppercase().as_str() {
        "LEFT" => {
            let n = literal_int(&params[1])?;
            Some(s.chars().take(n).collect())
        }
        "RIGHT" => {
            let n = literal_int(&params[1])?;
            let len = s.chars().count();
            Some(s.chars().skip(len.saturating_sub(n)).collect())
        }
        "MID" => {
            let start = literal_int(&params[1])?;
            let len = literal_int(&params[2])?;
            Some(s.chars().skip(start.saturating_sub(1)).take(len).collect())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::test_fixtures::sample_cube;

    #[test]
    fn left_takes_prefix() {
        let cube = sample_cube();
        let mut history = RuleHistory::new();
        let path = cube.classify_path(vec![1, 0, 1]);
        let result = evaluate(
            "LEFT",
            &[Node::String("Revenue".into()), Node::Double(3.0)],
            &path,
            &cube,
            None,
            &mut history,
        );
        assert_eq!(result.as_string(), Some("Rev"));
    }

    #[test]
    fn mid_is_one_indexed() {
        let cube = sample_cube();
        let mut history = RuleHistory::new();
        let path = cube.classify_path(vec![1, 0, 1]);
        let result = evaluate(
            "MID",
            &[Node::String("Revenue".into()), Node::Double(2.0), Node::Double(3.0)],
            &path,
            &cube,
            None,
            &mut history,
        );
        assert_eq!(result.as_string(), Some("eve"));
    }
}
