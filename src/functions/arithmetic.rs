//! Arithmetic operators: `+ - * /` as binary function calls, `+`/`-` also
//! accepted as unary (spec.md §4.3 grammar `unop`, §4.4 "arithmetic").
//! Control tokens (`STET`/`CONTINUE`) are never consumed as numeric zero —
//! they propagate through arithmetic untouched (spec.md §9 "Control-flow
//! value tokens").

use crate::ast::Node;
use crate::cube::Cube;
use crate::error::ValidationError;
use crate::history::RuleHistory;
use crate::ids::CellPath;
use crate::value::{RuleValue, ValueType};

const BINARY: &[&str] = &["+", "-", "*", "/"];

pub fn is_arithmetic(name: &str) -> bool {
    BINARY.contains(&name)
}

pub fn validate(name: &str, param_types: &[ValueType]) -> Option<Result<ValueType, ValidationError>> {
    if !is_arithmetic(name) {
        return None;
    }
    Some(match param_types.len() {
        1 if name == "+" || name == "-" => Ok(ValueType::Numeric),
        2 => Ok(ValueType::Numeric),
        n => Err(ValidationError::new(format!(
            "'{name}' takes 1 or 2 numeric operands, got {n}"
        ))),
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
    if params.len() == 1 {
        let v = params[0].get_value(path, cube, user, history);
        if v.is_control() {
            return v;
        }
        let n = v.as_numeric().unwrap_or(0.0);
        return RuleValue::numeric(if name == "-" { -n } else { n });
    }

    let lhs = params[0].get_value(path, cube, user, history);
    if lhs.is_control() {
        return lhs;
    }
    let rhs = params[1].get_value(path, cube, user, history);
    if rhs.is_control() {
        return rhs;
    }
    let a = lhs.as_numeric().unwrap_or(0.0);
    let b = rhs.as_numeric().unwrap_or(0.0);
    let result = match name {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" => {
            if b == 0.0 {
                0.0
            } else {
                a / b
            }
        }
        _ => unreachable!("is_arithmetic gated this branch"),
    };
    RuleValue::numeric(result)
}
