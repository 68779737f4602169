//! `IF`, `STET`, `CONTINUE` (spec.md §4.4). `STET`/`CONTINUE` are the
//! control-flow tokens of spec.md §4.1 "STET / CONTINUE values"; `IF`
//! propagates whichever branch's control token as-is (spec.md §9).

use crate::ast::Node;
use crate::cube::Cube;
use crate::error::ValidationError;
use crate::history::RuleHistory;
use crate::ids::CellPath;
use crate::value::{RuleValue, ValueType};

pub fn is_control(name: &str) -> bool {
    matches!(name.to_ascii_uppercase().as_str(), "IF" | "STET" | "CONTINUE")
}

pub fn validate(name: &str, param_types: &[ValueType]) -> Option<Result<ValueType, ValidationError>> {
    match name.to_ascii_uppercase().as_str() {
        "IF" => Some(if param_types.len() == 3 {
            Ok(ValueType::Unknown)
        } else {
            Err(ValidationError::new(format!(
                "IF takes 3 arguments (cond, then, else), got {}",
                param_types.len()
            )))
        }),
        "STET" => Some(if param_types.is_empty() {
            Ok(ValueType::Stet)
        } else {
            Err(ValidationError::new("STET takes no arguments"))
        }),
        "CONTINUE" => Some(if param_types.is_empty() {
            Ok(ValueType::Continue)
        } else {
            Err(ValidationError::new("CONTINUE takes no arguments"))
        }),
        _ => None,
    }
}

pub fn evaluate(
    name: &str,
    params: &[Node],
    path: &CellPath,
    cube: &dyn Cube,
    user: Option<&str>,
    history: &mut RuleHistory,
) -> RuleValue {
    match name.to_ascii_uppercase().as_str() {
        "STET" => RuleValue::stet(),
        "CONTINUE" => RuleValue::continue_(),
        "IF" => {
            let cond = params[0].get_value(path, cube, user, history);
            if cond.is_control() {
                return cond;
            }
            let truthy = cond.as_numeric().map(|n| n != 0.0).unwrap_or(false);
            if truthy {
                params[1].get_value(path, cube, user, history)
            } else {
                params[2].get_value(path, cube, user, history)
            }
        }
        _ => RuleValue::numeric(0.0),
    }
}
