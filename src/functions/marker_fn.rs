//! `PALO.MARKER(db, cube, coord1, coord2, ...)` (spec.md §4.4, §4.7): the
//! cross-cube source reference whose marker construction lives in
//! `marker.rs` (C7). Live evaluation of the referenced cell requires
//! dispatching into a *different* cube than the one `Node::get_value` is
//! given — routing that lookup across cubes is the cube server's job
//! (spec.md §1 "the cube storage engine ... is out of scope"), so
//! evaluation here returns the zero of the expected type with a warning,
//! the same way a source read of an unpopulated cell does (spec.md §7
//! `EvalMissingCell`: "not an error").

use tracing::warn;

use crate::ast::Node;
use crate::cube::Cube;
use crate::error::ValidationError;
use crate::history::RuleHistory;
use crate::ids::CellPath;
use crate::value::{RuleValue, ValueType};

pub fn validate(name: &str, param_types: &[ValueType]) -> Option<Result<ValueType, ValidationError>> {
    if !name.eq_ignore_ascii_case("PALO.MARKER") {
        return None;
    }
    Some(if param_types.len() < 2 {
        Err(ValidationError::new(
            "PALO.MARKER requires at least (database, cube)",
        ))
    } else {
        Ok(ValueType::Numeric)
    })
}

pub fn evaluate(
    _name: &str,
    params: &[Node],
    _path: &CellPath,
    _cube: &dyn Cube,
    _user: Option<&str>,
    _history: &mut RuleHistory,
) -> RuleValue {
    warn!(
        params = params.len(),
        "PALO.MARKER live evaluation requires cross-cube routing owned by the cube server; returning zero"
    );
    RuleValue::numeric(0.0)
}
