//! Function registry (spec.md §4.4 C4): maps built-in function names to
//! validation/evaluation/optimizer-hook behavior. A rule-text function call
//! is always a `Node::FunctionCall { name, params }` — this module is the
//! dispatcher the spec describes as "a registry whose concrete
//! implementation is one of: full built-in set ... or parse-only set",
//! implemented here as free functions over the name rather than a
//! trait-object registry (no need for dynamic dispatch when every name is
//! known at compile time, and it keeps `Node` serde-friendly).

pub mod aggregate;
pub mod arithmetic;
pub mod comparison;
pub mod control;
pub mod marker_fn;
pub mod string_ops;

use std::collections::HashSet;

use crate::ast::Node;
use crate::cube::Cube;
use crate::error::ValidationError;
use crate::history::RuleHistory;
use crate::ids::{CellPath, IdentifierType};
use crate::value::{RuleValue, ValueType};

/// Arity + per-parameter value-type validation (spec.md §4.4 `validate`).
pub fn validate(name: &str, param_types: &[ValueType]) -> Result<ValueType, ValidationError> {
    if let Some(t) = arithmetic::validate(name, param_types) {
        return t;
    }
    if let Some(t) = comparison::validate(name, param_types) {
        return t;
    }
    if let Some(t) = control::validate(name, param_types) {
        return t;
    }
    if let Some(t) = aggregate::validate(name, param_types) {
        return t;
    }
    if let Some(t) = string_ops::validate(name, param_types) {
        return t;
    }
    if let Some(t) = marker_fn::validate(name, param_types) {
        return t;
    }
    Err(ValidationError::new(format!("unknown function '{name}'")))
}

/// Best-effort value type for a function name without param context — used
/// for rendering/optimizer passes that run before validation populates
/// concrete types.
pub fn static_value_type(name: &str) -> ValueType {
    if arithmetic::is_arithmetic(name) || aggregate::is_aggregate(name) {
        return ValueType::Numeric;
    }
    if comparison::is_comparison(name) {
        return ValueType::Numeric;
    }
    match name.to_ascii_uppercase().as_str() {
        "STET" => ValueType::Stet,
        "CONTINUE" => ValueType::Continue,
        "IF" => ValueType::Unknown,
        _ if string_ops::is_string_op(name) => ValueType::String,
        _ if name.eq_ignore_ascii_case("PALO.MARKER") => ValueType::Unknown,
        _ => ValueType::Unknown,
    }
}

/// Evaluate a function call (spec.md §4.4 `getValue`, full mode only).
pub fn evaluate(
    name: &str,
    params: &[Node],
    path: &CellPath,
    cube: &dyn Cube,
    user: Option<&str>,
    history: &mut RuleHistory,
) -> RuleValue {
    if arithmetic::is_arithmetic(name) {
        return arithmetic::evaluate(name, params, path, cube, user, history);
    }
    if comparison::is_comparison(name) {
        return comparison::evaluate(name, params, path, cube, user, history);
    }
    if control::is_control(name) {
        return control::evaluate(name, params, path, cube, user, history);
    }
    if aggregate::is_aggregate(name) {
        return aggregate::evaluate(name, params, path, cube, user, history);
    }
    if string_ops::is_string_op(name) {
        return string_ops::evaluate(name, params, path, cube, user, history);
    }
    if name.eq_ignore_ascii_case("PALO.MARKER") {
        return marker_fn::evaluate(name, params, path, cube, user, history);
    }
    RuleValue::numeric(0.0)
}

/// `IF(Variable = "literal", ...)`-shaped dimension restriction detection
/// (spec.md §4.4, used by the optimizer's STET rewrite). Returns the
/// resolved dimension index when `node` is a `=` comparison between a
/// resolved `Variable` and a `String` literal.
pub fn is_dimension_restriction(node: &Node) -> Option<usize> {
    let Node::FunctionCall { name, params } = node else {
        return None;
    };
    if name != "=" || params.len() != 2 {
        return None;
    }
    dimension_restriction_operand(&params[0], &params[1])
        .or_else(|| dimension_restriction_operand(&params[1], &params[0]))
}

fn dimension_restriction_operand(a: &Node, b: &Node) -> Option<usize> {
    match (a, b) {
        (Node::Variable { dimension_index: Some(d), .. }, Node::String(_)) => Some(*d),
        _ => None,
    }
}

/// The set of element ids the `Variable = "literal"` comparison matches
/// (spec.md §4.4, §4.6). `cube` resolves the literal element name.
pub fn compute_dimension_restriction(node: &Node, cube: &dyn Cube) -> Option<HashSet<IdentifierType>> {
    let Node::FunctionCall { name, params } = node else {
        return None;
    };
    if name != "=" || params.len() != 2 {
        return None;
    }
    let (var, lit) = match (&params[0], &params[1]) {
        (Node::Variable { dimension_index: Some(d), .. }, Node::String(s)) => (*d, s),
        (Node::String(s), Node::Variable { dimension_index: Some(d), .. }) => (*d, s),
        _ => return None,
    };
    let dim = cube.dimensions().get(var)?.clone();
    let elem = dim.lookup_element_by_name(lit)?;
    let mut set = HashSet::new();
    set.insert(elem.identifier());
    Some(set)
}
