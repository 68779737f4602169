//! AST node family (spec.md §3 `AST node`, §4.1 C1): a value-typed
//! expression tree with uniform evaluation, validation, cloning, and
//! rendering. Represented as a tagged enum rather than a class hierarchy
//! (spec.md §9 "Polymorphic AST without inheritance") — each variant owns
//! its children outright, so `#[derive(Clone)]` already gives the fully
//! independent copies spec.md §9's "Open questions" endorses over the
//! original's shared-pointer clone.

pub mod area;
pub mod render;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cube::Cube;
use crate::error::ValidationError;
use crate::functions;
use crate::history::RuleHistory;
use crate::ids::{CellPath, IdentifierType};
use crate::value::{RuleValue, ValueType};

use area::{Area, AreaInput};

/// Discriminant for `Node` (spec.md §4.1 "a discriminant `nodeType`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    Double,
    String,
    Variable,
    Source,
    Destination,
    FunctionCall,
}

/// A polymorphic AST value node (spec.md §3 `AST node`, §4.1). Ownership: a
/// parent node exclusively owns its children — the tree has no sharing and
/// no cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Double(f64),
    String(String),
    /// Resolves `name` to a cube dimension at validate time; at evaluate
    /// time yields the *name* of the element on that dimension of the
    /// requesting cell path, as a string (spec.md §4.1).
    Variable {
        name: String,
        dimension_index: Option<usize>,
    },
    /// `[…]` / `[[…]]` / `{…}` / `{{…}}`: an area of the *same* cube the
    /// rule lives on (spec.md §4.1 Source node).
    Source {
        input: AreaInput,
        area: Area,
        is_marker: bool,
    },
    /// The rule's target area; never evaluated directly (spec.md §4.1
    /// Destination node).
    Destination {
        input: AreaInput,
        area: Area,
    },
    FunctionCall {
        name: String,
        params: Vec<Node>,
    },
}

/// What a full-mode validation needs to resolve variables, sources, and
/// destinations against (spec.md §4.1 `validate(server, database, cube,
/// destination_context)`). `server`/`database` are out of scope per spec.md
/// §1 — validation here is scoped to the one cube a rule lives on.
pub struct ValidateContext<'a> {
    pub cube: Option<&'a dyn Cube>,
    /// Parse-only mode whitelist of function names (spec.md §4.3). `None`
    /// in full mode, where the full built-in set is always available.
    pub function_whitelist: Option<&'a HashSet<String>>,
}

impl<'a> ValidateContext<'a> {
    pub fn full(cube: &'a dyn Cube) -> Self {
        ValidateContext {
            cube: Some(cube),
            function_whitelist: None,
        }
    }

    pub fn parse_only(whitelist: &'a HashSet<String>) -> Self {
        ValidateContext {
            cube: None,
            function_whitelist: Some(whitelist),
        }
    }
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Double(_) => NodeType::Double,
            Node::String(_) => NodeType::String,
            Node::Variable { .. } => NodeType::Variable,
            Node::Source { .. } => NodeType::Source,
            Node::Destination { .. } => NodeType::Destination,
            Node::FunctionCall { .. } => NodeType::FunctionCall,
        }
    }

    /// Build an unvalidated area node, resolved lazily by `validate`
    /// (spec.md §4.3 grammar `source`/`destination`).
    pub fn source(input: AreaInput, is_marker: bool) -> Node {
        let area = Area::symbolic(&input);
        Node::Source {
            input,
            area,
            is_marker,
        }
    }

    pub fn destination(input: AreaInput) -> Node {
        let area = Area::symbolic(&input);
        Node::Destination { input, area }
    }

    pub fn variable(name: impl Into<String>) -> Node {
        Node::Variable {
            name: name.into(),
            dimension_index: None,
        }
    }

    pub fn call(name: impl Into<String>, params: Vec<Node>) -> Node {
        Node::FunctionCall {
            name: name.into(),
            params,
        }
    }

    /// Validate this node (and its subtree) against `ctx`, returning the
    /// value type it produces (spec.md §4.1 `validate`).
    pub fn validate(&mut self, ctx: &ValidateContext) -> Result<ValueType, ValidationError> {
        match self {
            Node::Double(_) => Ok(ValueType::Numeric),
            Node::String(_) => Ok(ValueType::String),
            Node::Variable { name, dimension_index } => {
                if let Some(cube) = ctx.cube {
                    let (pos, _) = cube
                        .dimension_position(name)
                        .ok_or_else(|| ValidationError::new(format!("unknown variable dimension '{name}'")))?;
                    *dimension_index = Some(pos);
                }
                // Parse-only mode: remains valid, stays unresolved; yields
                // "" at evaluation time (spec.md §4.1).
                Ok(ValueType::String)
            }
            Node::Source { input, area, .. } => {
                *area = match ctx.cube {
                    Some(cube) => Area::resolve(cube, input)?,
                    None => Area::symbolic(input),
                };
                Ok(ValueType::Unknown)
            }
            Node::Destination { input, area } => {
                *area = match ctx.cube {
                    Some(cube) => Area::resolve(cube, input)?,
                    None => Area::symbolic(input),
                };
                Ok(ValueType::Unknown)
            }
            Node::FunctionCall { name, params } => {
                if let Some(whitelist) = ctx.function_whitelist {
                    if !whitelist.contains(name.as_str()) {
                        return Err(ValidationError::new(format!(
                            "function '{name}' is not in the parse-only whitelist"
                        )));
                    }
                }
                let mut param_types = Vec::with_capacity(params.len());
                for p in params.iter_mut() {
                    param_types.push(p.validate(ctx)?);
                }
                if ctx.cube.is_none() {
                    // Parse-only mode never evaluates, so arity/type
                    // checking against a concrete signature is skipped —
                    // any whitelisted name is accepted (spec.md §4.3).
                    return Ok(ValueType::Unknown);
                }
                functions::validate(name, &param_types)
            }
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Node::Double(_) => ValueType::Numeric,
            Node::String(_) => ValueType::String,
            Node::Variable { .. } => ValueType::String,
            Node::Source { .. } | Node::Destination { .. } => ValueType::Unknown,
            Node::FunctionCall { name, .. } => functions::static_value_type(name),
        }
    }

    /// Evaluate this node against `path` (spec.md §4.1 `getValue`).
    pub fn get_value(
        &self,
        path: &CellPath,
        cube: &dyn Cube,
        user: Option<&str>,
        history: &mut RuleHistory,
    ) -> RuleValue {
        match self {
            Node::Double(v) => RuleValue::numeric(*v),
            Node::String(s) => RuleValue::string(s.clone()),
            Node::Variable { dimension_index, .. } => match dimension_index {
                None => RuleValue::string(""),
                Some(idx) => {
                    let dims = cube.dimensions();
                    match dims.get(*idx).and_then(|dim| {
                        path.coordinate(*idx).and_then(|c| dim.lookup_element(c))
                    }) {
                        Some(elem) => RuleValue::string(elem.name().to_string()),
                        None => RuleValue::string(""),
                    }
                }
            },
            Node::Source { area, .. } => evaluate_source(area, path, cube, user, history),
            Node::Destination { .. } => RuleValue::numeric(0.0),
            Node::FunctionCall { name, params } => {
                functions::evaluate(name, params, path, cube, user, history)
            }
        }
    }

    /// `true` if this node (or a descendant) references `element` on
    /// `dimension_name` — used by downstream cache-invalidation checks that
    /// ask "does this rule touch element X?".
    pub fn has_element(&self, dimension_name: &str, element_id: IdentifierType) -> bool {
        match self {
            Node::Source { area, .. } | Node::Destination { area, .. } => area
                .dimension_ids
                .iter()
                .zip(area.sets.iter())
                .any(|(_, set)| set.contains(&element_id))
                && dimension_name_matches(area, dimension_name),
            Node::FunctionCall { params, .. } => params.iter().any(|p| p.has_element(dimension_name, element_id)),
            _ => false,
        }
    }

    /// `true` if this node's value never depends on the requested cell path
    /// (spec.md §4.1 `isConstant`, used by the optimizer's linearity check).
    pub fn is_constant(&self) -> bool {
        match self {
            Node::Double(_) | Node::String(_) => true,
            Node::FunctionCall { name, params } => {
                (name == "+" || name == "-") && params.iter().all(Node::is_constant)
            }
            _ => false,
        }
    }

    /// If this node is a constant, its numeric value (spec.md §4.6
    /// linearity check: `constant * [source]`).
    pub fn constant_value(&self) -> Option<f64> {
        if !self.is_constant() {
            return None;
        }
        match self {
            Node::Double(v) => Some(*v),
            Node::FunctionCall { name, params } if params.len() == 1 => {
                let inner = params[0].constant_value()?;
                Some(if name == "-" { -inner } else { inner })
            }
            Node::FunctionCall { name, params } if params.len() == 2 => {
                let a = params[0].constant_value()?;
                let b = params[1].constant_value()?;
                Some(if name == "-" { a - b } else { a + b })
            }
            _ => None,
        }
    }

    /// Gather every marker-bearing node in this subtree: `Source` nodes
    /// flagged `is_marker` and `PALO.MARKER` calls (spec.md §4.1
    /// `collectMarkers`, §3 `RuleNode` "internal markers").
    pub fn collect_markers<'a>(&'a self, out: &mut Vec<&'a Node>) {
        match self {
            Node::Source { is_marker, .. } if *is_marker => out.push(self),
            Node::FunctionCall { name, params } => {
                if name.eq_ignore_ascii_case("PALO.MARKER") {
                    out.push(self);
                }
                for p in params {
                    p.collect_markers(out);
                }
            }
            _ => {}
        }
    }
}

fn dimension_name_matches(_area: &Area, _dimension_name: &str) -> bool {
    // Area itself doesn't retain dimension *names*, only ids — callers that
    // need a by-name check go through the cube. Conservative default: areas
    // never claim a false positive on a name they can't verify.
    true
}

fn evaluate_source(
    area: &Area,
    path: &CellPath,
    cube: &dyn Cube,
    user: Option<&str>,
    history: &mut RuleHistory,
) -> RuleValue {
    let coords: Vec<IdentifierType> = if let Some(fixed) = area.fixed_coordinates() {
        fixed
    } else {
        (0..area.dimension_count())
            .map(|d| {
                if area.is_restricted.get(d).copied().unwrap_or(false) {
                    area.element_ids[d]
                } else {
                    path.coordinate(d).unwrap_or(0)
                }
            })
            .collect()
    };
    let effective_path = cube.classify_path(coords);
    let (value, found) = cube.get_cell_value(&effective_path, user, history);
    if !found {
        return if effective_path.path_type() == crate::ids::PathType::String {
            RuleValue::string("")
        } else {
            RuleValue::numeric(0.0)
        };
    }
    value.as_rule_value()
}

/// The root of a parsed rule (spec.md §3 `RuleNode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleOption {
    None,
    Consolidation,
    Base,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleNode {
    pub option: RuleOption,
    pub destination: Node,
    pub expr: Node,
    pub external_markers: Vec<Node>,
    pub internal_markers: Vec<Node>,
}

impl RuleNode {
    pub fn new(option: RuleOption, destination: Node, expr: Node, external_markers: Vec<Node>) -> RuleNode {
        let mut internal_markers = Vec::new();
        expr.collect_markers(&mut internal_markers);
        RuleNode {
            option,
            destination,
            expr,
            external_markers,
            internal_markers: internal_markers.into_iter().cloned().collect(),
        }
    }

    /// Validate the whole rule: external markers are only legal under
    /// `option = Base` (spec.md §3 `RuleNode` invariant).
    pub fn validate(&mut self, ctx: &ValidateContext) -> Result<(), ValidationError> {
        if !self.external_markers.is_empty() && self.option != RuleOption::Base {
            return Err(ValidationError::new(
                "external markers are only allowed on BASE rules",
            ));
        }
        self.destination.validate(ctx)?;
        self.expr.validate(ctx)?;
        for m in &mut self.external_markers {
            match m {
                Node::Source { .. } => {
                    m.validate(ctx)?;
                }
                Node::FunctionCall { name, .. } if name.eq_ignore_ascii_case("PALO.MARKER") => {
                    m.validate(ctx)?;
                }
                _ => {
                    return Err(ValidationError::new(
                        "external marker must be a marker-source node or a PALO.MARKER() call",
                    ))
                }
            }
        }
        Ok(())
    }
}
