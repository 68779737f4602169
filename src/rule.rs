//! The rule object (spec.md §3 `Rule`, §4.8 C8): owns a validated AST, its
//! optimizer output, and its markers; recomputes on cube-schema changes; and
//! is the thing a cube dispatches `getCellValue` through.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::ast::area::Area;
use crate::ast::{Node, RuleNode};
use crate::cube::Cube;
use crate::error::RuleEngineError;
use crate::evaluator::{self, EvalOutcome};
use crate::history::RuleHistory;
use crate::ids::{CellPath, IdentifierType};
use crate::marker::{self, RuleMarker};
use crate::optimizer::{self, OptimizerOutput};

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(1);

fn next_rule_id() -> u64 {
    NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Derived state recomputed on every `checkCubeToken` mismatch (spec.md §4.6
/// "Token check", §4.8): optimizer output, the ancestor-closure `contains*`
/// areas, and the cube token this state was built against. Held behind a
/// `parking_lot::RwLock` because rules are read and re-optimized from
/// multiple request threads per spec.md §5, the same pattern the teacher
/// engine's `session.rs` uses for its `RwLock<HashMap<SessionId, Session>>`.
#[derive(Debug)]
struct RuleState {
    optimizer: OptimizerOutput,
    contains_area: Area,
    contains_restricted_area: Option<Area>,
    cube_token: u64,
    active: bool,
}

/// The runtime rule object (spec.md §3 `Rule`).
pub struct Rule {
    pub id: u64,
    pub cube: Arc<dyn Cube>,
    pub ast: RuleNode,
    pub markers: Vec<Arc<RuleMarker>>,
    pub external: bool,
    pub comment: String,
    /// Precomputed once at construction: does this rule's expression reach
    /// through a `PALO.MARKER` cross-cube/cross-database reference (spec.md
    /// §4.5 `usesOtherDatabase_out`)? Static because `PALO.MARKER` call
    /// sites don't change across re-optimization.
    uses_other_database: bool,
    state: RwLock<RuleState>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("cube", &self.cube.name())
            .field("external", &self.external)
            .finish_non_exhaustive()
    }
}

fn destination_area(ast: &RuleNode) -> Area {
    match &ast.destination {
        Node::Destination { area, .. } => area.clone(),
        _ => unreachable!("RuleNode::destination is always a Destination node"),
    }
}

fn uses_other_database(ast: &RuleNode) -> bool {
    let mut markers = Vec::new();
    ast.expr.collect_markers(&mut markers);
    let all_external_palo = ast.external_markers.iter().any(is_palo_marker_call);
    let all_internal_palo = markers.iter().any(|m| is_palo_marker_call(m));
    all_external_palo || all_internal_palo
}

fn is_palo_marker_call(node: &Node) -> bool {
    matches!(node, Node::FunctionCall { name, .. } if name.eq_ignore_ascii_case("PALO.MARKER"))
}

impl Rule {
    /// Create and fully activate a rule (spec.md §4.8 "Creation"): `ast`
    /// must already be validated against `cube` (via
    /// `parser::parse_and_validate`). Computes `containsArea`, builds and
    /// registers markers for both external and internal marker nodes, and
    /// — only when no markers exist — runs the optimizer.
    ///
    /// `lookup_cube` resolves `(database, cube_name)` pairs for
    /// `PALO.MARKER` cross-cube markers; a marker whose target cube can't be
    /// found is logged and dropped rather than failing the whole rule
    /// (spec.md §4.7 "Failure modes", §7 "Local recovery").
    pub fn new(
        cube: Arc<dyn Cube>,
        ast: RuleNode,
        external: bool,
        comment: impl Into<String>,
        active: bool,
        lookup_cube: impl Fn(&str, &str) -> Option<Arc<dyn Cube>>,
    ) -> Result<Rule, RuleEngineError> {
        let id = next_rule_id();
        let dest_area = destination_area(&ast);

        let mut marker_nodes: Vec<&Node> = ast.internal_markers.iter().collect();
        marker_nodes.extend(ast.external_markers.iter());

        let mut markers = Vec::new();
        for node in marker_nodes {
            if let Some(built) = marker::build_markers_for_node(node, cube.as_ref(), &lookup_cube, &dest_area) {
                markers.push(Arc::new(built));
            }
        }

        for m in &markers {
            let from_cube = if m.from_cube == cube.name() {
                cube.clone()
            } else {
                lookup_cube_by_name(&lookup_cube, &m.from_cube).unwrap_or_else(|| cube.clone())
            };
            let to_cube = if m.to_cube == cube.name() {
                cube.clone()
            } else {
                lookup_cube_by_name(&lookup_cube, &m.to_cube).unwrap_or_else(|| cube.clone())
            };
            marker::register_marker(m.clone(), from_cube.as_ref(), to_cube.as_ref());
        }

        let optimizer = if markers.is_empty() {
            optimizer::optimize(&ast, &dest_area, cube.as_ref())
        } else {
            OptimizerOutput::default()
        };

        let contains_area = compute_contains_area(&dest_area, cube.as_ref());
        let contains_restricted_area = optimizer
            .stet
            .as_ref()
            .map(|s| compute_contains_area(&s.restricted_area, cube.as_ref()));

        let cube_token = cube.token();
        let flags = uses_other_database(&ast);

        debug!(rule = id, cube = cube.name(), markers = markers.len(), "rule created");

        Ok(Rule {
            id,
            cube,
            ast,
            markers,
            external,
            comment: comment.into(),
            uses_other_database: flags,
            state: RwLock::new(RuleState {
                optimizer,
                contains_area,
                contains_restricted_area,
                cube_token,
                active,
            }),
        })
    }

    pub fn destination_area(&self) -> Area {
        destination_area(&self.ast)
    }

    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    pub fn set_active(&self, active: bool) {
        self.state.write().active = active;
    }

    pub fn is_optimized(&self) -> bool {
        self.state.read().optimizer.is_optimized()
    }

    pub fn linear_rule(&self) -> bool {
        self.state.read().optimizer.linear_rule
    }

    pub fn restricted_dimension(&self) -> Option<usize> {
        self.state.read().optimizer.stet.as_ref().map(|s| s.restricted_dimension)
    }

    pub fn restricted_ids(&self) -> HashSet<IdentifierType> {
        self.state
            .read()
            .optimizer
            .stet
            .as_ref()
            .map(|s| s.restricted_identifiers.clone())
            .unwrap_or_default()
    }

    /// Re-run the optimizer and recompute `containsArea`/
    /// `containsRestrictedArea` if the cube's schema token has moved past
    /// what this rule's derived state was built against (spec.md §4.6
    /// "Token check", §5 "every caller ... must first consult
    /// checkCubeToken").
    pub fn check_cube_token(&self) {
        let current = self.cube.token();
        if self.state.read().cube_token == current {
            return;
        }
        let dest_area = self.destination_area();
        let optimizer = if self.markers.is_empty() {
            optimizer::optimize(&self.ast, &dest_area, self.cube.as_ref())
        } else {
            OptimizerOutput::default()
        };
        let contains_area = compute_contains_area(&dest_area, self.cube.as_ref());
        let contains_restricted_area = optimizer
            .stet
            .as_ref()
            .map(|s| compute_contains_area(&s.restricted_area, self.cube.as_ref()));

        let mut state = self.state.write();
        state.optimizer = optimizer;
        state.contains_area = contains_area;
        state.contains_restricted_area = contains_restricted_area;
        state.cube_token = current;
        debug!(rule = self.id, token = current, "rule re-optimized after cube token change");
    }

    /// `true` if `path` lies in the rule's full destination area and the
    /// rule's option matches (spec.md §4.5 "Applicability", §5 "within").
    /// Always checked against the *unrestricted* destination — the STET
    /// rewrite narrows which branch runs, not which cells the rule owns.
    pub fn within(&self, path: &CellPath) -> bool {
        self.check_cube_token();
        let area = self.destination_area();
        evaluator::is_applicable(path, self.ast.option, &area)
    }

    /// `true` if `path`'s ancestor-closure membership covers the rule's
    /// destination (spec.md §4.6 "containsArea", §5 "contains").
    pub fn contains(&self, path: &CellPath) -> bool {
        self.check_cube_token();
        let area = {
            let state = self.state.read();
            state
                .contains_restricted_area
                .clone()
                .unwrap_or_else(|| state.contains_area.clone())
        };
        evaluator::is_applicable(path, self.ast.option, &area)
    }

    /// Evaluate this rule against `path` (spec.md §4.5 entry point
    /// `Rule.getValue`). Enforces applicability, the recursion guard, and
    /// STET/CONTINUE short-circuiting before projecting a concrete result.
    ///
    /// When STET-optimized, a path outside the restricted area is known
    /// *without evaluating anything* to be the branch that returns `STET()`
    /// (that's exactly what the rewrite proved): this short-circuits to
    /// `EvalOutcome::stet()` directly. A path inside the restricted area
    /// runs the kept (non-STET) branch in place of the full `IF` (spec.md
    /// §4.6 "STET rewrite").
    pub fn get_value(&self, path: &CellPath, user: Option<&str>, history: &mut RuleHistory) -> EvalOutcome {
        self.check_cube_token();

        let (active, stet) = {
            let state = self.state.read();
            (state.active, state.optimizer.stet.clone())
        };
        if !active {
            return EvalOutcome::not_applicable();
        }
        if !self.within(path) {
            return EvalOutcome::not_applicable();
        }

        let expr: &Node = match &stet {
            Some(rewrite) => {
                if !rewrite.restricted_area.contains(path.coordinates()) {
                    return EvalOutcome::stet().with_uses_other_database(self.uses_other_database);
                }
                &rewrite.restricted_rule
            }
            None => &self.ast.expr,
        };

        if !history.enter(self.id, path.coordinates()) {
            warn!(rule = self.id, "recursion guard tripped, terminating evaluation path");
            return EvalOutcome::not_applicable();
        }
        let value = evaluator::evaluate_expr(expr, path, self.cube.as_ref(), user, history);
        history.leave(self.id, path.coordinates());

        let outcome = match value.value_type {
            crate::value::ValueType::Stet => EvalOutcome::stet(),
            crate::value::ValueType::Continue => EvalOutcome::continue_(),
            _ => EvalOutcome::value(evaluator::project(&value, path.path_type(), self.id)),
        };
        outcome.with_uses_other_database(self.uses_other_database)
    }
}

/// Ancestor-closure of a destination area over each dimension's hierarchy
/// (spec.md §4.6 "Token check": "containsArea (= ancestor-closure of the
/// destination area over each dimension's hierarchy)").
fn compute_contains_area(destination_area: &Area, cube: &dyn Cube) -> Area {
    let dims = cube.dimensions();
    let mut out = destination_area.clone();
    for d in 0..out.dimension_count() {
        if destination_area.is_restricted.get(d).copied().unwrap_or(false) {
            let elem_id = destination_area.element_ids[d];
            if let Some(elem) = dims.get(d).and_then(|dim| dim.lookup_element(elem_id)) {
                let mut set = dims[d].ancestors(elem.as_ref());
                set.insert(elem_id);
                out.sets[d] = set;
            }
        }
    }
    out
}

fn lookup_cube_by_name(_lookup: &impl Fn(&str, &str) -> Option<Arc<dyn Cube>>, _name: &str) -> Option<Arc<dyn Cube>> {
    // The `(database, cube)` lookup closure is keyed by database+cube name,
    // not cube name alone; registration against a from/to cube that isn't
    // the rule's own cube requires the caller's database context, which
    // this crate doesn't own (spec.md §1 out of scope). Registration for
    // same-cube markers (the common case) doesn't need this path.
    None
}

/// Remove a rule's markers from both cubes before the rule itself is
/// dropped (spec.md §4.8 "Deletion": "both cubes must see the marker
/// removed from their 'from' and 'to' lists before the marker is freed").
pub fn deactivate_and_unregister(rule: &Rule, lookup_cube: impl Fn(&str) -> Option<Arc<dyn Cube>>) {
    rule.set_active(false);
    for m in &rule.markers {
        let from = if m.from_cube == rule.cube.name() {
            Some(rule.cube.clone())
        } else {
            lookup_cube(&m.from_cube)
        };
        let to = if m.to_cube == rule.cube.name() {
            Some(rule.cube.clone())
        } else {
            lookup_cube(&m.to_cube)
        };
        if let (Some(from), Some(to)) = (from, to) {
            marker::unregister_marker(m, from.as_ref(), to.as_ref());
        }
    }
}
