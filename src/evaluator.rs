//! Rule evaluator (spec.md §4.5 C5): the applicability test, control-token
//! detection, and destination-pathType projection that sit between a
//! `Rule`'s stored AST and the cube's `getCellValue` dispatch. The owning
//! `Rule` (`rule.rs`, C8) drives these functions and adds the identity
//! (`rule.id`) and the recursion-guard bookkeeping tied to that identity.

use crate::ast::area::Area;
use crate::ast::{Node, RuleOption};
use crate::cube::Cube;
use crate::history::RuleHistory;
use crate::ids::{CellPath, PathType};
use crate::value::{CellResult, RuleValue, ValueType};

/// What one evaluation attempt communicates back to its caller (spec.md
/// §4.5 entry point: `skipRule_out`, `skipAllRules_out`, the projected
/// result). `uses_other_database` mirrors spec.md §4.5's
/// `usesOtherDatabase_out` — set when the rule's expression reaches through
/// a `PALO.MARKER` cross-cube/cross-database reference.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub skip_rule: bool,
    pub skip_all_rules: bool,
    pub uses_other_database: bool,
    pub result: Option<CellResult>,
}

impl EvalOutcome {
    /// The rule does not apply to this cell at all (spec.md §4.5
    /// "Applicability") — not an error, just "try the next rule", the same
    /// observable effect as `CONTINUE`.
    pub fn not_applicable() -> Self {
        EvalOutcome {
            skip_rule: true,
            skip_all_rules: false,
            uses_other_database: false,
            result: None,
        }
    }

    pub fn stet() -> Self {
        EvalOutcome {
            skip_rule: false,
            skip_all_rules: true,
            uses_other_database: false,
            result: None,
        }
    }

    pub fn continue_() -> Self {
        EvalOutcome {
            skip_rule: true,
            skip_all_rules: false,
            uses_other_database: false,
            result: None,
        }
    }

    pub fn value(result: CellResult) -> Self {
        EvalOutcome {
            skip_rule: false,
            skip_all_rules: false,
            uses_other_database: false,
            result: Some(result),
        }
    }

    pub fn with_uses_other_database(mut self, flag: bool) -> Self {
        self.uses_other_database = flag;
        self
    }
}

/// A rule is applicable to `path` when the cell lies in `area` and the
/// rule's `option` matches the cell's base/consolidated status (spec.md
/// §4.5 "Applicability"): `None` always matches, `Consolidation` requires a
/// non-base cell, `Base` requires a base cell.
pub fn is_applicable(path: &CellPath, option: RuleOption, area: &Area) -> bool {
    if !area.contains(path.coordinates()) {
        return false;
    }
    match option {
        RuleOption::None => true,
        RuleOption::Consolidation => !path.is_base(),
        RuleOption::Base => path.is_base(),
    }
}

/// Evaluate `expr` against `path` and turn the outcome into an `EvalOutcome`
/// (spec.md §4.5 steps 1-4), without touching the recursion guard or the
/// result's rule-id tag — those are the caller's (`Rule::get_value`)
/// responsibility since they depend on the rule's identity.
pub fn evaluate_expr(expr: &Node, path: &CellPath, cube: &dyn Cube, user: Option<&str>, history: &mut RuleHistory) -> RuleValue {
    expr.get_value(path, cube, user, history)
}

/// Project a `RuleValue` into the untagged halves of a `CellResult`,
/// following the destination cell's `pathType` (spec.md §4.5 step 4): if
/// `STRING`, take the string payload (empty if the result was numeric); if
/// `NUMERIC`, take the double payload (0.0 if the result was string).
pub fn project(value: &RuleValue, path_type: PathType, rule_id: u64) -> CellResult {
    match path_type {
        PathType::String => CellResult {
            value_type: ValueType::String,
            double_value: 0.0,
            string_value: value.as_string().unwrap_or("").to_string(),
            rule_id: Some(rule_id),
        },
        PathType::Numeric => CellResult {
            value_type: ValueType::Numeric,
            double_value: value.as_numeric().unwrap_or(0.0),
            string_value: String::new(),
            rule_id: Some(rule_id),
        },
    }
}
