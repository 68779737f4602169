//! Rule optimizer (spec.md §4.6 C6): recognizes STET-guarded conditionals
//! and linear multiplicative rules, rewriting them into fast paths. Runs
//! only on rules without markers (spec.md §4.6 "Runs on any rule without
//! markers (rules with markers are never optimized)").

use std::collections::HashSet;

use tracing::debug;

use crate::ast::area::Area;
use crate::ast::{Node, RuleNode, RuleOption};
use crate::cube::Cube;
use crate::functions;
use crate::ids::IdentifierType;
use crate::value::ElementType;

/// STET-restriction rewrite output (spec.md §4.6 "STET rewrite").
#[derive(Debug, Clone)]
pub struct StetRewrite {
    /// Clone of the non-STET branch: what actually gets evaluated once a
    /// cell is known to fall in `restricted_identifiers`.
    pub restricted_rule: Node,
    pub restricted_dimension: usize,
    pub restricted_identifiers: HashSet<IdentifierType>,
    pub restricted_area: Area,
}

/// Everything the optimizer could determine about one rule (spec.md §4.6,
/// §3 `Rule` fields `restrictedAST?`, `restrictedDimension?`,
/// `restrictedIds`, `isOptimized`, `linearRule`).
#[derive(Debug, Clone, Default)]
pub struct OptimizerOutput {
    pub stet: Option<StetRewrite>,
    pub linear_rule: bool,
}

impl OptimizerOutput {
    pub fn is_optimized(&self) -> bool {
        self.stet.is_some()
    }
}

/// Run both optimizer passes over `rule` (spec.md §4.6). Callers gate this
/// on "no markers" themselves (spec.md §4.6) — this function assumes that
/// precondition and does not re-check it, so it stays a pure function of
/// the rule shape.
pub fn optimize(rule: &RuleNode, destination_area: &Area, cube: &dyn Cube) -> OptimizerOutput {
    let stet = try_stet_rewrite(&rule.expr, destination_area, cube);
    let linear_rule = is_linear(rule, destination_area, cube);
    if stet.is_some() {
        debug!(
            dimension = stet.as_ref().unwrap().restricted_dimension,
            "rule optimized: STET restriction"
        );
    }
    if linear_rule {
        debug!("rule optimized: linear");
    }
    OptimizerOutput { stet, linear_rule }
}

/// Recognize `IF(cond, STET(), f)` / `IF(cond, t, STET())` where `cond` is a
/// single `Variable = "literal"` dimension restriction (spec.md §4.6 "STET
/// rewrite").
pub fn try_stet_rewrite(expr: &Node, destination_area: &Area, cube: &dyn Cube) -> Option<StetRewrite> {
    let Node::FunctionCall { name, params } = expr else {
        return None;
    };
    if !name.eq_ignore_ascii_case("IF") || params.len() != 3 {
        return None;
    }

    let then_branch = &params[1];
    let else_branch = &params[2];

    // Form B: IF(cond, t, STET()) -- isInclusive = true, R = S.
    // Form A: IF(cond, STET(), f) -- isInclusive = false, R = complement(S).
    let (is_inclusive, kept_branch) = if is_stet_call(else_branch) {
        (true, then_branch)
    } else if is_stet_call(then_branch) {
        (false, else_branch)
    } else {
        return None;
    };

    let dim = functions::is_dimension_restriction(&params[0])?;
    let s = functions::compute_dimension_restriction(&params[0], cube)?;

    let dims = cube.dimensions();
    let all_elements: HashSet<IdentifierType> = dims
        .get(dim)?
        .get_elements()
        .iter()
        .map(|e| e.identifier())
        .collect();
    let existing = destination_area.sets.get(dim)?;

    let r: HashSet<IdentifierType> = if is_inclusive {
        if existing.is_empty() {
            s
        } else {
            s.intersection(existing).copied().collect()
        }
    } else {
        let complement: HashSet<IdentifierType> = all_elements.difference(&s).copied().collect();
        if existing.is_empty() {
            complement
        } else {
            complement.intersection(existing).copied().collect()
        }
    };

    let restricted_area = destination_area.with_dimension_set(dim, r.clone());

    Some(StetRewrite {
        restricted_rule: kept_branch.clone(),
        restricted_dimension: dim,
        restricted_identifiers: r,
        restricted_area,
    })
}

fn is_stet_call(node: &Node) -> bool {
    matches!(node, Node::FunctionCall { name, params } if name.eq_ignore_ascii_case("STET") && params.is_empty())
}

/// Detect `[dest] = constant * [source]`, `[dest] = [source] * constant`, or
/// `[dest] = [source] / constant`, option `BASE`, all destination elements
/// `NUMERIC`, and `|source-set(d)| == |dest-set(d)|` for every dimension
/// (spec.md §4.6 "Linearity check").
pub fn is_linear(rule: &RuleNode, destination_area: &Area, cube: &dyn Cube) -> bool {
    if rule.option != RuleOption::Base {
        return false;
    }
    let Node::FunctionCall { name, params } = &rule.expr else {
        return false;
    };
    if params.len() != 2 {
        return false;
    }

    let source_area = match name.as_str() {
        "*" => {
            if params[0].is_constant() {
                source_area_of(&params[1])
            } else if params[1].is_constant() {
                source_area_of(&params[0])
            } else {
                None
            }
        }
        "/" => {
            if params[1].is_constant() {
                source_area_of(&params[0])
            } else {
                None
            }
        }
        _ => None,
    };
    let Some(source_area) = source_area else {
        return false;
    };

    let dims = cube.dimensions();
    for d in 0..destination_area.dimension_count() {
        if destination_area.is_restricted[d] {
            let elem_id = destination_area.element_ids[d];
            match dims.get(d).and_then(|dim| dim.lookup_element(elem_id)) {
                Some(e) if e.element_type() == ElementType::Numeric => {}
                _ => return false,
            }
        }
    }

    for d in 0..destination_area.dimension_count().min(source_area.dimension_count()) {
        let dest_len = effective_size(destination_area, d, cube);
        let src_len = effective_size(&source_area, d, cube);
        if dest_len != src_len {
            return false;
        }
    }

    true
}

fn source_area_of(node: &Node) -> Option<Area> {
    match node {
        Node::Source { area, is_marker: false, .. } => Some(area.clone()),
        _ => None,
    }
}

/// The number of elements an area's set at dimension `d` allows: the set's
/// cardinality when restricted, or the full dimension's element count when
/// unrestricted (empty set = "no restriction", spec.md §3 `Area`).
fn effective_size(area: &Area, d: usize, cube: &dyn Cube) -> usize {
    let set = &area.sets[d];
    if set.is_empty() {
        cube.dimensions().get(d).map(|dim| dim.get_elements().len()).unwrap_or(0)
    } else {
        set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::area::AreaInput;
    use crate::ast::ValidateContext;
    use crate::cube::test_fixtures::sample_cube;
    use crate::parser::parse_and_validate;

    #[test]
    fn stet_rewrite_exclusive_form() {
        let cube = sample_cube();
        let rule = parse_and_validate(
            "[Measure:Revenue] = IF(Year = '2024', STET(), 0.0)",
            &cube,
        )
        .unwrap();
        let dest_area = match &rule.destination {
            Node::Destination { area, .. } => area.clone(),
            _ => unreachable!(),
        };
        let rewrite = try_stet_rewrite(&rule.expr, &dest_area, &cube).unwrap();
        assert_eq!(rewrite.restricted_dimension, 0);
        // R = complement of {2024} = {2023}
        assert_eq!(rewrite.restricted_identifiers, HashSet::from([0u32]));
    }

    #[test]
    fn stet_rewrite_inclusive_form() {
        let cube = sample_cube();
        let rule = parse_and_validate(
            "[Measure:Revenue] = IF(Year = '2024', 5.0, STET())",
            &cube,
        )
        .unwrap();
        let dest_area = match &rule.destination {
            Node::Destination { area, .. } => area.clone(),
            _ => unreachable!(),
        };
        let rewrite = try_stet_rewrite(&rule.expr, &dest_area, &cube).unwrap();
        assert_eq!(rewrite.restricted_identifiers, HashSet::from([1u32]));
    }

    #[test]
    fn non_stet_if_is_not_rewritten() {
        let cube = sample_cube();
        let rule = parse_and_validate(
            "[Measure:Revenue] = IF(Year = '2024', 5.0, 0.0)",
            &cube,
        )
        .unwrap();
        let dest_area = match &rule.destination {
            Node::Destination { area, .. } => area.clone(),
            _ => unreachable!(),
        };
        assert!(try_stet_rewrite(&rule.expr, &dest_area, &cube).is_none());
    }

    #[test]
    fn linear_rule_detected() {
        let cube = sample_cube();
        let mut rule = parse_and_validate(
            "[Measure:Revenue] = N:1.1 * [Measure:Units]",
            &cube,
        )
        .unwrap();
        rule.validate(&ValidateContext::full(&cube)).unwrap();
        let dest_area = match &rule.destination {
            Node::Destination { area, .. } => area.clone(),
            _ => unreachable!(),
        };
        assert!(is_linear(&rule, &dest_area, &cube));
    }

    #[test]
    fn non_base_rule_is_never_linear() {
        let cube = sample_cube();
        let rule = parse_and_validate(
            "[Measure:Revenue] = 1.1 * [Measure:Units]",
            &cube,
        )
        .unwrap();
        let dest_area = match &rule.destination {
            Node::Destination { area, .. } => area.clone(),
            _ => unreachable!(),
        };
        assert!(!is_linear(&rule, &dest_area, &cube));
    }

    #[test]
    fn mismatched_set_sizes_are_not_linear() {
        let cube = sample_cube();
        // destination restricted to one Product element, source spans all
        // three -- shapes don't match, exercised directly via `Area`.
        let dest = crate::ast::area::Area::resolve(
            &cube,
            &AreaInput::names(vec![(Some("Product".into()), Some("A".into()))]),
        )
        .unwrap();
        let wide_source = crate::ast::area::Area::resolve(
            &cube,
            &AreaInput::names(vec![(None, Some("Units".into()))]),
        )
        .unwrap();
        assert_eq!(effective_size(&dest, 1, &cube), 1);
        assert_eq!(effective_size(&wide_source, 1, &cube), 3);
    }
}
