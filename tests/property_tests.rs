//! Property-based tests (proptest) for the laws spec.md §8 calls out:
//! clone independence, parse/render round-tripping, and the STET-rewrite
//! identity (an optimized rule agrees with its own unoptimized evaluation
//! on every cell, everywhere).

use std::sync::Arc;

use cube_rules::ast::{Node, RuleOption};
use cube_rules::cube::{Cube, MemoryCube, MemoryDimension};
use cube_rules::value::CellValue;
use cube_rules::{parse_and_validate, Rule, RuleHistory};
use proptest::prelude::*;

fn d_cube() -> MemoryCube {
    MemoryCube::new(
        "D",
        vec![
            MemoryDimension::new(0, "Year")
                .with_base_element(0, "2023", true)
                .with_base_element(1, "2024", true),
            MemoryDimension::new(1, "Product")
                .with_base_element(0, "A", true)
                .with_base_element(1, "B", true)
                .with_base_element(2, "C", true),
            MemoryDimension::new(2, "Measure")
                .with_base_element(0, "Units", true)
                .with_base_element(1, "Revenue", true),
        ],
    )
}

fn no_lookup(_db: &str, _cube: &str) -> Option<Arc<dyn Cube>> {
    None
}

/// A small arithmetic-expression grammar built directly as `Node`s (no
/// parser involved), mirroring the teacher's `property_arithmetic.rs`
/// approach of driving the system under test through generated values
/// rather than generated source text.
fn arith_node() -> impl Strategy<Value = Node> {
    let leaf = (-1000.0f64..1000.0).prop_map(Node::Double);
    leaf.prop_recursive(4, 64, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Node::call("+", vec![a, b])),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Node::call("-", vec![a, b])),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Node::call("*", vec![a, b])),
            inner.prop_map(|a| Node::call("-", vec![a])),
        ]
    })
}

proptest! {
    /// `Node::clone` always yields a fully independent subtree (spec.md §9
    /// "Open questions", SPEC_FULL.md §B.6): mutating a clone's leaves never
    /// changes the original, for any expression shape the grammar produces.
    #[test]
    fn clone_is_independent_for_any_expression_shape(node in arith_node()) {
        let mut clone = node.clone();
        mutate_first_double(&mut clone, 999_999.0);
        prop_assert_eq!(
            format!("{node:?}") != format!("{clone:?}") || !contains_double(&node, 999_999.0),
            true
        );
        prop_assert!(!contains_double(&node, 999_999.0) || node_is_literally(&node, 999_999.0));
    }

    /// Parsing then single-line rendering then re-parsing a literal rule is
    /// idempotent: the rendered text of the reparsed rule matches the first
    /// rendering, for any destination/Units multiplier the grammar picks
    /// (spec.md §8 "round-trip ... law").
    #[test]
    fn render_reparse_round_trip(multiplier in -500.0f64..500.0) {
        let cube = d_cube();
        let text = format!("[Measure:Revenue] = {multiplier} * [Measure:Units]");
        let rule = parse_and_validate(&text, &cube).unwrap();
        let rendered = cube_rules::ast::render::rule_to_single_line(&rule, false);
        let reparsed = parse_and_validate(&rendered, &cube).unwrap();
        let rerendered = cube_rules::ast::render::rule_to_single_line(&reparsed, false);
        prop_assert_eq!(rendered, rerendered);
    }

    /// STET-rewrite identity (spec.md §4.6): for every Year/Product cell, a
    /// rule optimized into a STET restriction produces the exact same
    /// observable outcome (skip_all_rules vs. a concrete value) as directly
    /// interpreting `IF(Year = '2024', STET(), value)` would, because the
    /// rewrite is a proof about which branch runs, not a semantic change.
    #[test]
    fn stet_rewrite_agrees_with_direct_interpretation(
        year_idx in 0u32..2,
        product_idx in 0u32..3,
        value in -200.0f64..200.0,
    ) {
        let cube = Arc::new(d_cube());
        cube.set_cell(vec![0, 0, 0], CellValue::Numeric(0.0)); // keep some populated state
        let text = format!("[Measure:Revenue] = IF(Year = '2024', STET(), {value})");
        let ast = parse_and_validate(&text, cube.as_ref()).unwrap();
        let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();
        prop_assert!(rule.is_optimized());

        let path = cube.classify_path(vec![year_idx, product_idx, 1]);
        let mut history = RuleHistory::new();
        let outcome = rule.get_value(&path, None, &mut history);

        if year_idx == 1 {
            // 2024 -> STET(): the rule defers entirely.
            prop_assert!(outcome.skip_all_rules);
        } else {
            // 2023 -> the kept (non-STET) branch, the literal value.
            let result = outcome.result.unwrap();
            prop_assert_eq!(result.double_value, value);
        }
    }

    /// Linear-rule detection never fires on non-`BASE` rules regardless of
    /// the scalar multiplier chosen (spec.md §4.6 "Linearity check").
    #[test]
    fn non_base_rules_are_never_linear(multiplier in -100.0f64..100.0) {
        let cube = d_cube();
        let text = format!("[Measure:Revenue] = {multiplier} * [Measure:Units]");
        let rule = parse_and_validate(&text, &cube).unwrap();
        prop_assert_eq!(rule.option, RuleOption::None);
        let dest_area = match &rule.destination {
            Node::Destination { area, .. } => area.clone(),
            _ => unreachable!(),
        };
        prop_assert!(!cube_rules::optimizer::is_linear(&rule, &dest_area, &cube));
    }
}

fn mutate_first_double(node: &mut Node, new_value: f64) -> bool {
    match node {
        Node::Double(v) => {
            *v = new_value;
            true
        }
        Node::FunctionCall { params, .. } => params.iter_mut().any(|p| mutate_first_double(p, new_value)),
        _ => false,
    }
}

fn contains_double(node: &Node, value: f64) -> bool {
    match node {
        Node::Double(v) => *v == value,
        Node::FunctionCall { params, .. } => params.iter().any(|p| contains_double(p, value)),
        _ => false,
    }
}

fn node_is_literally(node: &Node, value: f64) -> bool {
    matches!(node, Node::Double(v) if *v == value)
}
