//! End-to-end scenarios: Parser -> Validate -> Rule -> Evaluator, against
//! the `D` cube (Year{2023,2024} x Product{A,B,C} x Measure{Units,Revenue})
//! and, for the cross-cube scenario, a second `SalesRaw` cube.

use std::sync::Arc;

use cube_rules::ast::area::{Area, AreaInput};
use cube_rules::cube::{Cube, MemoryCube, MemoryDimension};
use cube_rules::value::CellValue;
use cube_rules::{parse_and_validate, Rule, RuleHistory};

fn year_dim() -> MemoryDimension {
    MemoryDimension::new(0, "Year")
        .with_base_element(0, "2023", true)
        .with_base_element(1, "2024", true)
}

fn product_dim() -> MemoryDimension {
    MemoryDimension::new(1, "Product")
        .with_base_element(0, "A", true)
        .with_base_element(1, "B", true)
        .with_base_element(2, "C", true)
}

fn measure_dim() -> MemoryDimension {
    MemoryDimension::new(2, "Measure")
        .with_base_element(0, "Units", true)
        .with_base_element(1, "Revenue", true)
}

fn d_cube() -> MemoryCube {
    MemoryCube::new("D", vec![year_dim(), product_dim(), measure_dim()])
}

fn no_lookup(_db: &str, _cube: &str) -> Option<Arc<dyn Cube>> {
    None
}

#[test]
fn literal_rule_scales_a_source_cell() {
    let cube = Arc::new(d_cube());
    cube.set_cell(vec![1, 0, 0], CellValue::Numeric(10.0)); // 2024, A, Units = 10
    let ast = parse_and_validate("[Measure:Revenue] = 2.0 * [Measure:Units]", cube.as_ref()).unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();

    let path = cube.classify_path(vec![1, 0, 1]); // 2024, A, Revenue
    let mut history = RuleHistory::new();
    let outcome = rule.get_value(&path, None, &mut history);
    assert_eq!(outcome.result.unwrap().double_value, 20.0);
}

#[test]
fn stet_rule_is_optimized_and_short_circuits_outside_restricted_area() {
    let cube = Arc::new(d_cube());
    let ast = parse_and_validate(
        "[Measure:Revenue] = IF(Year = '2024', STET(), 0.0)",
        cube.as_ref(),
    )
    .unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();

    assert!(rule.is_optimized());
    assert_eq!(rule.restricted_dimension(), Some(0));

    // 2024 falls outside the restricted (complement) area -> STET.
    let path_2024 = cube.classify_path(vec![1, 0, 1]);
    let mut history = RuleHistory::new();
    assert!(rule.get_value(&path_2024, None, &mut history).skip_all_rules);

    // 2023 falls inside the restricted area -> the kept branch runs.
    let path_2023 = cube.classify_path(vec![0, 0, 1]);
    let mut history = RuleHistory::new();
    let outcome = rule.get_value(&path_2023, None, &mut history);
    assert_eq!(outcome.result.unwrap().double_value, 0.0);
}

#[test]
fn linear_rule_is_flagged_by_the_optimizer() {
    let cube = Arc::new(d_cube());
    let ast = parse_and_validate("[Measure:Revenue] = N:1.1 * [Measure:Units]", cube.as_ref()).unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();
    assert!(rule.linear_rule());
    // Linearity doesn't disable the normal evaluation path.
    cube.set_cell(vec![0, 2, 0], CellValue::Numeric(50.0)); // 2023, C, Units
    let path = cube.classify_path(vec![0, 2, 1]);
    let mut history = RuleHistory::new();
    let outcome = rule.get_value(&path, None, &mut history);
    assert_eq!(outcome.result.unwrap().double_value, 55.0);
}

#[test]
fn same_cube_marker_rule_registers_on_both_sides_and_sums_its_source() {
    let cube = Arc::new(d_cube());
    cube.set_cell(vec![1, 1, 0], CellValue::Numeric(7.0)); // 2024, B, Units
    let ast = parse_and_validate("[Measure:Revenue] = SUM([[Measure:Units]])", cube.as_ref()).unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();

    // A rule with a marker is never optimized (spec.md §4.6).
    assert!(!rule.is_optimized());
    assert_eq!(rule.markers.len(), 1);
    let marker_id = rule.markers[0].id;
    assert!(cube.from_markers().iter().any(|m| m.id == marker_id));
    assert!(cube.to_markers().iter().any(|m| m.id == marker_id));

    let path = cube.classify_path(vec![1, 1, 1]); // 2024, B, Revenue
    let mut history = RuleHistory::new();
    let outcome = rule.get_value(&path, None, &mut history);
    assert_eq!(outcome.result.unwrap().double_value, 7.0);
}

/// Cross-cube marker via `PALO.MARKER`: `D.[Year:2024,Measure:Revenue]`
/// depends on `SalesRaw`'s `(2024, <Product>, Units)`, where `Product` is
/// shared by name between the two cubes but has different element ids --
/// the marker's `mapping` table is what bridges them (spec.md §4.7).
#[test]
fn cross_cube_marker_permutes_and_remaps_by_element_name() {
    let d = Arc::new(d_cube());

    let sales_raw_year = MemoryDimension::new(0, "Year").with_base_element(0, "2024", true);
    let sales_raw_product = MemoryDimension::new(1, "Product")
        .with_base_element(0, "C", true)
        .with_base_element(1, "A", true)
        .with_base_element(2, "B", true);
    let sales_raw_measure = MemoryDimension::new(2, "Measure").with_base_element(0, "Units", true);
    let sales_raw = Arc::new(MemoryCube::new(
        "SalesRaw",
        vec![sales_raw_year, sales_raw_product, sales_raw_measure],
    ));

    let lookup = {
        let sales_raw = sales_raw.clone();
        move |_db: &str, cube_name: &str| -> Option<Arc<dyn Cube>> {
            if cube_name == "SalesRaw" {
                Some(sales_raw.clone() as Arc<dyn Cube>)
            } else {
                None
            }
        }
    };

    let ast = parse_and_validate(
        "[Year:2024,Measure:Revenue] = PALO.MARKER('db','SalesRaw','2024',Product,'Units')",
        d.as_ref(),
    )
    .unwrap();
    let rule = Rule::new(d.clone() as Arc<dyn Cube>, ast, false, "", true, lookup).unwrap();

    assert!(!rule.is_optimized(), "rules with markers are never optimized");
    assert_eq!(rule.markers.len(), 1);
    let marker = &rule.markers[0];
    assert_eq!(marker.from_cube, "SalesRaw");
    assert_eq!(marker.to_cube, "D");
    assert!(marker.use_mapping);

    // Year and Measure are pinned on the destination -> fixed, no permutation.
    assert_eq!(marker.permutations[0], cube_rules::IdentifierType::MAX);
    assert_eq!(marker.permutations[2], cube_rules::IdentifierType::MAX);
    // Product is unpinned and carried by the `Product` variable at path
    // position 1 (`path = ['2024', Product, 'Units']`).
    assert_eq!(marker.permutations[1], 1);

    // SalesRaw's Product ids are deliberately reordered relative to D's; the
    // mapping table translates SalesRaw's "A" (id 1) to D's "A" (id 0).
    assert_eq!(marker.mapping[1][1], 0);
    assert_eq!(marker.mapping[1][0], 2); // SalesRaw "C" (id 0) -> D "C" (id 2)

    assert!(d.to_markers().iter().any(|m| m.id == marker.id));

    // Live evaluation never routes across cubes (spec.md §1 out of scope);
    // PALO.MARKER's own evaluation is the zero of its type, and the rule is
    // still tagged as reaching into another database.
    let path = d.classify_path(vec![1, 0, 1]); // 2024, A, Revenue
    let mut history = RuleHistory::new();
    let outcome = rule.get_value(&path, None, &mut history);
    assert_eq!(outcome.result.unwrap().double_value, 0.0);
}

/// Round-robin area resolution never depends on the order unqualified
/// tokens were written in (spec.md §4.2): two rules differing only in
/// token order resolve to the same destination area and therefore cover
/// the same cells.
#[test]
fn round_robin_resolution_is_order_independent() {
    let rr = MemoryCube::new(
        "RR",
        vec![
            MemoryDimension::new(0, "X").with_base_element(0, "Alpha", true),
            MemoryDimension::new(1, "Y").with_base_element(0, "Beta", true),
        ],
    );

    let direct = Area::resolve(&rr, &AreaInput::names(vec![(None, Some("Alpha".into())), (None, Some("Beta".into()))]))
        .unwrap();
    let swapped = Area::resolve(&rr, &AreaInput::names(vec![(None, Some("Beta".into())), (None, Some("Alpha".into()))]))
        .unwrap();

    assert_eq!(direct.sets, swapped.sets);
    assert_eq!(direct.element_ids, swapped.element_ids);
}

#[test]
fn continue_rule_defers_to_other_rules() {
    let cube = Arc::new(d_cube());
    let ast = parse_and_validate(
        "[Measure:Revenue] = IF(Year = '2024', 5.0, CONTINUE())",
        cube.as_ref(),
    )
    .unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();

    let path_2023 = cube.classify_path(vec![0, 0, 1]);
    let mut history = RuleHistory::new();
    let outcome = rule.get_value(&path_2023, None, &mut history);
    assert!(outcome.skip_rule);
    assert!(outcome.result.is_none());
}
