//! Rule evaluation throughput benchmarks: a plain literal rule, a
//! STET-optimized rule (restricted-area short-circuit vs. the kept branch),
//! and a marker-bearing rule, scaled by how many cells are requested.

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use cube_rules::cube::{Cube, MemoryCube, MemoryDimension};
use cube_rules::value::CellValue;
use cube_rules::{parse_and_validate, Rule, RuleHistory};

fn no_lookup(_db: &str, _cube: &str) -> Option<Arc<dyn Cube>> {
    None
}

fn make_cube(products: u32) -> Arc<MemoryCube> {
    let mut product_dim = MemoryDimension::new(1, "Product");
    for p in 0..products {
        product_dim = product_dim.with_base_element(p, &format!("P{p}"), true);
    }
    let cube = MemoryCube::new(
        "D",
        vec![
            MemoryDimension::new(0, "Year")
                .with_base_element(0, "2023", true)
                .with_base_element(1, "2024", true),
            product_dim,
            MemoryDimension::new(2, "Measure")
                .with_base_element(0, "Units", true)
                .with_base_element(1, "Revenue", true),
        ],
    );
    for p in 0..products {
        cube.set_cell(vec![1, p, 0], CellValue::Numeric(p as f64));
    }
    Arc::new(cube)
}

fn bench_literal_rule(c: &mut Criterion) {
    let cube = make_cube(100);
    let ast = parse_and_validate("[Measure:Revenue] = 2.0 * [Measure:Units]", cube.as_ref()).unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();

    let mut counter = 0u32;
    c.bench_function("literal_rule_eval", |b| {
        b.iter(|| {
            let product = counter % 100;
            counter = counter.wrapping_add(1);
            let path = cube.classify_path(vec![1, product, 1]);
            let mut history = RuleHistory::new();
            rule.get_value(&path, None, &mut history)
        });
    });
}

fn bench_stet_optimized_rule(c: &mut Criterion) {
    let cube = make_cube(100);
    let ast = parse_and_validate(
        "[Measure:Revenue] = IF(Year = '2024', STET(), 0.0)",
        cube.as_ref(),
    )
    .unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();
    assert!(rule.is_optimized());

    let mut group = c.benchmark_group("stet_optimized_rule_eval");
    for &year in &[0u32, 1u32] {
        group.bench_with_input(BenchmarkId::from_parameter(year), &year, |b, &y| {
            let mut counter = 0u32;
            b.iter(|| {
                let product = counter % 100;
                counter = counter.wrapping_add(1);
                let path = cube.classify_path(vec![y, product, 1]);
                let mut history = RuleHistory::new();
                rule.get_value(&path, None, &mut history)
            });
        });
    }
    group.finish();
}

fn bench_marker_rule(c: &mut Criterion) {
    let cube = make_cube(100);
    let ast = parse_and_validate("[Measure:Revenue] = SUM([[Measure:Units]])", cube.as_ref()).unwrap();
    let rule = Rule::new(cube.clone() as Arc<dyn Cube>, ast, false, "", true, no_lookup).unwrap();
    assert!(!rule.is_optimized());

    let mut counter = 0u32;
    c.bench_function("marker_rule_eval", |b| {
        b.iter(|| {
            let product = counter % 100;
            counter = counter.wrapping_add(1);
            let path = cube.classify_path(vec![1, product, 1]);
            let mut history = RuleHistory::new();
            rule.get_value(&path, None, &mut history)
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets = bench_literal_rule, bench_stet_optimized_rule, bench_marker_rule
}
criterion_main!(benches);
