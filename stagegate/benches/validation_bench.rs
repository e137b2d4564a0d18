//! Benchmarks for module tree validation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stagegate::testing::ModuleTreeFixture;
use stagegate::validation::ModuleValidator;

fn module_tree(modules: usize) -> ModuleTreeFixture {
    let mut fixture = ModuleTreeFixture::new();
    for i in 0..modules {
        fixture = fixture.with_module(&format!("mod_{i}"));
        fixture.write(
            &format!("modules/mod_{i}/src/lib.rs"),
            "pub fn lookup(db: &Db, id: i64) -> Row {\n    db.query(\"SELECT * FROM t WHERE id = $1\", &[&id])\n}\n",
        );
    }
    fixture
}

fn validation_benchmark(c: &mut Criterion) {
    let validator = ModuleValidator::default();
    let mut group = c.benchmark_group("module_lint");

    for modules in [1, 10, 50] {
        let fixture = module_tree(modules);
        let tree = fixture.tree();
        group.bench_with_input(BenchmarkId::from_parameter(modules), &tree, |b, tree| {
            b.iter(|| black_box(validator.validate(tree)));
        });
    }

    group.finish();
}

criterion_group!(benches, validation_benchmark);
criterion_main!(benches);
