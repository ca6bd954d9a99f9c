use criterion::{black_box, criterion_group, criterion_main, Criterion};

use estuary_core::{build_dependency_graph, validate, Cell, RenderScope};

fn chain_scope(depth: usize) -> RenderScope {
    let scope = RenderScope::new();
    scope
        .run(|| {
            let mut current = Cell::new(0i64);
            for _ in 0..depth {
                current = Cell::derive(current.clone(), |x| x + 1);
            }
        })
        .unwrap();
    scope
}

fn fan_out_scope(width: usize) -> RenderScope {
    let scope = RenderScope::new();
    scope
        .run(|| {
            let roots: Vec<Cell<i64>> = (0..width as i64).map(Cell::new).collect();
            let _total = Cell::derive(roots, |values: Vec<i64>| values.iter().sum::<i64>());
        })
        .unwrap();
    scope
}

fn bench_graph(c: &mut Criterion) {
    let chain = chain_scope(512);
    let chain_cells = chain.registered();
    c.bench_function("build/chain-512", |b| {
        b.iter(|| build_dependency_graph(black_box(&chain_cells)).unwrap())
    });

    let fan = fan_out_scope(512);
    let fan_cells = fan.registered();
    c.bench_function("build/fan-512", |b| {
        b.iter(|| build_dependency_graph(black_box(&fan_cells)).unwrap())
    });

    let graph = build_dependency_graph(&chain_cells).unwrap().graph;
    c.bench_function("validate/chain-512", |b| {
        b.iter(|| validate(black_box(&graph)))
    });
}

criterion_group!(benches, bench_graph);
criterion_main!(benches);
