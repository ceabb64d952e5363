use std::hint::black_box;

use bnb::{
    bnb::BnbSolver,
    codec::{decode_from_slice, encode_to_vec},
    frontier::Traversal,
    knapsack::{Knapsack, KnapsackNode, parse_knapsack},
    problem::{Goal, Problem},
};
use criterion::{Criterion, criterion_group, criterion_main};

fn instance() -> Knapsack {
    Knapsack::random(40, &mut fastrand::Rng::with_seed(7))
}

fn bench_parse_knapsack(c: &mut Criterion) {
    let data = Knapsack::random(10_000, &mut fastrand::Rng::with_seed(7)).to_instance_string();

    c.bench_function("parse_knapsack", |b| {
        b.iter(|| {
            let _ = parse_knapsack(black_box(data.as_bytes())).unwrap();
        })
    });
}

fn bench_codec(c: &mut Criterion) {
    let problem = instance();
    let mut nodes = vec![problem.initial_subproblem()];
    for _ in 0..20 {
        let children = problem.split(nodes.last().unwrap());
        nodes.extend(children);
    }
    let encoded = encode_to_vec(&nodes).unwrap();

    c.bench_function("encode_nodes", |b| b.iter(|| encode_to_vec(black_box(&nodes)).unwrap()));
    c.bench_function("decode_nodes", |b| {
        b.iter(|| decode_from_slice::<Vec<KnapsackNode>>(black_box(&encoded)).unwrap())
    });
}

fn bench_serial(c: &mut Criterion) {
    let problem = instance();

    for (name, traversal) in [
        ("serial_dfs", Traversal::Dfs),
        ("serial_bfs", Traversal::Bfs),
        ("serial_auto", Traversal::Automatic),
    ] {
        c.bench_function(name, |b| {
            b.iter(|| {
                BnbSolver::new(black_box(&problem), Goal::Maximize, -1, 0.0)
                    .solve(traversal)
                    .bound
            })
        });
    }
}

criterion_group!(benches, bench_parse_knapsack, bench_codec, bench_serial);
criterion_main!(benches);
