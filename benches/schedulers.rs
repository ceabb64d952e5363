use std::hint::black_box;

use bnb::{
    config::SolverConfig, knapsack::Knapsack, problem::Goal, scheduler::SchedulerType,
    scheduler::Solver,
};
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_schedulers(c: &mut Criterion) {
    let problem = Knapsack::random(60, &mut fastrand::Rng::with_seed(42));
    let config = SolverConfig::default().with_ranks(4).with_threads(4);

    let mut group = c.benchmark_group("schedulers");
    group.sample_size(10);
    for scheduler in SchedulerType::ALL {
        let solver = Solver::new(scheduler, config.clone()).unwrap();
        group.bench_function(scheduler.name(), |b| {
            b.iter(|| solver.solve(black_box(&problem), Goal::Maximize, -1).unwrap().bound)
        });
    }
    group.finish();
}

criterion_group!(benches, bench_schedulers);
criterion_main!(benches);
