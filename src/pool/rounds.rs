use std::{sync::Mutex, thread};

use log::debug;

use crate::{
    bnb::Solution,
    config::SolverConfig,
    error::Result,
    frontier::{Frontier, TaskDeque},
    incumbent::{Incumbent, SharedIncumbent},
    pool::{BatchContext, BatchPool, lock},
    problem::{Goal, Problem},
    scheduler::SchedulerType,
    stats::SearchStats,
};

/// Queue-based shared-memory search: rounds of `min(queue length, threads)` subproblems
/// until the shared queue is empty.
pub fn solve_rounds<P: Problem>(
    problem: &P,
    goal: Goal,
    worst_bound: P::Score,
    config: &SolverConfig,
) -> Result<Solution<P>> {
    config.validate(SchedulerType::Rounds)?;
    let incumbent = SharedIncumbent::new(Incumbent::new(goal, worst_bound));
    let queue = Mutex::new(TaskDeque::new(config.traversal));
    lock(&queue).push(problem.initial_subproblem());

    let stats = thread::scope(|scope| -> Result<SearchStats> {
        let pool = BatchPool::start(
            scope,
            BatchContext {
                problem,
                incumbent: &incumbent,
                queue: &queue,
                epsilon: config.epsilon,
            },
            config.num_threads,
        );

        let mut stats = SearchStats::default();
        let mut num_rounds = 0u64;
        while let Some(round) = pool.drain_round(&queue)? {
            stats.merge(&round);
            num_rounds += 1;
        }
        debug!("Shared queue drained after {} round(s)", num_rounds);
        Ok(stats)
    })?;

    Ok(Solution::from_incumbent(incumbent.into_inner(), stats))
}
