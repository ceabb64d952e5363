use std::{sync::Mutex, thread};

use log::info;

use crate::{
    bnb::Solution,
    comm::Communicator,
    config::SolverConfig,
    distributed::{
        gather_best,
        master_worker::{WorkerEngine, coordinate, run_worker},
        run_cluster,
    },
    error::Result,
    frontier::{Frontier, TaskDeque},
    incumbent::{Incumbent, SharedIncumbent},
    pool::{BatchContext, BatchPool, lock},
    problem::{Goal, Problem},
    scheduler::SchedulerType,
    stats::SearchStats,
};

/// Worker engine that runs the shared-memory rounds of a [`BatchPool`] between two
/// contacts with the coordinator.
struct HybridEngine<'env, P: Problem> {
    pool: &'env BatchPool<P::Subproblem>,
    queue: &'env Mutex<TaskDeque<P::Subproblem>>,
    incumbent: &'env SharedIncumbent<P>,
    rounds_per_slice: usize,
    stats: SearchStats,
}

impl<P: Problem> WorkerEngine<P> for HybridEngine<'_, P> {
    fn bound(&self) -> P::Score {
        self.incumbent.bound()
    }

    fn tighten(&mut self, bound: P::Score) {
        self.incumbent.tighten(bound);
    }

    fn receive(&mut self, subproblems: Vec<P::Subproblem>) {
        let mut queue = lock(self.queue);
        queue.extend(subproblems);
        self.stats.observe_frontier(queue.len());
    }

    fn queue_len(&self) -> usize {
        lock(self.queue).len()
    }

    fn advance(&mut self) -> Result<()> {
        for _ in 0..self.rounds_per_slice {
            match self.pool.drain_round(self.queue)? {
                Some(round) => self.stats.merge(&round),
                None => break,
            }
        }
        Ok(())
    }

    fn take_for_transfer(&mut self) -> Option<P::Subproblem> {
        lock(self.queue).split_off(1).pop()
    }

    fn stats_mut(&mut self) -> &mut SearchStats {
        &mut self.stats
    }
}

fn hybrid_worker<P, C>(
    comm: &mut C,
    problem: &P,
    goal: Goal,
    worst_bound: P::Score,
    config: &SolverConfig,
) -> Result<(Incumbent<P>, SearchStats)>
where
    P: Problem,
    C: Communicator + ?Sized,
{
    let incumbent = SharedIncumbent::new(Incumbent::new(goal, worst_bound));
    let queue = Mutex::new(TaskDeque::new(config.traversal));

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
        let mut engine = HybridEngine {
            pool: &pool,
            queue: &queue,
            incumbent: &incumbent,
            rounds_per_slice: config.communication_frequency,
            stats: SearchStats::default(),
        };

        // Every slice already spans `communication_frequency` rounds
        run_worker(comm, problem, goal, &mut engine, 1, config.max_package_size)?;
        Ok(engine.stats)
    })?;

    Ok((incumbent.into_inner(), stats))
}

/// Master-worker search whose workers each run a thread pool of `config.num_threads`
/// threads between communication rounds.
pub fn solve_hybrid<P: Problem>(
    problem: &P,
    goal: Goal,
    worst_bound: P::Score,
    config: &SolverConfig,
) -> Result<Solution<P>> {
    config.validate(SchedulerType::Hybrid)?;
    info!(
        "Running hybrid search on {} ranks with {} thread(s) each",
        config.num_ranks, config.num_threads
    );

    run_cluster(config.num_ranks, |comm| {
        let (incumbent, stats) = if comm.rank() == 0 {
            coordinate(comm, problem, goal, worst_bound, config)?
        } else {
            hybrid_worker(comm, problem, goal, worst_bound, config)?
        };
        gather_best(comm, problem, incumbent, stats)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bnb::tests::Assignment,
        distributed::tests::within_timeout,
        error::Error,
        knapsack::{Knapsack, fixture},
        pool::tests::Exploding,
    };

    #[test]
    fn test_fixtures() {
        for (ranks, threads) in [(2, 1), (3, 2), (4, 3)] {
            for (capacity, expected) in [(10, 30), (100, 36), (1, 0)] {
                let value = within_timeout(30, move || {
                    let problem = fixture(capacity);
                    let config = SolverConfig::default()
                        .with_ranks(ranks)
                        .with_threads(threads)
                        .with_communication_frequency(1);
                    solve_hybrid(&problem, Goal::Maximize, -1, &config)
                        .unwrap()
                        .value(&problem)
                });
                assert_eq!(value, Some(expected), "{} ranks x {} threads", ranks, threads);
            }
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = fastrand::Rng::new();
        println!("Seed: {}", rng.get_seed());

        for _ in 0..5 {
            let problem = Knapsack::random(rng.usize(4..16), &mut rng);
            let expected = problem.brute_force();
            let value = within_timeout(30, move || {
                let config = SolverConfig::default()
                    .with_ranks(3)
                    .with_threads(2)
                    .with_communication_frequency(2)
                    .with_max_package_size(2);
                solve_hybrid(&problem, Goal::Maximize, -1, &config)
                    .unwrap()
                    .value(&problem)
            });
            assert_eq!(value, Some(expected));
        }

        let problem = Assignment::random(5, &mut rng);
        let expected = problem.brute_force();
        let value = within_timeout(30, move || {
            let config = SolverConfig::default().with_ranks(3).with_threads(2);
            solve_hybrid(&problem, Goal::Minimize, i64::MAX, &config)
                .unwrap()
                .value(&problem)
        });
        assert_eq!(value, Some(expected));
    }

    #[test]
    fn test_panicking_pool_thread_fails_the_run() {
        let result = within_timeout(30, || {
            let problem = Exploding {
                depth: 7,
                explode_at: 3,
            };
            let config = SolverConfig::default()
                .with_ranks(3)
                .with_threads(2)
                .with_communication_frequency(1);
            solve_hybrid(&problem, Goal::Maximize, -1, &config).map(|solution| solution.bound)
        });
        assert!(matches!(result, Err(Error::WorkerPanicked)), "{:?}", result);
    }
}
