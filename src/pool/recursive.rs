use std::{
    iter,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
};

use crossbeam_deque::{Injector, Stealer, Worker};
use log::{debug, trace};

use crate::{
    bnb::Solution,
    config::SolverConfig,
    error::{Error, Result},
    frontier::Traversal,
    incumbent::{Incumbent, SharedIncumbent},
    pool::step_shared,
    problem::{Goal, Problem},
    scheduler::SchedulerType,
    stats::SearchStats,
    utils::Backoff,
};

/// Everything a task thread shares with its peers.
struct TaskContext<'env, P: Problem> {
    problem: &'env P,
    incumbent: &'env SharedIncumbent<P>,
    injector: &'env Injector<P::Subproblem>,
    stealers: &'env [Stealer<P::Subproblem>],
    /// Spawned but not yet retired tasks. Reaches zero only once the tree is exhausted.
    pending: &'env AtomicUsize,
    failed: &'env AtomicBool,
    epsilon: f64,
}

impl<P: Problem> TaskContext<'_, P> {
    fn run(&self, thread_id: usize, local: Worker<P::Subproblem>) -> Result<SearchStats> {
        let mut stats = SearchStats::default();
        let mut backoff = Backoff::for_idle_polling();

        loop {
            let Some(subproblem) = self.find_task(&local) else {
                if self.pending.load(Ordering::Acquire) == 0 || self.failed.load(Ordering::Acquire)
                {
                    break;
                }
                backoff.wait();
                continue;
            };
            backoff.reset();

            let children = panic::catch_unwind(AssertUnwindSafe(|| {
                step_shared(
                    self.problem,
                    self.incumbent,
                    self.epsilon,
                    &subproblem,
                    &mut stats,
                )
            }))
            .map_err(|_| {
                self.failed.store(true, Ordering::Release);
                Error::WorkerPanicked
            })?;

            // Children are counted before their parent retires
            self.pending.fetch_add(children.len(), Ordering::AcqRel);
            for child in children {
                local.push(child);
            }
            stats.observe_frontier(local.len());
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }

        trace!("Task thread {} finished: {:?}", thread_id, stats);
        Ok(stats)
    }

    fn find_task(&self, local: &Worker<P::Subproblem>) -> Option<P::Subproblem> {
        local.pop().or_else(|| {
            iter::repeat_with(|| {
                self.injector
                    .steal_batch_and_pop(local)
                    .or_else(|| self.stealers.iter().map(Stealer::steal).collect())
            })
            .find(|steal| !steal.is_retry())
            .and_then(|steal| steal.success())
        })
    }
}

/// Task-recursive shared-memory search on a fixed set of work-stealing threads.
///
/// Every subproblem is a task. Its children become new tasks on the local deque of the
/// thread that processed it, idle threads steal from the global injector and their peers.
/// The call returns once the pending-task counter drops to zero.
pub fn solve_recursive<P: Problem>(
    problem: &P,
    goal: Goal,
    worst_bound: P::Score,
    config: &SolverConfig,
) -> Result<Solution<P>> {
    config.validate(SchedulerType::Recursive)?;
    let num_threads = config.num_threads;
    let incumbent = SharedIncumbent::new(Incumbent::new(goal, worst_bound));
    let injector = Injector::new();
    injector.push(problem.initial_subproblem());
    let pending = AtomicUsize::new(1);
    let failed = AtomicBool::new(false);

    let locals: Vec<Worker<P::Subproblem>> = (0..num_threads)
        .map(|_| match config.traversal {
            Traversal::Bfs => Worker::new_fifo(),
            Traversal::Dfs | Traversal::Automatic => Worker::new_lifo(),
        })
        .collect();
    let stealers: Vec<_> = locals.iter().map(Worker::stealer).collect();

    let ctx = TaskContext {
        problem,
        incumbent: &incumbent,
        injector: &injector,
        stealers: &stealers,
        pending: &pending,
        failed: &failed,
        epsilon: config.epsilon,
    };

    let per_thread = thread::scope(|scope| {
        let handles: Vec<_> = locals
            .into_iter()
            .enumerate()
            .map(|(thread_id, local)| {
                let ctx = &ctx;
                scope.spawn(move || ctx.run(thread_id, local))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| Error::WorkerPanicked)
                    .and_then(|stats| stats)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut stats = SearchStats::default();
    for thread_stats in &per_thread {
        stats.merge(thread_stats);
    }
    debug!(
        "Recursive search finished on {} thread(s), {} subproblems explored",
        num_threads, stats.explored
    );

    Ok(Solution::from_incumbent(incumbent.into_inner(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bnb::tests::Assignment,
        knapsack::{Knapsack, fixture},
        pool::tests::Exploding,
    };

    #[test]
    fn test_fixtures() {
        for traversal in [Traversal::Dfs, Traversal::Bfs, Traversal::Automatic] {
            for (capacity, expected) in [(10, 30), (100, 36), (1, 0)] {
                let problem = fixture(capacity);
                let config = SolverConfig::default()
                    .with_threads(4)
                    .with_traversal(traversal);
                let solution = solve_recursive(&problem, Goal::Maximize, -1, &config).unwrap();
                assert_eq!(solution.value(&problem), Some(expected), "{:?}", traversal);
                assert_eq!(solution.bound, expected);
            }
        }
    }

    #[test]
    fn test_zero_threads_is_rejected() {
        let config = SolverConfig::default().with_threads(0);
        let result = solve_recursive(&fixture(10), Goal::Maximize, -1, &config);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = fastrand::Rng::new();
        println!("Seed: {}", rng.get_seed());

        for _ in 0..10 {
            let problem = Knapsack::random(rng.usize(1..16), &mut rng);
            let config = SolverConfig::default().with_threads(rng.usize(1..5));
            let solution = solve_recursive(&problem, Goal::Maximize, -1, &config).unwrap();
            assert_eq!(solution.value(&problem), Some(problem.brute_force()));
        }

        for _ in 0..5 {
            let problem = Assignment::random(rng.usize(2..6), &mut rng);
            let config = SolverConfig::default().with_threads(3);
            let solution = solve_recursive(&problem, Goal::Minimize, i64::MAX, &config).unwrap();
            assert_eq!(solution.value(&problem), Some(problem.brute_force()));
        }
    }

    #[test]
    fn test_every_task_is_retired() {
        let mut rng = fastrand::Rng::with_seed(11);
        let problem = Knapsack::random(18, &mut rng);
        let config = SolverConfig::default().with_threads(4);

        let serial = crate::bnb::BnbSolver::new(&problem, Goal::Maximize, -1, 0.0)
            .solve(Traversal::Dfs);
        let parallel = solve_recursive(&problem, Goal::Maximize, -1, &config).unwrap();

        // Every evaluated node either branched into two children or ended there
        let stats = parallel.stats;
        assert_eq!(stats.explored, 1 + 2 * stats.branched);
        assert_eq!(parallel.bound, serial.bound);
    }

    #[test]
    fn test_panicking_problem_is_reported() {
        let problem = Exploding {
            depth: 8,
            explode_at: 100,
        };
        let config = SolverConfig::default().with_threads(3);
        let result = solve_recursive(&problem, Goal::Maximize, -1, &config);
        assert!(matches!(result, Err(Error::WorkerPanicked)));
    }
}
