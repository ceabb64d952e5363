pub mod batch;
pub mod recursive;
pub mod rounds;

use std::sync::{Mutex, MutexGuard};

use log::debug;

pub use batch::{BatchContext, BatchPool};
pub use recursive::solve_recursive;
pub use rounds::solve_rounds;

use crate::{
    bnb::{Evaluation, evaluate},
    incumbent::SharedIncumbent,
    problem::Problem,
    stats::SearchStats,
};

/// Evaluates one subproblem against the incumbent shared by all threads of the process
/// and returns its children. A fully feasible subproblem is offered under the incumbent lock.
pub(crate) fn step_shared<P: Problem>(
    problem: &P,
    incumbent: &SharedIncumbent<P>,
    epsilon: f64,
    subproblem: &P::Subproblem,
    stats: &mut SearchStats,
) -> Vec<P::Subproblem> {
    let evaluation = evaluate(
        problem,
        incumbent.goal(),
        epsilon,
        subproblem,
        incumbent.bound(),
    );
    evaluation.record(stats);

    match evaluation {
        Evaluation::Evaluated {
            full_value,
            children,
        } => {
            if let Some(value) = full_value {
                if incumbent.offer(subproblem, value) {
                    stats.improvements += 1;
                    debug!("New shared incumbent with value {}", value);
                }
            }
            children
        }
        Evaluation::Pruned | Evaluation::Infeasible => Vec::new(),
    }
}

/// Locks a shared task container. A thread that panicked while holding the lock only ever
/// appended whole items, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use serde::{Deserialize, Serialize};

    use crate::problem::{Bounds, Feasibility, Problem};

    /// Full binary tree of the given depth whose bounding panics at one leaf.
    pub(crate) struct Exploding {
        pub depth: u32,
        pub explode_at: u64,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Path {
        pub depth: u32,
        pub index: u64,
    }

    impl Problem for Exploding {
        type Subproblem = Path;
        type Score = i64;

        fn initial_subproblem(&self) -> Path {
            Path { depth: 0, index: 0 }
        }

        fn split(&self, path: &Path) -> Vec<Path> {
            (0..2)
                .map(|bit| Path {
                    depth: path.depth + 1,
                    index: path.index * 2 + bit,
                })
                .collect()
        }

        fn feasibility(&self, path: &Path) -> Feasibility {
            if path.depth == self.depth {
                Feasibility::Full
            } else {
                Feasibility::Partial
            }
        }

        fn bounds(&self, path: &Path) -> Bounds<i64> {
            // Inner nodes are never pruned => every leaf gets bounded
            if path.depth < self.depth {
                return Bounds::new(1, 0);
            }
            assert_ne!(path.index, self.explode_at, "boom");
            Bounds::new(0, 0)
        }

        fn contained_upper_bound(&self, _path: &Path) -> i64 {
            0
        }
    }
}
