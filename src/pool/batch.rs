use std::{
    panic::{self, AssertUnwindSafe},
    sync::Mutex,
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::{
    error::{Error, Result},
    frontier::{Frontier, TaskDeque},
    incumbent::SharedIncumbent,
    pool::{lock, step_shared},
    problem::Problem,
    stats::SearchStats,
};

/// State the pool threads share with the thread driving the rounds.
pub struct BatchContext<'env, P: Problem> {
    pub problem: &'env P,
    pub incumbent: &'env SharedIncumbent<P>,
    pub queue: &'env Mutex<TaskDeque<P::Subproblem>>,
    pub epsilon: f64,
}

impl<P: Problem> Clone for BatchContext<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Problem> Copy for BatchContext<'_, P> {}

impl<P: Problem> BatchContext<'_, P> {
    fn process(&self, subproblem: P::Subproblem) -> SearchStats {
        let mut stats = SearchStats::default();
        let children = step_shared(
            self.problem,
            self.incumbent,
            self.epsilon,
            &subproblem,
            &mut stats,
        );

        if !children.is_empty() {
            let mut queue = lock(self.queue);
            queue.extend(children);
            stats.observe_frontier(queue.len());
        }
        stats
    }
}

/// Persistent threads that process one work pack per round.
///
/// Every pack entry is evaluated on some pool thread, children are merged back into the
/// shared queue under the queue lock. A round ends once every entry has been processed,
/// so the queue is only ever drained by the thread calling [`BatchPool::run_round`].
pub struct BatchPool<S> {
    job_sender: Sender<S>,
    done_receiver: Receiver<Option<SearchStats>>,
    num_threads: usize,
}

impl<S: Send + 'static> BatchPool<S> {
    /// Spawns `num_threads` pool threads into `scope`. They exit once the pool is dropped.
    pub fn start<'scope, 'env, P>(
        scope: &'scope thread::Scope<'scope, 'env>,
        ctx: BatchContext<'env, P>,
        num_threads: usize,
    ) -> Self
    where
        P: Problem<Subproblem = S>,
    {
        let num_threads = num_threads.max(1);
        let (job_sender, job_receiver) = crossbeam_channel::unbounded::<S>();
        let (done_sender, done_receiver) = crossbeam_channel::unbounded();

        for _ in 0..num_threads {
            let job_receiver = job_receiver.clone();
            let done_sender = done_sender.clone();
            scope.spawn(move || {
                while let Ok(subproblem) = job_receiver.recv() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| ctx.process(subproblem)));
                    let panicked = outcome.is_err();
                    if done_sender.send(outcome.ok()).is_err() || panicked {
                        break;
                    }
                }
            });
        }

        debug!("Started batch pool with {} thread(s)", num_threads);
        Self {
            job_sender,
            done_receiver,
            num_threads,
        }
    }

    /// Processes every entry of `pack` and waits until all of them are done.
    pub fn run_round(&self, pack: Vec<S>) -> Result<SearchStats> {
        let num_jobs = pack.len();
        for subproblem in pack {
            self.job_sender
                .send(subproblem)
                .map_err(|_| Error::WorkerPanicked)?;
        }

        let mut stats = SearchStats::default();
        for _ in 0..num_jobs {
            match self.done_receiver.recv() {
                Ok(Some(job_stats)) => stats.merge(&job_stats),
                Ok(None) | Err(_) => return Err(Error::WorkerPanicked),
            }
        }
        Ok(stats)
    }

    /// Takes up to one item per thread from `queue` and runs them as one round.
    /// Returns `None` once the queue is empty.
    pub fn drain_round(&self, queue: &Mutex<TaskDeque<S>>) -> Result<Option<SearchStats>> {
        let pack: Vec<S> = {
            let mut queue = lock(queue);
            let take = queue.len().min(self.num_threads);
            std::iter::from_fn(|| queue.pop()).take(take).collect()
        };

        if pack.is_empty() {
            return Ok(None);
        }
        self.run_round(pack).map(Some)
    }
}
