use std::thread::available_parallelism;

use crate::{
    error::{Error, Result},
    frontier::Traversal,
    scheduler::SchedulerType,
};

/// Tunables shared by all schedulers. Each scheduler reads the subset it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Local iterations between two contacts with the coordinator or peers.
    pub communication_frequency: usize,
    /// Maximum number of subproblems in one transfer.
    pub max_package_size: usize,
    /// Bounds closer than this are considered converged and not split further.
    pub epsilon: f64,
    pub traversal: Traversal,
    /// Threads per process for the shared-memory and hybrid schedulers.
    pub num_threads: usize,
    /// Number of ranks for the distributed schedulers.
    pub num_ranks: usize,
    /// Bound exchange rounds per idle-status round of the work-stealing scheduler.
    pub termination_check_frequency: usize,
    /// Share of its queue a work-stealing victim hands out.
    pub steal_fraction: f64,
    /// Whether the coordinator pre-splits the root to give every worker a first package.
    pub initial_fanout: bool,
    /// Seed for victim selection.
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            communication_frequency: 64,
            max_package_size: 8,
            epsilon: 0.0,
            traversal: Traversal::Dfs,
            num_threads: available_parallelism().map(|n| n.get()).unwrap_or(1),
            num_ranks: 4,
            termination_check_frequency: 4,
            steal_fraction: 0.5,
            initial_fanout: true,
            seed: 0x5eed,
        }
    }
}

impl SolverConfig {
    pub fn with_communication_frequency(mut self, communication_frequency: usize) -> Self {
        self.communication_frequency = communication_frequency;
        self
    }

    pub fn with_max_package_size(mut self, max_package_size: usize) -> Self {
        self.max_package_size = max_package_size;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_ranks(mut self, num_ranks: usize) -> Self {
        self.num_ranks = num_ranks;
        self
    }

    pub fn with_termination_check_frequency(mut self, frequency: usize) -> Self {
        self.termination_check_frequency = frequency;
        self
    }

    pub fn with_steal_fraction(mut self, steal_fraction: f64) -> Self {
        self.steal_fraction = steal_fraction;
        self
    }

    pub fn with_initial_fanout(mut self, initial_fanout: bool) -> Self {
        self.initial_fanout = initial_fanout;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks that the configuration can run the given scheduler.
    pub fn validate(&self, scheduler: SchedulerType) -> Result<()> {
        let name = scheduler.name();

        if !(self.epsilon >= 0.0) {
            return Err(Error::config(name, format!("epsilon must be >= 0, got {}", self.epsilon)));
        }

        if scheduler.uses_threads() && self.num_threads == 0 {
            return Err(Error::config(name, "needs at least 1 thread, got 0"));
        }

        if scheduler.is_distributed() {
            if self.num_ranks < 2 {
                return Err(Error::config(
                    name,
                    format!("needs at least 2 ranks, got {}", self.num_ranks),
                ));
            }
            if self.communication_frequency == 0 {
                return Err(Error::config(name, "communication frequency must be >= 1"));
            }
            if self.max_package_size == 0 {
                return Err(Error::config(name, "max package size must be >= 1"));
            }
        }

        if scheduler == SchedulerType::WorkStealing {
            if self.termination_check_frequency == 0 {
                return Err(Error::config(name, "termination check frequency must be >= 1"));
            }
            if !(self.steal_fraction > 0.0 && self.steal_fraction <= 1.0) {
                return Err(Error::config(
                    name,
                    format!("steal fraction must be in (0, 1], got {}", self.steal_fraction),
                ));
            }
        }

        Ok(())
    }
}
