use log::info;

use crate::{
    bnb::{BnbSolver, Solution},
    config::SolverConfig,
    distributed::{MasterWorkerVariant, solve_hybrid, solve_master_worker, solve_work_stealing},
    error::Result,
    frontier::Traversal,
    pool::{solve_recursive, solve_rounds},
    problem::{Goal, Problem},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerType {
    /// Single-threaded engine.
    Serial,
    /// Task-recursive thread pool with work stealing between threads.
    Recursive,
    /// Shared queue processed in rounds by a thread pool.
    Rounds,
    /// Master-worker, one subproblem per allocated worker.
    Default,
    /// Master-worker with best-first queues on the workers.
    Priority,
    /// Master-worker with packages of up to `max_package_size` subproblems.
    MasterWorker,
    /// Master-worker whose workers run a thread pool.
    Hybrid,
    /// Decentralized random work stealing.
    WorkStealing,
}

impl SchedulerType {
    pub const ALL: [SchedulerType; 8] = [
        SchedulerType::Serial,
        SchedulerType::Recursive,
        SchedulerType::Rounds,
        SchedulerType::Default,
        SchedulerType::Priority,
        SchedulerType::MasterWorker,
        SchedulerType::Hybrid,
        SchedulerType::WorkStealing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SchedulerType::Serial => "serial",
            SchedulerType::Recursive => "recursive",
            SchedulerType::Rounds => "rounds",
            SchedulerType::Default => "default",
            SchedulerType::Priority => "priority",
            SchedulerType::MasterWorker => "master-worker",
            SchedulerType::Hybrid => "hybrid",
            SchedulerType::WorkStealing => "work-stealing",
        }
    }

    /// Whether the scheduler runs a thread pool of `num_threads` threads.
    pub fn uses_threads(self) -> bool {
        matches!(
            self,
            SchedulerType::Recursive | SchedulerType::Rounds | SchedulerType::Hybrid
        )
    }

    /// Whether the scheduler runs on `num_ranks` communicating ranks.
    pub fn is_distributed(self) -> bool {
        matches!(
            self,
            SchedulerType::Default
                | SchedulerType::Priority
                | SchedulerType::MasterWorker
                | SchedulerType::Hybrid
                | SchedulerType::WorkStealing
        )
    }
}

impl std::fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SchedulerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('_', "-");
        SchedulerType::ALL
            .into_iter()
            .find(|scheduler| scheduler.name() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown scheduler: {}. Use one of: {}",
                    s,
                    SchedulerType::ALL.map(SchedulerType::name).join(", ")
                )
            })
    }
}

/// One way of distributing the search.
pub trait Scheduler<P: Problem> {
    fn execute(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>>;
}

struct SerialScheduler {
    traversal: Traversal,
    epsilon: f64,
}

impl<P: Problem> Scheduler<P> for SerialScheduler {
    fn execute(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>> {
        Ok(BnbSolver::new(problem, goal, worst_bound, self.epsilon).solve(self.traversal))
    }
}

struct RecursiveScheduler(SolverConfig);

impl<P: Problem> Scheduler<P> for RecursiveScheduler {
    fn execute(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>> {
        solve_recursive(problem, goal, worst_bound, &self.0)
    }
}

struct RoundsScheduler(SolverConfig);

impl<P: Problem> Scheduler<P> for RoundsScheduler {
    fn execute(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>> {
        solve_rounds(problem, goal, worst_bound, &self.0)
    }
}

struct MasterWorkerScheduler {
    config: SolverConfig,
    variant: MasterWorkerVariant,
}

impl<P: Problem> Scheduler<P> for MasterWorkerScheduler {
    fn execute(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>> {
        solve_master_worker(problem, goal, worst_bound, &self.config, self.variant)
    }
}

struct HybridScheduler(SolverConfig);

impl<P: Problem> Scheduler<P> for HybridScheduler {
    fn execute(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>> {
        solve_hybrid(problem, goal, worst_bound, &self.0)
    }
}

struct WorkStealingScheduler(SolverConfig);

impl<P: Problem> Scheduler<P> for WorkStealingScheduler {
    fn execute(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>> {
        solve_work_stealing(problem, goal, worst_bound, &self.0)
    }
}

/// Entry point: validates the configuration up front, then solves any number of instances
/// with the one [`Scheduler`] picked at construction time.
pub struct Solver<P: Problem> {
    scheduler_type: SchedulerType,
    scheduler: Box<dyn Scheduler<P>>,
}

impl<P: Problem> Solver<P> {
    pub fn new(scheduler_type: SchedulerType, config: SolverConfig) -> Result<Self> {
        config.validate(scheduler_type)?;

        let master_worker = |variant| -> Box<dyn Scheduler<P>> {
            Box::new(MasterWorkerScheduler {
                config: config.clone(),
                variant,
            })
        };
        let scheduler: Box<dyn Scheduler<P>> = match scheduler_type {
            SchedulerType::Serial => Box::new(SerialScheduler {
                traversal: config.traversal,
                epsilon: config.epsilon,
            }),
            SchedulerType::Recursive => Box::new(RecursiveScheduler(config.clone())),
            SchedulerType::Rounds => Box::new(RoundsScheduler(config.clone())),
            SchedulerType::Default => master_worker(MasterWorkerVariant::Default),
            SchedulerType::Priority => master_worker(MasterWorkerVariant::Priority),
            SchedulerType::MasterWorker => master_worker(MasterWorkerVariant::MasterWorker),
            SchedulerType::Hybrid => Box::new(HybridScheduler(config.clone())),
            SchedulerType::WorkStealing => Box::new(WorkStealingScheduler(config.clone())),
        };

        Ok(Solver {
            scheduler_type,
            scheduler,
        })
    }

    pub fn scheduler_type(&self) -> SchedulerType {
        self.scheduler_type
    }

    /// Searches for the best solution and reports it through [`Problem::print_solution`].
    pub fn solve(&self, problem: &P, goal: Goal, worst_bound: P::Score) -> Result<Solution<P>> {
        info!("Solving with the {} scheduler", self.scheduler_type);
        let solution = self.scheduler.execute(problem, goal, worst_bound)?;

        match &solution.subproblem {
            Some(best) => problem.print_solution(best),
            None => info!("No feasible solution, bound stays at {}", solution.bound),
        }
        Ok(solution)
    }
}
