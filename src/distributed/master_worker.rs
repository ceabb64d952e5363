use std::collections::BTreeSet;

use log::{debug, info, trace};

use crate::{
    bnb::{BnbSolver, Solution, is_prunable},
    comm::{Communicator, Rank, Tag},
    config::SolverConfig,
    distributed::{gather_best, run_cluster},
    error::{Error, Result},
    frontier::{Frontier, PriorityFrontier, TaskDeque, Traversal},
    incumbent::Incumbent,
    message::{Message, recv_message, try_recv_message},
    problem::{Goal, Problem, Score},
    scheduler::SchedulerType,
    stats::SearchStats,
};

/// Flavours of the coordinator-driven scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterWorkerVariant {
    /// One subproblem per allocated worker.
    Default,
    /// Workers keep their subproblems in a best-first priority queue.
    Priority,
    /// Up to `max_package_size` subproblems per allocated worker.
    MasterWorker,
}

impl MasterWorkerVariant {
    pub fn scheduler_type(self) -> SchedulerType {
        match self {
            MasterWorkerVariant::Default => SchedulerType::Default,
            MasterWorkerVariant::Priority => SchedulerType::Priority,
            MasterWorkerVariant::MasterWorker => SchedulerType::MasterWorker,
        }
    }

    pub fn package_size(self, config: &SolverConfig) -> usize {
        match self {
            MasterWorkerVariant::Default => 1,
            MasterWorkerVariant::Priority | MasterWorkerVariant::MasterWorker => {
                config.max_package_size
            }
        }
    }
}

/// Local search state of a worker between two contacts with the coordinator.
pub(crate) trait WorkerEngine<P: Problem> {
    fn bound(&self) -> P::Score;

    /// Folds in a bound received from elsewhere.
    fn tighten(&mut self, bound: P::Score);

    fn receive(&mut self, subproblems: Vec<P::Subproblem>);

    fn queue_len(&self) -> usize;

    /// Runs one slice of local work.
    fn advance(&mut self) -> Result<()>;

    /// Removes a subproblem for another worker from the end processed last.
    fn take_for_transfer(&mut self) -> Option<P::Subproblem>;

    fn stats_mut(&mut self) -> &mut SearchStats;
}

/// Serial engine over any task container.
struct SerialEngine<'a, P: Problem, F> {
    solver: BnbSolver<'a, P>,
    frontier: F,
}

impl<P: Problem, F: Frontier<P::Subproblem>> WorkerEngine<P> for SerialEngine<'_, P, F> {
    fn bound(&self) -> P::Score {
        self.solver.incumbent.bound()
    }

    fn tighten(&mut self, bound: P::Score) {
        self.solver.incumbent.tighten(bound);
    }

    fn receive(&mut self, subproblems: Vec<P::Subproblem>) {
        self.frontier.extend(subproblems);
        self.solver.stats.observe_frontier(self.frontier.len());
    }

    fn queue_len(&self) -> usize {
        self.frontier.len()
    }

    fn advance(&mut self) -> Result<()> {
        if let Some(subproblem) = self.frontier.pop() {
            let children = self.solver.step(&subproblem);
            self.frontier.extend(children);
            self.solver.stats.observe_frontier(self.frontier.len());
        }
        Ok(())
    }

    fn take_for_transfer(&mut self) -> Option<P::Subproblem> {
        self.frontier.split_off(1).pop()
    }

    fn stats_mut(&mut self) -> &mut SearchStats {
        &mut self.solver.stats
    }
}

/// Coordinator loop of rank 0. Hands out the initial work, allocates idle workers to
/// workers asking for help and broadcasts `Finish` once every worker is idle.
pub(crate) fn coordinate<P, C>(
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
    let num_workers = comm.size() - 1;
    let mut solver = BnbSolver::new(problem, goal, worst_bound, config.epsilon);
    let mut idle: BTreeSet<Rank> = (1..=num_workers).collect();

    // Expand the root breadth-first until every worker can get a first package
    let mut frontier = TaskDeque::new(Traversal::Bfs);
    frontier.push(problem.initial_subproblem());
    if config.initial_fanout {
        while frontier.len() < num_workers {
            let Some(subproblem) = frontier.pop() else {
                break;
            };
            let children = solver.step(&subproblem);
            frontier.extend(children);
        }
    }

    let mut packages: Vec<Vec<P::Subproblem>> = vec![Vec::new(); num_workers];
    for (i, subproblem) in frontier.split_off(frontier.len()).into_iter().enumerate() {
        packages[i % num_workers].push(subproblem);
    }
    for (i, subproblems) in packages.into_iter().enumerate() {
        if subproblems.is_empty() {
            continue;
        }
        let worker = i + 1;
        idle.remove(&worker);
        solver.stats.transferred += subproblems.len() as u64;
        Message::Problems {
            bound: solver.incumbent.bound(),
            subproblems,
        }
        .send_to(comm, worker)?;
    }
    debug!("Coordinator started {} worker(s)", num_workers - idle.len());

    while idle.len() < num_workers {
        let (source, message) =
            recv_message::<_, P::Subproblem, P::Score>(comm, &[Tag::RequestWorkers, Tag::Idle])?;

        match message {
            Message::RequestWorkers { bound, count } => {
                if solver.incumbent.tighten(bound) {
                    debug!("Global bound improved to {} by rank {}", bound, source);
                }
                let ranks: Vec<Rank> = (0..count).map_while(|_| idle.pop_first()).collect();
                trace!("Allocating {:?} to rank {} (asked for {})", ranks, source, count);
                Message::<P::Subproblem, _>::Workers {
                    bound: solver.incumbent.bound(),
                    ranks,
                }
                .send_to(comm, source)?;
            }
            Message::Idle => {
                if !idle.insert(source) {
                    return Err(Error::Protocol {
                        rank: comm.rank(),
                        source_rank: source,
                        tag: Tag::Idle,
                        state: "already holding the sender as idle",
                    });
                }
            }
            other => {
                return Err(Error::Protocol {
                    rank: comm.rank(),
                    source_rank: source,
                    tag: other.tag(),
                    state: "coordinating",
                });
            }
        }
    }

    debug!("All workers idle, finishing");
    for worker in 1..=num_workers {
        Message::<P::Subproblem, P::Score>::Finish.send_to(comm, worker)?;
    }
    Ok((solver.incumbent, solver.stats))
}

/// Worker side of the coordinator protocol. Returns once the coordinator sends `Finish`.
///
/// A worker asks for help every `contact_every` slices of local work while it holds more
/// than one subproblem, with at most one request outstanding. It only blocks for the
/// reply once its own queue has run dry.
pub(crate) fn run_worker<P, C, E>(
    comm: &mut C,
    problem: &P,
    goal: Goal,
    engine: &mut E,
    contact_every: usize,
    package_size: usize,
) -> Result<()>
where
    P: Problem,
    C: Communicator + ?Sized,
    E: WorkerEngine<P>,
{
    loop {
        let (source, message) =
            recv_message::<_, P::Subproblem, P::Score>(comm, &[Tag::Problems, Tag::Finish])?;

        match message {
            Message::Finish => return Ok(()),
            Message::Problems { bound, subproblems } => {
                engine.tighten(bound);
                trace!(
                    "Rank {} received {} subproblem(s) from rank {}",
                    comm.rank(),
                    subproblems.len(),
                    source
                );
                if !subproblems.is_empty() {
                    engine.receive(subproblems);
                    work_until_empty(comm, problem, goal, engine, contact_every, package_size)?;
                }
                Message::<P::Subproblem, P::Score>::Idle.send_to(comm, 0)?;
            }
            other => {
                return Err(Error::Protocol {
                    rank: comm.rank(),
                    source_rank: source,
                    tag: other.tag(),
                    state: "waiting for work",
                });
            }
        }
    }
}

fn work_until_empty<P, C, E>(
    comm: &mut C,
    problem: &P,
    goal: Goal,
    engine: &mut E,
    contact_every: usize,
    package_size: usize,
) -> Result<()>
where
    P: Problem,
    C: Communicator + ?Sized,
    E: WorkerEngine<P>,
{
    let mut outstanding = false;
    let mut since_contact = 0usize;

    while engine.queue_len() > 0 {
        engine.advance()?;
        since_contact += 1;

        if outstanding {
            if let Some((_, reply)) = try_recv_message(comm, &[Tag::Workers])? {
                dispatch(comm, problem, goal, engine, reply, package_size)?;
                outstanding = false;
            }
        } else if since_contact >= contact_every && engine.queue_len() > 1 {
            let count = (engine.queue_len() - 1).div_ceil(package_size);
            Message::<P::Subproblem, _>::RequestWorkers {
                bound: engine.bound(),
                count,
            }
            .send_to(comm, 0)?;
            engine.stats_mut().requests += 1;
            outstanding = true;
            since_contact = 0;
        }
    }

    if outstanding {
        let (_, reply) = recv_message(comm, &[Tag::Workers])?;
        dispatch(comm, problem, goal, engine, reply, package_size)?;
    }
    Ok(())
}

/// Sends a package to every allocated worker. Workers there is nothing left for get an
/// empty package so they report back as idle.
fn dispatch<P, C, E>(
    comm: &mut C,
    problem: &P,
    goal: Goal,
    engine: &mut E,
    reply: Message<P::Subproblem, P::Score>,
    package_size: usize,
) -> Result<()>
where
    P: Problem,
    C: Communicator + ?Sized,
    E: WorkerEngine<P>,
{
    let tag = reply.tag();
    let Message::Workers { bound, ranks } = reply else {
        return Err(Error::Protocol {
            rank: comm.rank(),
            source_rank: 0,
            tag,
            state: "waiting for allocated workers",
        });
    };
    engine.tighten(bound);
    let bound = engine.bound();

    for rank in ranks {
        let mut package = Vec::with_capacity(package_size);
        // The requester keeps at least one subproblem
        while package.len() < package_size && engine.queue_len() > 1 {
            let Some(subproblem) = engine.take_for_transfer() else {
                break;
            };
            if is_prunable(problem, goal, &subproblem, bound) {
                engine.stats_mut().pruned += 1;
                continue;
            }
            package.push(subproblem);
        }

        let stats = engine.stats_mut();
        stats.transferred += package.len() as u64;
        trace!("Sending {} subproblem(s) to rank {}", package.len(), rank);
        Message::Problems {
            bound,
            subproblems: package,
        }
        .send_to(comm, rank)?;
    }
    Ok(())
}

fn serial_worker<P, C, F>(
    comm: &mut C,
    problem: &P,
    goal: Goal,
    worst_bound: P::Score,
    config: &SolverConfig,
    frontier: F,
    package_size: usize,
) -> Result<(Incumbent<P>, SearchStats)>
where
    P: Problem,
    C: Communicator + ?Sized,
    F: Frontier<P::Subproblem>,
{
    let mut engine = SerialEngine {
        solver: BnbSolver::new(problem, goal, worst_bound, config.epsilon),
        frontier,
    };
    run_worker(
        comm,
        problem,
        goal,
        &mut engine,
        config.communication_frequency,
        package_size,
    )?;
    Ok((engine.solver.incumbent, engine.solver.stats))
}

/// Coordinator-driven distributed search on `config.num_ranks` ranks.
pub fn solve_master_worker<P: Problem>(
    problem: &P,
    goal: Goal,
    worst_bound: P::Score,
    config: &SolverConfig,
    variant: MasterWorkerVariant,
) -> Result<Solution<P>> {
    config.validate(variant.scheduler_type())?;
    let package_size = variant.package_size(config);
    info!(
        "Running {:?} master-worker search on {} ranks, package size {}",
        variant, config.num_ranks, package_size
    );

    run_cluster(config.num_ranks, |comm| {
        let (incumbent, stats) = if comm.rank() == 0 {
            coordinate(comm, problem, goal, worst_bound, config)?
        } else if variant == MasterWorkerVariant::Priority {
            let frontier = PriorityFrontier::new(|subproblem: &P::Subproblem| {
                goal.orient(problem.bounds(subproblem).lower.to_f64())
            });
            serial_worker(comm, problem, goal, worst_bound, config, frontier, package_size)?
        } else {
            let frontier = TaskDeque::new(config.traversal);
            serial_worker(comm, problem, goal, worst_bound, config, frontier, package_size)?
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
        knapsack::{Knapsack, fixture},
    };

    const VARIANTS: [MasterWorkerVariant; 3] = [
        MasterWorkerVariant::Default,
        MasterWorkerVariant::Priority,
        MasterWorkerVariant::MasterWorker,
    ];

    #[test]
    fn test_fixtures_on_every_variant() {
        for variant in VARIANTS {
            for ranks in [2, 3, 5] {
                for (capacity, expected) in [(10, 30), (100, 36), (1, 0)] {
                    let value = within_timeout(30, move || {
                        let problem = fixture(capacity);
                        let config = SolverConfig::default()
                            .with_ranks(ranks)
                            .with_communication_frequency(1);
                        solve_master_worker(&problem, Goal::Maximize, -1, &config, variant)
                            .unwrap()
                            .value(&problem)
                    });
                    assert_eq!(value, Some(expected), "{:?} on {} ranks", variant, ranks);
                }
            }
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = fastrand::Rng::new();
        println!("Seed: {}", rng.get_seed());

        for variant in VARIANTS {
            for _ in 0..4 {
                let problem = Knapsack::random(rng.usize(4..16), &mut rng);
                let fanout = rng.bool();
                let expected = problem.brute_force();
                let value = within_timeout(30, move || {
                    let config = SolverConfig::default()
                        .with_ranks(4)
                        .with_communication_frequency(2)
                        .with_max_package_size(3)
                        .with_initial_fanout(fanout);
                    solve_master_worker(&problem, Goal::Maximize, -1, &config, variant)
                        .unwrap()
                        .value(&problem)
                });
                assert_eq!(value, Some(expected), "{:?}", variant);
            }
        }
    }

    #[test]
    fn test_minimization() {
        let mut rng = fastrand::Rng::with_seed(5);
        let problem = Assignment::random(5, &mut rng);
        let expected = problem.brute_force();

        let value = within_timeout(30, move || {
            let config = SolverConfig::default()
                .with_ranks(3)
                .with_communication_frequency(1);
            solve_master_worker(
                &problem,
                Goal::Minimize,
                i64::MAX,
                &config,
                MasterWorkerVariant::Priority,
            )
            .unwrap()
            .value(&problem)
        });
        assert_eq!(value, Some(expected));
    }

    #[test]
    fn test_work_is_shared() {
        let mut rng = fastrand::Rng::with_seed(9);
        let problem = Assignment::random(12, &mut rng);
        let expected = BnbSolver::new(&problem, Goal::Minimize, i64::MAX, 0.0)
            .solve(Traversal::Dfs)
            .bound;

        let solution = within_timeout(120, move || {
            let config = SolverConfig::default()
                .with_ranks(4)
                .with_communication_frequency(1)
                .with_initial_fanout(false);
            solve_master_worker(
                &problem,
                Goal::Minimize,
                i64::MAX,
                &config,
                MasterWorkerVariant::MasterWorker,
            )
            .unwrap()
        });
        let stats = solution.stats;

        // Without fan-out only worker 1 starts, everything else arrives through requests
        assert_eq!(solution.bound, expected);
        assert!(stats.requests > 0, "{:?}", stats);
        assert!(stats.transferred > 1, "{:?}", stats);
        assert!(stats.messages > 0);
    }
}
