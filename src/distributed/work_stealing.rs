use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::{
    bnb::{BnbSolver, Solution, is_prunable},
    comm::{AllGather, Communicator, Rank, Tag, barrier},
    config::SolverConfig,
    distributed::{gather_best, run_cluster},
    error::{Error, Result},
    frontier::{Frontier, TaskDeque},
    incumbent::Incumbent,
    message::{Message, try_recv_message},
    problem::{Goal, Problem},
    scheduler::SchedulerType,
    stats::SearchStats,
    utils::Backoff,
};

/// What a rank contributes to one collective round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct RoundReport<B> {
    bound: B,
    idle: bool,
    sent: u64,
    received: u64,
}

/// Round `round` checks idle status once every `termination_check_frequency` bound rounds.
fn is_status_round(round: u64, termination_check_frequency: usize) -> bool {
    (round + 1) % (termination_check_frequency as u64 + 1) == 0
}

/// Tracks consecutive status rounds that found the cluster quiescent.
#[derive(Debug, Default)]
struct TerminationDetector {
    /// Transfer total of the previous status round, if it was quiescent.
    quiescent_total: Option<u64>,
}

impl TerminationDetector {
    /// Feeds the reports of a status round. Returns true once the search is over.
    fn observe<B>(&mut self, reports: &[RoundReport<B>]) -> bool {
        let all_idle = reports.iter().all(|report| report.idle);
        let sent: u64 = reports.iter().map(|report| report.sent).sum();
        let received: u64 = reports.iter().map(|report| report.received).sum();

        if !all_idle || sent != received {
            self.quiescent_total = None;
            return false;
        }
        let terminated = self.quiescent_total == Some(sent);
        self.quiescent_total = Some(sent);
        terminated
    }
}

struct StealingRank<'a, P: Problem, C: Communicator + ?Sized> {
    comm: &'a mut C,
    problem: &'a P,
    config: &'a SolverConfig,
    solver: BnbSolver<'a, P>,
    frontier: TaskDeque<P::Subproblem>,
    rng: fastrand::Rng,
    /// Victim of the pending steal request.
    outstanding: Option<Rank>,
    sent: u64,
    received: u64,
    round: u64,
    active_round: Option<AllGather<RoundReport<P::Score>>>,
    since_round: usize,
    detector: TerminationDetector,
}

impl<'a, P: Problem, C: Communicator + ?Sized> StealingRank<'a, P, C> {
    fn new(
        comm: &'a mut C,
        problem: &'a P,
        goal: Goal,
        worst_bound: P::Score,
        config: &'a SolverConfig,
    ) -> Self {
        let rank = comm.rank();
        let mut frontier = TaskDeque::new(config.traversal);
        if rank == 0 {
            frontier.push(problem.initial_subproblem());
        }

        StealingRank {
            comm,
            problem,
            config,
            solver: BnbSolver::new(problem, goal, worst_bound, config.epsilon),
            frontier,
            rng: fastrand::Rng::with_seed(config.seed ^ rank as u64),
            outstanding: None,
            sent: 0,
            received: 0,
            round: 0,
            active_round: None,
            since_round: 0,
            detector: TerminationDetector::default(),
        }
    }

    fn run(mut self) -> Result<(Incumbent<P>, SearchStats)> {
        let mut backoff = Backoff::for_idle_polling();

        loop {
            self.serve_requests()?;
            let mut progressed = self.collect_stolen_work()?;

            if let Some(subproblem) = self.frontier.pop() {
                let children = self.solver.step(&subproblem);
                self.frontier.extend(children);
                self.solver.stats.observe_frontier(self.frontier.len());
                self.since_round += 1;
                progressed = true;
            } else if self.outstanding.is_none() {
                self.request_work()?;
            }

            if self.advance_rounds()? {
                break;
            }

            if progressed {
                backoff.reset();
            } else {
                backoff.wait();
            }
        }

        debug!(
            "Rank {} detected termination after {} round(s)",
            self.comm.rank(),
            self.round
        );
        self.drain()?;
        Ok((self.solver.incumbent, self.solver.stats))
    }

    /// Answers every queued steal request.
    fn serve_requests(&mut self) -> Result<()> {
        while let Some(env) = self.comm.try_recv(&[Tag::WantsWork])? {
            let package = self.package_for_thief();
            self.sent += package.len() as u64;
            self.solver.stats.transferred += package.len() as u64;
            trace!(
                "Rank {} hands {} subproblem(s) to rank {}",
                self.comm.rank(),
                package.len(),
                env.source
            );

            Message::WorkExchange {
                bound: self.solver.incumbent.bound(),
                subproblems: package,
            }
            .send_to(self.comm, env.source)?;
        }
        Ok(())
    }

    /// Takes a share of the local queue from the end processed last, dropping prunable items.
    fn package_for_thief(&mut self) -> Vec<P::Subproblem> {
        let len = self.frontier.len();
        let share = ((len as f64 * self.config.steal_fraction).floor() as usize)
            .max(usize::from(len > 1))
            .min(self.config.max_package_size);

        let goal = self.solver.incumbent.goal();
        let bound = self.solver.incumbent.bound();
        let mut package = self.frontier.split_off(share);
        let before = package.len();
        package.retain(|subproblem| !is_prunable(self.problem, goal, subproblem, bound));
        self.solver.stats.pruned += (before - package.len()) as u64;
        package
    }

    /// Checks for the reply to a pending steal request. Returns true if it brought work.
    fn collect_stolen_work(&mut self) -> Result<bool> {
        let Some(victim) = self.outstanding else {
            return Ok(false);
        };
        let Some((source, message)) =
            try_recv_message::<_, P::Subproblem, P::Score>(self.comm, &[Tag::WorkExchange])?
        else {
            return Ok(false);
        };

        let tag = message.tag();
        let Message::WorkExchange { bound, subproblems } = message else {
            return Err(Error::Protocol {
                rank: self.comm.rank(),
                source_rank: source,
                tag,
                state: "waiting for stolen work",
            });
        };
        if source != victim {
            return Err(Error::Protocol {
                rank: self.comm.rank(),
                source_rank: source,
                tag,
                state: "waiting for stolen work from another rank",
            });
        }

        self.outstanding = None;
        self.solver.incumbent.tighten(bound);
        self.received += subproblems.len() as u64;
        if subproblems.is_empty() {
            return Ok(false);
        }

        self.frontier.extend(subproblems);
        self.solver.stats.observe_frontier(self.frontier.len());
        Ok(true)
    }

    fn request_work(&mut self) -> Result<()> {
        let rank = self.comm.rank();
        let mut victim = self.rng.usize(..self.comm.size() - 1);
        if victim >= rank {
            victim += 1;
        }

        Message::<P::Subproblem, P::Score>::WantsWork.send_to(self.comm, victim)?;
        self.solver.stats.requests += 1;
        self.outstanding = Some(victim);
        Ok(())
    }

    /// Starts the next collective round when due and resolves the active one.
    /// Returns true once termination has been detected.
    fn advance_rounds(&mut self) -> Result<bool> {
        if self.active_round.is_none() {
            let idle = self.frontier.is_empty();
            if idle || self.since_round >= self.config.communication_frequency {
                let report = RoundReport {
                    bound: self.solver.incumbent.bound(),
                    idle,
                    sent: self.sent,
                    received: self.received,
                };
                self.active_round = Some(AllGather::start(self.comm, Tag::Round, self.round, report)?);
                self.since_round = 0;
            }
        }

        let Some(round) = self.active_round.as_mut() else {
            return Ok(false);
        };
        if !round.poll(self.comm)? {
            return Ok(false);
        }

        let Some(round) = self.active_round.take() else {
            return Ok(false);
        };
        let reports = round.into_values(self.comm.rank())?;
        for report in &reports {
            if self.solver.incumbent.tighten(report.bound) {
                trace!("Rank {} adopted bound {}", self.comm.rank(), report.bound);
            }
        }

        let status = is_status_round(self.round, self.config.termination_check_frequency);
        self.round += 1;
        Ok(status && self.detector.observe(&reports))
    }

    /// Waits for every rank to stop, then discards steal traffic still addressed to this rank.
    fn drain(&mut self) -> Result<()> {
        barrier(self.comm, 0)?;

        let mut discarded = 0usize;
        while self
            .comm
            .try_recv(&[Tag::WantsWork, Tag::WorkExchange])?
            .is_some()
        {
            discarded += 1;
        }
        trace!(
            "Rank {} discarded {} stale steal message(s)",
            self.comm.rank(),
            discarded
        );
        Ok(())
    }
}

/// Work-stealing search on `config.num_ranks` ranks without a coordinator.
///
/// Idle ranks steal from random victims. Bounds and idle status are exchanged in numbered
/// all-to-all rounds, and every status round carries the number of subproblems each rank
/// has sent and received. The search is over once two consecutive status rounds find every
/// rank idle with balanced, unchanged totals.
pub fn solve_work_stealing<P: Problem>(
    problem: &P,
    goal: Goal,
    worst_bound: P::Score,
    config: &SolverConfig,
) -> Result<Solution<P>> {
    config.validate(SchedulerType::WorkStealing)?;
    info!(
        "Running work-stealing search on {} ranks, status round every {} bound round(s)",
        config.num_ranks, config.termination_check_frequency
    );

    run_cluster(config.num_ranks, |comm| {
        let (incumbent, stats) = StealingRank::new(comm, problem, goal, worst_bound, config).run()?;
        gather_best(comm, problem, incumbent, stats)
    })
}
