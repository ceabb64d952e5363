pub mod hybrid;
pub mod master_worker;
pub mod work_stealing;

use log::debug;

pub use hybrid::solve_hybrid;
pub use master_worker::{MasterWorkerVariant, solve_master_worker};
pub use work_stealing::solve_work_stealing;

use crate::{
    bnb::Solution,
    comm::{Communicator, LocalCluster, LocalComm, Tag},
    error::{Error, Result},
    incumbent::Incumbent,
    message::{Message, recv_message},
    problem::Problem,
    stats::SearchStats,
};

/// Sends the local best of this rank to rank 0 and, on rank 0, combines all of them and
/// merges the statistics of all ranks. Every distributed scheduler ends here.
///
/// Rank 0 compares candidates by their contained value in the direction of the goal.
/// Returns the global solution on rank 0 and `None` on every other rank.
pub fn gather_best<P, C>(
    comm: &mut C,
    problem: &P,
    incumbent: Incumbent<P>,
    mut stats: SearchStats,
) -> Result<Option<Solution<P>>>
where
    P: Problem,
    C: Communicator + ?Sized,
{
    if comm.rank() != 0 {
        stats.messages = comm.messages_sent() + 1;
        let best: Message<P::Subproblem, P::Score> = Message::Best {
            subproblem: incumbent.into_best(),
            stats,
        };
        best.send_to(comm, 0)?;
        return Ok(None);
    }

    let goal = incumbent.goal();
    let mut bound = incumbent.bound();
    stats.messages = comm.messages_sent();
    let mut total = stats;
    let mut best = incumbent.into_best().map(|subproblem| {
        let value = problem.contained_upper_bound(&subproblem);
        (subproblem, value)
    });

    for _ in 1..comm.size() {
        let (source, message) = recv_message::<_, P::Subproblem, P::Score>(comm, &[Tag::Best])?;
        let tag = message.tag();
        let Message::Best { subproblem, stats } = message else {
            return Err(Error::Protocol {
                rank: 0,
                source_rank: source,
                tag,
                state: "collecting results",
            });
        };
        total.merge(&stats);

        if let Some(subproblem) = subproblem {
            let value = problem.contained_upper_bound(&subproblem);
            debug!("Rank {} reported a solution with value {}", source, value);
            if best
                .as_ref()
                .is_none_or(|&(_, best_value)| goal.is_better(value, best_value))
            {
                best = Some((subproblem, value));
            }
        }
    }

    if let Some((_, value)) = &best {
        bound = goal.best_of(bound, *value);
    }
    Ok(Some(Solution {
        subproblem: best.map(|(subproblem, _)| subproblem),
        bound,
        stats: total,
    }))
}

/// Runs `rank_main` on a local cluster of `num_ranks` ranks and returns the solution rank 0
/// produced.
///
/// If any rank failed, the root cause is returned rather than the aborts it triggered on peers.
pub fn run_cluster<P, F>(num_ranks: usize, rank_main: F) -> Result<Solution<P>>
where
    P: Problem,
    F: Fn(&mut LocalComm) -> Result<Option<Solution<P>>> + Sync,
{
    let mut root = None;
    let mut failure = None;
    let mut fallout = None;

    for (rank, result) in LocalCluster::run(num_ranks, rank_main).into_iter().enumerate() {
        match result {
            Ok(solution) if rank == 0 => root = solution,
            Ok(_) => {}
            // Consequences of another rank failing
            Err(e @ (Error::PeerAborted(_) | Error::Disconnected(_))) => {
                fallout.get_or_insert(e);
            }
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }

    if let Some(e) = failure.or(fallout) {
        return Err(e);
    }
    root.ok_or(Error::Disconnected(0))
}
