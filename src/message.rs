use serde::{Deserialize, Serialize};

use crate::{
    codec::{Wire, decode_from_slice, encode_to_vec},
    comm::{Communicator, Envelope, Rank, Tag},
    error::{Error, Result},
    stats::SearchStats,
};

/// Point-to-point message of the distributed schedulers.
///
/// The tag travels in the envelope and must agree with the variant in the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message<S, B> {
    /// Work package. An empty package tells the receiver there is nothing for it after all.
    Problems { bound: B, subproblems: Vec<S> },
    /// Asks the coordinator for up to `count` idle workers.
    RequestWorkers { bound: B, count: usize },
    /// Coordinator reply: global bound and the workers allocated to the requester.
    Workers { bound: B, ranks: Vec<Rank> },
    Idle,
    Finish,
    WantsWork,
    /// Reply to `WantsWork`, possibly without subproblems.
    WorkExchange { bound: B, subproblems: Vec<S> },
    /// Local best of a rank, sent to rank 0 once the search is over.
    Best {
        subproblem: Option<S>,
        stats: SearchStats,
    },
}

impl<S: Wire, B: Wire> Message<S, B> {
    pub fn tag(&self) -> Tag {
        match self {
            Message::Problems { .. } => Tag::Problems,
            Message::RequestWorkers { .. } => Tag::RequestWorkers,
            Message::Workers { .. } => Tag::Workers,
            Message::Idle => Tag::Idle,
            Message::Finish => Tag::Finish,
            Message::WantsWork => Tag::WantsWork,
            Message::WorkExchange { .. } => Tag::WorkExchange,
            Message::Best { .. } => Tag::Best,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(encode_to_vec(self)?)
    }

    /// Decodes the body of `env`. `rank` is the receiving rank, used for diagnostics.
    pub fn decode(rank: Rank, env: &Envelope) -> Result<Self> {
        if matches!(env.tag, Tag::Round | Tag::Barrier | Tag::Abort) {
            return Err(unexpected(rank, env, "decoding a point-to-point message"));
        }

        let message: Self = decode_from_slice(&env.payload)?;
        if message.tag() != env.tag {
            return Err(unexpected(rank, env, "decoding a body of another tag"));
        }
        Ok(message)
    }

    pub fn send_to<C: Communicator + ?Sized>(&self, comm: &mut C, dest: Rank) -> Result<()> {
        comm.post(dest, self.tag(), 0, self.encode()?)
    }
}

/// Protocol error for an envelope the receiver cannot handle in its current state.
pub fn unexpected(rank: Rank, env: &Envelope, state: &'static str) -> Error {
    Error::Protocol {
        rank,
        source_rank: env.source,
        tag: env.tag,
        state,
    }
}

/// Receives and decodes the next message with one of the given tags.
pub fn recv_message<C, S, B>(comm: &mut C, tags: &[Tag]) -> Result<(Rank, Message<S, B>)>
where
    C: Communicator + ?Sized,
    S: Wire,
    B: Wire,
{
    let env = comm.recv(tags)?;
    Ok((env.source, Message::decode(comm.rank(), &env)?))
}

/// Non-blocking [`recv_message`].
pub fn try_recv_message<C, S, B>(comm: &mut C, tags: &[Tag]) -> Result<Option<(Rank, Message<S, B>)>>
where
    C: Communicator + ?Sized,
    S: Wire,
    B: Wire,
{
    match comm.try_recv(tags)? {
        Some(env) => Ok(Some((env.source, Message::decode(comm.rank(), &env)?))),
        None => Ok(None),
    }
}
