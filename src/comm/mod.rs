pub mod collective;
pub mod local;

pub use collective::{AllGather, barrier};
pub use local::{LocalCluster, LocalComm};

use crate::error::{Error, Result};

/// Index of a process in the cluster. Rank 0 is the coordinator and result collector.
pub type Rank = usize;

/// Message type. Receivers select messages by tag, delivery order across tags is unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Work package with the sender's best bound.
    Problems,
    /// Worker asks the coordinator for idle ranks.
    RequestWorkers,
    /// Coordinator reply to a worker request.
    Workers,
    Idle,
    Finish,
    WantsWork,
    WorkExchange,
    /// One all-to-all round of bound and idle status.
    Round,
    /// Local best sent to rank 0 after the search.
    Best,
    Barrier,
    /// A peer failed fatally.
    Abort,
}

/// A message in flight. `epoch` separates rounds of the same collective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: Rank,
    pub tag: Tag,
    pub epoch: u64,
    pub payload: Vec<u8>,
}

/// Message passing for one rank.
///
/// A rank only ever sees its own state and the byte payloads other ranks post to it, so
/// every distributed protocol crosses an encode/decode boundary even inside one process.
pub trait Communicator {
    fn rank(&self) -> Rank;

    fn size(&self) -> usize;

    /// Buffered send. Never blocks.
    fn post(&mut self, dest: Rank, tag: Tag, epoch: u64, payload: Vec<u8>) -> Result<()>;

    /// Removes the first delivered envelope accepted by `filter`, leaving all others queued.
    /// With `block` set, waits until such an envelope arrives.
    ///
    /// Fails with [`Error::PeerAborted`] as soon as an abort from any peer is delivered.
    fn take(&mut self, filter: &dyn Fn(&Envelope) -> bool, block: bool) -> Result<Option<Envelope>>;

    /// Number of envelopes posted so far.
    fn messages_sent(&self) -> u64;

    fn try_recv(&mut self, tags: &[Tag]) -> Result<Option<Envelope>> {
        self.take(&|env| tags.contains(&env.tag), false)
    }

    fn recv(&mut self, tags: &[Tag]) -> Result<Envelope> {
        let rank = self.rank();
        self.take(&|env| tags.contains(&env.tag), true)?
            .ok_or(Error::Disconnected(rank))
    }

    fn try_recv_epoch(&mut self, tag: Tag, epoch: u64) -> Result<Option<Envelope>> {
        self.take(&|env| env.tag == tag && env.epoch == epoch, false)
    }

    fn recv_epoch(&mut self, tag: Tag, epoch: u64) -> Result<Envelope> {
        let rank = self.rank();
        self.take(&|env| env.tag == tag && env.epoch == epoch, true)?
            .ok_or(Error::Disconnected(rank))
    }

    /// Ranks other than this one.
    fn peers(&self) -> Vec<Rank> {
        let rank = self.rank();
        (0..self.size()).filter(|&peer| peer != rank).collect()
    }
}
