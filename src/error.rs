use thiserror::Error;

use crate::{codec::CodecError, comm::Rank, comm::Tag};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The configuration cannot run the selected scheduler.
    #[error("invalid configuration for {scheduler}: {reason}")]
    Config {
        scheduler: &'static str,
        reason: String,
    },

    /// A message could not be encoded or decoded safely.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A rank received a message its current state does not expect.
    #[error("rank {rank} received unexpected {tag:?} from rank {source_rank} while {state}")]
    Protocol {
        rank: Rank,
        source_rank: Rank,
        tag: Tag,
        state: &'static str,
    },

    /// Another rank hit a fatal error and aborted the run.
    #[error("rank {0} aborted the run")]
    PeerAborted(Rank),

    #[error("rank {0} lost its connection to the cluster")]
    Disconnected(Rank),

    #[error("a worker thread panicked")]
    WorkerPanicked,
}

impl Error {
    pub(crate) fn config(scheduler: &'static str, reason: impl Into<String>) -> Self {
        Error::Config {
            scheduler,
            reason: reason.into(),
        }
    }
}
