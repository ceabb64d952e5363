use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error};

use crate::{
    comm::{Communicator, Envelope, Rank, Tag},
    error::{Error, Result},
};

/// Endpoint of one rank in a [`LocalCluster`].
pub struct LocalComm {
    rank: Rank,
    inbox: Receiver<Envelope>,
    mailboxes: Vec<Sender<Envelope>>,
    /// Delivered but not yet taken, in arrival order.
    pending: VecDeque<Envelope>,
    sent: u64,
}

impl LocalComm {
    /// Tells every peer this rank is giving up. Failures are ignored, the peer is gone already.
    fn abort(&mut self) {
        for peer in self.peers() {
            let _ = self.mailboxes[peer].send(Envelope {
                source: self.rank,
                tag: Tag::Abort,
                epoch: 0,
                payload: Vec::new(),
            });
        }
    }

    /// Queues an envelope, failing if it is an abort.
    fn deliver(&mut self, env: Envelope) -> Result<()> {
        if env.tag == Tag::Abort {
            return Err(Error::PeerAborted(env.source));
        }
        self.pending.push_back(env);
        Ok(())
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailboxes.len()
    }

    fn post(&mut self, dest: Rank, tag: Tag, epoch: u64, payload: Vec<u8>) -> Result<()> {
        let sender = self.mailboxes.get(dest).ok_or(Error::Disconnected(dest))?;
        sender
            .send(Envelope {
                source: self.rank,
                tag,
                epoch,
                payload,
            })
            .map_err(|_| Error::Disconnected(dest))?;
        self.sent += 1;
        Ok(())
    }

    fn take(&mut self, filter: &dyn Fn(&Envelope) -> bool, block: bool) -> Result<Option<Envelope>> {
        while let Ok(env) = self.inbox.try_recv() {
            self.deliver(env)?;
        }

        if let Some(pos) = self.pending.iter().position(|env| filter(env)) {
            return Ok(self.pending.remove(pos));
        }
        if !block {
            return Ok(None);
        }

        loop {
            let env = self.inbox.recv().map_err(|_| Error::Disconnected(self.rank))?;
            if env.tag != Tag::Abort && filter(&env) {
                return Ok(Some(env));
            }
            self.deliver(env)?;
        }
    }

    fn messages_sent(&self) -> u64 {
        self.sent
    }
}

/// Runs every rank of a cluster as a thread of the current process.
///
/// Ranks share nothing but their mailboxes. A rank that fails or panics aborts the
/// cluster, so peers waiting on it fail with [`Error::PeerAborted`] instead of hanging.
pub struct LocalCluster;

impl LocalCluster {
    /// Runs `rank_main` on `size` ranks and returns each rank's result, indexed by rank.
    pub fn run<T, F>(size: usize, rank_main: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(&mut LocalComm) -> Result<T> + Sync,
    {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        debug!("Starting local cluster with {} rank(s)", size);
        thread::scope(|scope| {
            let handles: Vec<_> = receivers
                .into_iter()
                .enumerate()
                .map(|(rank, inbox)| {
                    let mut comm = LocalComm {
                        rank,
                        inbox,
                        mailboxes: senders.clone(),
                        pending: VecDeque::new(),
                        sent: 0,
                    };
                    let rank_main = &rank_main;
                    scope.spawn(move || {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| rank_main(&mut comm)))
                            .unwrap_or(Err(Error::WorkerPanicked));

                        match &result {
                            Ok(_) | Err(Error::PeerAborted(_)) => {}
                            Err(e) => {
                                error!("Rank {} failed: {}", rank, e);
                                comm.abort();
                            }
                        }
                        result
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(Err(Error::WorkerPanicked)))
                .collect()
        })
    }
}
