use crate::{
    codec::{Wire, decode_from_slice, encode_to_vec},
    comm::{Communicator, Envelope, Rank, Tag},
    error::{Error, Result},
};

/// Non-blocking all-to-all exchange of one value per rank.
///
/// Every rank starts the same `(tag, epoch)` with its own value and then polls until the
/// values of all peers have arrived. Envelopes of later epochs stay queued for their round.
pub struct AllGather<T> {
    tag: Tag,
    epoch: u64,
    values: Vec<Option<T>>,
    missing: usize,
}

impl<T: Wire> AllGather<T> {
    pub fn start<C: Communicator + ?Sized>(comm: &mut C, tag: Tag, epoch: u64, value: T) -> Result<Self> {
        let payload = encode_to_vec(&value)?;
        for peer in comm.peers() {
            comm.post(peer, tag, epoch, payload.clone())?;
        }

        let mut values: Vec<Option<T>> = (0..comm.size()).map(|_| None).collect();
        values[comm.rank()] = Some(value);

        Ok(Self {
            tag,
            epoch,
            values,
            missing: comm.size() - 1,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Folds in every value that has arrived. Returns true once all ranks have contributed.
    pub fn poll<C: Communicator + ?Sized>(&mut self, comm: &mut C) -> Result<bool> {
        while self.missing > 0 {
            match comm.try_recv_epoch(self.tag, self.epoch)? {
                Some(env) => self.accept(comm.rank(), env)?,
                None => break,
            }
        }
        Ok(self.missing == 0)
    }

    /// Blocks until all ranks have contributed and returns the values indexed by rank.
    pub fn wait<C: Communicator + ?Sized>(mut self, comm: &mut C) -> Result<Vec<T>> {
        while self.missing > 0 {
            let env = comm.recv_epoch(self.tag, self.epoch)?;
            self.accept(comm.rank(), env)?;
        }
        self.into_values(comm.rank())
    }

    /// Values indexed by rank. Only valid once [`AllGather::poll`] returned true.
    pub fn into_values(self, rank: Rank) -> Result<Vec<T>> {
        let tag = self.tag;
        self.values
            .into_iter()
            .enumerate()
            .map(|(source, value)| {
                value.ok_or(Error::Protocol {
                    rank,
                    source_rank: source,
                    tag,
                    state: "collecting an incomplete round",
                })
            })
            .collect()
    }

    fn accept(&mut self, rank: Rank, env: Envelope) -> Result<()> {
        let slot = self.values.get_mut(env.source).ok_or(Error::Disconnected(env.source))?;
        if slot.is_some() {
            return Err(Error::Protocol {
                rank,
                source_rank: env.source,
                tag: env.tag,
                state: "already holding its value for this round",
            });
        }
        *slot = Some(decode_from_slice(&env.payload)?);
        self.missing -= 1;
        Ok(())
    }
}

/// Blocks until every rank has entered the barrier of the given epoch.
pub fn barrier<C: Communicator + ?Sized>(comm: &mut C, epoch: u64) -> Result<()> {
    AllGather::start(comm, Tag::Barrier, epoch, true)?.wait(comm)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::LocalCluster;

    #[test]
    fn test_all_gather_collects_every_rank() {
        let results = LocalCluster::run(4, |comm| {
            let rank = comm.rank() as i64;
            AllGather::start(comm, Tag::Round, 0, rank * 10)?.wait(comm)
        });

        for result in results {
            assert_eq!(result.unwrap(), vec![0, 10, 20, 30]);
        }
    }

    #[test]
    fn test_epochs_do_not_mix() {
        let results = LocalCluster::run(3, |comm| {
            let rank = comm.rank() as u64;
            // Start two rounds before collecting either
            let mut first = AllGather::start(comm, Tag::Round, 1, rank)?;
            let second = AllGather::start(comm, Tag::Round, 2, rank + 100)?;

            while !first.poll(comm)? {
                std::thread::yield_now();
            }
            let first = first.into_values(comm.rank())?;
            let second = second.wait(comm)?;
            barrier(comm, 3)?;
            Ok((first, second))
        });

        for result in results {
            let (first, second) = result.unwrap();
            assert_eq!(first, vec![0, 1, 2]);
            assert_eq!(second, vec![100, 101, 102]);
        }
    }

    #[test]
    fn test_undecodable_contribution_fails() {
        let results = LocalCluster::run(2, |comm| {
            if comm.rank() == 1 {
                comm.recv_epoch(Tag::Round, 0)?;
                comm.post(0, Tag::Round, 0, b"s3:abc ".to_vec())?;
                return Ok(Vec::new());
            }
            AllGather::<i64>::start(comm, Tag::Round, 0, 5)?.wait(comm)
        });

        assert!(matches!(results[0], Err(Error::Codec(_))));
    }
}
