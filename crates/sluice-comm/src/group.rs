//! In-process worker group: one thread per rank, crossbeam channels
//! between them.
//!
//! Each rank owns an unbounded inbox. Every collective call advances a
//! per-rank sequence number; messages carry `(source, seq)` so a rank can
//! pick the contribution it is waiting for out of an inbox that may
//! already hold messages for a later collective from a faster peer.
//! Early arrivals are parked in a stash until asked for.
//!
//! Sums at the coordinator are folded in ascending rank order, so results
//! are reproducible for a fixed group size (not across group sizes).

use std::cell::{Cell, RefCell};

use crossbeam_channel::{Receiver, Sender};
use sluice_core::{Buffer, Element};

use crate::{check_varcount, CommError, Communicator, COORDINATOR};

struct Envelope {
    source: usize,
    seq: u64,
    payload: Buffer,
}

/// One rank's endpoint in a [`ThreadGroup`].
///
/// `Send` but not `Sync`: a communicator is owned by exactly one worker
/// thread for the lifetime of the run.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// Senders to every other rank's inbox; `None` at our own index so the
    /// inbox disconnects once all peers are gone.
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    seq: Cell<u64>,
    stash: RefCell<Vec<Envelope>>,
}

impl ThreadComm {
    fn next_seq(&self) -> u64 {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        seq
    }

    fn send(&self, dest: usize, seq: u64, payload: Buffer) -> Result<(), CommError> {
        match &self.peers[dest] {
            Some(tx) => tx
                .send(Envelope {
                    source: self.rank,
                    seq,
                    payload,
                })
                .map_err(|_| CommError::Disconnected { peer: dest }),
            None => Err(CommError::ProtocolViolation {
                detail: format!("rank {dest} attempted to message itself"),
            }),
        }
    }

    fn recv<T: Element>(&self, source: usize, seq: u64) -> Result<Vec<T>, CommError> {
        let envelope = self.recv_envelope(source, seq)?;
        envelope
            .payload
            .into_vec::<T>()
            .map_err(|got| CommError::ProtocolViolation {
                detail: format!(
                    "rank {source} sent {} in collective #{seq}, expected {}",
                    got.dtype(),
                    T::DTYPE
                ),
            })
    }

    fn recv_envelope(&self, source: usize, seq: u64) -> Result<Envelope, CommError> {
        {
            let mut stash = self.stash.borrow_mut();
            if let Some(pos) = stash
                .iter()
                .position(|e| e.source == source && e.seq == seq)
            {
                return Ok(stash.swap_remove(pos));
            }
        }
        loop {
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| CommError::Disconnected { peer: source })?;
            if envelope.source == source && envelope.seq == seq {
                return Ok(envelope);
            }
            if envelope.source == source && envelope.seq < seq {
                return Err(CommError::ProtocolViolation {
                    detail: format!(
                        "rank {source} delivered stale collective #{} while rank {} waits on #{seq}",
                        envelope.seq, self.rank
                    ),
                });
            }
            tracing::trace!(
                rank = self.rank,
                from = envelope.source,
                seq = envelope.seq,
                "stashing early message"
            );
            self.stash.borrow_mut().push(envelope);
        }
    }

    fn recv_exact<T: Element>(
        &self,
        source: usize,
        seq: u64,
        expected: usize,
    ) -> Result<Vec<T>, CommError> {
        let data = self.recv::<T>(source, seq)?;
        if data.len() != expected {
            return Err(CommError::LengthMismatch {
                peer: source,
                expected,
                found: data.len(),
            });
        }
        Ok(data)
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn reduce_sum(&self, buf: &mut [f64]) -> Result<(), CommError> {
        let seq = self.next_seq();
        if self.rank != COORDINATOR {
            return self.send(COORDINATOR, seq, Buffer::F64(buf.to_vec()));
        }
        for source in 1..self.size {
            let part = self.recv_exact::<f64>(source, seq, buf.len())?;
            for (acc, v) in buf.iter_mut().zip(part) {
                *acc += v;
            }
        }
        Ok(())
    }

    fn all_gather<T: Element>(&self, value: T) -> Result<Vec<T>, CommError> {
        let seq = self.next_seq();
        for dest in (0..self.size).filter(|&d| d != self.rank) {
            self.send(dest, seq, T::wrap(vec![value]))?;
        }
        let mut out = Vec::with_capacity(self.size);
        for source in 0..self.size {
            if source == self.rank {
                out.push(value);
            } else {
                out.push(self.recv_exact::<T>(source, seq, 1)?[0]);
            }
        }
        Ok(out)
    }

    fn gather_varcount<T: Element>(
        &self,
        local: &[T],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<Option<Vec<T>>, CommError> {
        let total = check_varcount(self.rank, self.size, local.len(), counts, displs)?;
        let seq = self.next_seq();
        if self.rank != COORDINATOR {
            self.send(COORDINATOR, seq, T::wrap(local.to_vec()))?;
            return Ok(None);
        }
        let mut out = vec![T::default(); total];
        for source in 0..self.size {
            let at = displs[source];
            if source == self.rank {
                out[at..at + local.len()].copy_from_slice(local);
            } else {
                let part = self.recv_exact::<T>(source, seq, counts[source])?;
                out[at..at + part.len()].copy_from_slice(&part);
            }
        }
        Ok(Some(out))
    }

    fn broadcast<T: Element>(&self, data: Vec<T>) -> Result<Vec<T>, CommError> {
        let seq = self.next_seq();
        if self.rank == COORDINATOR {
            for dest in 1..self.size {
                self.send(dest, seq, T::wrap(data.clone()))?;
            }
            Ok(data)
        } else {
            self.recv::<T>(COORDINATOR, seq)
        }
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.all_gather(0u64).map(|_| ())
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("seq", &self.seq.get())
            .field("stashed", &self.stash.borrow().len())
            .finish()
    }
}

/// Factory for in-process worker groups.
pub struct ThreadGroup;

impl ThreadGroup {
    /// Create `size` connected endpoints, indexed by rank.
    pub fn communicators(size: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                size,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, tx)| (dest != rank).then(|| tx.clone()))
                    .collect(),
                inbox,
                seq: Cell::new(0),
                stash: RefCell::new(Vec::new()),
            })
            .collect()
    }

    /// Run `worker` once per rank on its own scoped thread and collect the
    /// results in rank order.
    ///
    /// A panicking worker is re-raised on the calling thread after every
    /// other worker has finished (or failed on the broken collective).
    pub fn run<R, F>(size: usize, worker: F) -> Result<Vec<R>, CommError>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let worker = &worker;
        tracing::debug!(size, "spawning worker group");
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for comm in Self::communicators(size) {
                let name = format!("sluice-rank-{}", comm.rank);
                let handle = std::thread::Builder::new()
                    .name(name)
                    .spawn_scoped(scope, move || worker(comm))
                    .map_err(|e| CommError::SpawnFailed {
                        reason: e.to_string(),
                    })?;
                handles.push(handle);
            }
            let mut results = Vec::with_capacity(size);
            for handle in handles {
                match handle.join() {
                    Ok(r) => results.push(r),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(results)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_sums_at_coordinator_only() {
        let out = ThreadGroup::run(4, |comm| {
            let r = comm.rank() as f64;
            let mut buf = vec![r, 10.0 * r, 1.0];
            comm.reduce_sum(&mut buf).unwrap();
            (comm.rank(), buf)
        })
        .unwrap();
        assert_eq!(out[0].1, vec![6.0, 60.0, 4.0]);
    }

    #[test]
    fn all_gather_is_rank_ordered_everywhere() {
        let out = ThreadGroup::run(3, |comm| comm.all_gather(comm.rank() as u64 * 7).unwrap())
            .unwrap();
        for gathered in out {
            assert_eq!(gathered, vec![0, 7, 14]);
        }
    }

    #[test]
    fn gather_varcount_places_by_displacement() {
        let counts = [2usize, 0, 3];
        let displs = [0usize, 2, 2];
        let out = ThreadGroup::run(3, |comm| {
            let local: Vec<i64> = (0..counts[comm.rank()])
                .map(|k| (comm.rank() * 100 + k) as i64)
                .collect();
            comm.gather_varcount(&local, &counts, &displs).unwrap()
        })
        .unwrap();
        assert_eq!(out[0], Some(vec![0, 1, 200, 201, 202]));
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
    }

    #[test]
    fn broadcast_delivers_coordinator_data() {
        let out = ThreadGroup::run(3, |comm| {
            let mine = vec![comm.rank() as f32; 2];
            comm.broadcast(mine).unwrap()
        })
        .unwrap();
        assert!(out.iter().all(|v| v == &vec![0.0f32, 0.0]));
    }

    #[test]
    fn interleaved_collectives_match_by_sequence() {
        // Non-coordinators race ahead into the second collective before
        // the coordinator has drained the first.
        let out = ThreadGroup::run(3, |comm| {
            let mut a = vec![1.0];
            comm.reduce_sum(&mut a).unwrap();
            let mut b = vec![10.0];
            comm.reduce_sum(&mut b).unwrap();
            let all = comm.all_gather(comm.rank() as i32).unwrap();
            (a, b, all)
        })
        .unwrap();
        assert_eq!(out[0].0, vec![3.0]);
        assert_eq!(out[0].1, vec![30.0]);
        assert_eq!(out[2].2, vec![0, 1, 2]);
    }

    #[test]
    fn mismatched_reduce_length_is_reported() {
        let out = ThreadGroup::run(2, |comm| {
            let mut buf = vec![0.0; 2 + comm.rank()];
            comm.reduce_sum(&mut buf)
        })
        .unwrap();
        assert_eq!(
            out[0],
            Err(CommError::LengthMismatch {
                peer: 1,
                expected: 2,
                found: 3
            })
        );
        assert_eq!(out[1], Ok(()));
    }

    #[test]
    fn type_confusion_is_a_protocol_violation() {
        let out = ThreadGroup::run(2, |comm| {
            if comm.rank() == 0 {
                comm.all_gather(1u64).map(|_| ())
            } else {
                comm.all_gather(1i32).map(|_| ())
            }
        })
        .unwrap();
        assert!(matches!(out[0], Err(CommError::ProtocolViolation { .. })));
    }

    #[test]
    fn lone_peer_exit_disconnects_waiter() {
        let mut comms = ThreadGroup::communicators(2);
        let peer = comms.pop().unwrap();
        let coordinator = comms.pop().unwrap();
        drop(peer);
        let mut buf = [0.0];
        assert_eq!(
            coordinator.reduce_sum(&mut buf),
            Err(CommError::Disconnected { peer: 1 })
        );
    }

    #[test]
    fn barrier_completes() {
        let out = ThreadGroup::run(5, |comm| comm.barrier()).unwrap();
        assert!(out.iter().all(Result::is_ok));
    }
}
