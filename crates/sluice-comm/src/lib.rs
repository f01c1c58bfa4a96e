//! Collective communication for sluice worker groups.
//!
//! A run is a fixed-size group of cooperating workers. Rank and size are
//! assigned at startup and never change. Workers communicate only through
//! blocking collectives: every worker must enter every collective, in the
//! same order, or the group deadlocks. A worker with nothing to contribute
//! still participates with an empty contribution.
//!
//! # Backends
//!
//! - [`SoloComm`]: a group of one; every collective is a local copy.
//! - [`ThreadComm`]: one worker per thread, messages over crossbeam
//!   channels. [`ThreadGroup::run`] spawns a whole group.
//!
//! [`GatherLayout`] implements the two-phase variable-length gather
//! (length exchange, then payload gather) on top of any backend.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod group;
pub mod solo;
pub mod varcount;

pub use error::CommError;
pub use group::{ThreadComm, ThreadGroup};
pub use solo::SoloComm;
pub use varcount::GatherLayout;

use sluice_core::Element;

/// Rank that receives every reduction and gather.
pub const COORDINATOR: usize = 0;

/// A member of a fixed-size worker group.
///
/// All methods are collective: every rank must call the same method, in
/// the same order, with compatible arguments.
pub trait Communicator {
    /// This worker's rank in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Whether this worker is the coordinator.
    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }

    /// Element-wise sum of `buf` across all ranks, delivered in place at
    /// the coordinator.
    ///
    /// On every other rank `buf` is scratch after the call and must not
    /// be read. All ranks must pass buffers of equal length.
    fn reduce_sum(&self, buf: &mut [f64]) -> Result<(), CommError>;

    /// Every rank contributes one value; every rank receives all values
    /// in rank order.
    fn all_gather<T: Element>(&self, value: T) -> Result<Vec<T>, CommError>;

    /// Variable-length gather to the coordinator.
    ///
    /// `counts[r]` elements from rank `r` land at offset `displs[r]` of
    /// the coordinator's result. Every rank must pass the same `counts`
    /// and `displs`; `local.len()` must equal `counts[rank]`. Returns
    /// `Some` on the coordinator and `None` elsewhere.
    fn gather_varcount<T: Element>(
        &self,
        local: &[T],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<Option<Vec<T>>, CommError>;

    /// Deliver the coordinator's `data` to every rank.
    ///
    /// The argument is ignored on non-coordinator ranks.
    fn broadcast<T: Element>(&self, data: Vec<T>) -> Result<Vec<T>, CommError>;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), CommError>;
}

impl<C: Communicator> Communicator for &C {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn reduce_sum(&self, buf: &mut [f64]) -> Result<(), CommError> {
        (**self).reduce_sum(buf)
    }

    fn all_gather<T: Element>(&self, value: T) -> Result<Vec<T>, CommError> {
        (**self).all_gather(value)
    }

    fn gather_varcount<T: Element>(
        &self,
        local: &[T],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<Option<Vec<T>>, CommError> {
        (**self).gather_varcount(local, counts, displs)
    }

    fn broadcast<T: Element>(&self, data: Vec<T>) -> Result<Vec<T>, CommError> {
        (**self).broadcast(data)
    }

    fn barrier(&self) -> Result<(), CommError> {
        (**self).barrier()
    }
}

/// Validate the arguments of a variable-length gather before any message
/// is sent, and return the coordinator's output length.
pub(crate) fn check_varcount(
    rank: usize,
    size: usize,
    local_len: usize,
    counts: &[usize],
    displs: &[usize],
) -> Result<usize, CommError> {
    if counts.len() != size || displs.len() != size {
        return Err(CommError::ProtocolViolation {
            detail: format!(
                "gather layout has {} counts and {} displacements for {size} ranks",
                counts.len(),
                displs.len()
            ),
        });
    }
    if local_len != counts[rank] {
        return Err(CommError::LengthMismatch {
            peer: rank,
            expected: counts[rank],
            found: local_len,
        });
    }
    Ok(counts
        .iter()
        .zip(displs)
        .map(|(c, d)| c + d)
        .max()
        .unwrap_or(0))
}
