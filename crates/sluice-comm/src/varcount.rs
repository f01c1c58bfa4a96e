//! Two-phase variable-length gather.
//!
//! Phase one exchanges per-rank record counts with an all-gather and
//! derives displacements by prefix sum. Phase two gathers each field with
//! those counts, scaled by the field's width (elements per record).

use sluice_core::Element;

use crate::{CommError, Communicator};

/// Per-rank record counts and displacements for one gather round.
///
/// Identical on every rank after [`GatherLayout::exchange`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatherLayout {
    counts: Vec<usize>,
    displs: Vec<usize>,
    total: usize,
}

impl GatherLayout {
    /// Exchange this rank's record count with every other rank.
    pub fn exchange<C: Communicator>(comm: &C, local_records: usize) -> Result<Self, CommError> {
        let counts = comm
            .all_gather(local_records as u64)?
            .into_iter()
            .map(|c| c as usize)
            .collect();
        Ok(Self::from_counts(counts))
    }

    /// Build a layout from known counts. Displacements are the exclusive
    /// prefix sum.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let mut displs = Vec::with_capacity(counts.len());
        let mut total = 0usize;
        for &c in &counts {
            displs.push(total);
            total += c;
        }
        Self {
            counts,
            displs,
            total,
        }
    }

    /// Records contributed by each rank.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Offset (in records) of each rank's contribution.
    pub fn displs(&self) -> &[usize] {
        &self.displs
    }

    /// Total record count across all ranks.
    pub fn total(&self) -> usize {
        self.total
    }

    /// The same layout measured in elements of a field that stores
    /// `width` elements per record.
    pub fn scaled(&self, width: usize) -> Self {
        Self {
            counts: self.counts.iter().map(|c| c * width).collect(),
            displs: self.displs.iter().map(|d| d * width).collect(),
            total: self.total * width,
        }
    }

    /// Gather one field, `width` elements per record, to the coordinator.
    ///
    /// `local.len()` must be this rank's record count times `width`.
    /// Returns the concatenation in ascending rank order on the
    /// coordinator and `None` elsewhere.
    pub fn gather<T: Element, C: Communicator>(
        &self,
        comm: &C,
        local: &[T],
        width: usize,
    ) -> Result<Option<Vec<T>>, CommError> {
        if width == 1 {
            comm.gather_varcount(local, &self.counts, &self.displs)
        } else {
            let scaled = self.scaled(width);
            comm.gather_varcount(local, &scaled.counts, &scaled.displs)
        }
    }
}
