//! Contiguous block partitioning across a fixed worker group.
//!
//! Partitioning depends only on the block count, the worker count and the
//! rank. Block sizes are never inspected, so a step whose blocks vary in
//! size may be load-imbalanced; the guarantee is only that block *counts*
//! differ by at most one between workers.

use std::ops::Range;

/// A contiguous run of block indices assigned to one worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    /// Index of the first block.
    pub offset: usize,
    /// Number of blocks.
    pub count: usize,
}

impl Partition {
    /// Block indices covered by this partition.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.count
    }

    /// Whether no blocks are assigned.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Split `block_count` blocks among `worker_count` workers and return the
/// share of `rank`.
///
/// Remainder blocks go one each to the lowest ranks. Ranks beyond the
/// block count receive empty partitions positioned at the end of the
/// block list, as does any rank outside `0..worker_count`.
pub fn split(block_count: usize, worker_count: usize, rank: usize) -> Partition {
    if worker_count == 0 || rank >= worker_count {
        return Partition {
            offset: block_count,
            count: 0,
        };
    }
    let base = block_count / worker_count;
    let remainder = block_count % worker_count;
    let count = base + usize::from(rank < remainder);
    let offset = rank * base + rank.min(remainder);
    Partition { offset, count }
}

/// Convenience wrapper returning the sub-slice of `items` owned by `rank`.
pub fn split_slice<T>(items: &[T], worker_count: usize, rank: usize) -> &[T] {
    &items[split(items.len(), worker_count, rank).range()]
}
