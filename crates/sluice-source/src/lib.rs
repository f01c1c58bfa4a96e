//! Step-synchronised upstream data sources.
//!
//! A [`StepSource`] hands out one step at a time. Within an open step a
//! consumer lists the blocks of a variable, schedules deferred per-block
//! fetches, executes them in one batch, and redeems the handles:
//!
//! ```text
//! begin_step ─▶ blocks_info ─▶ get* ─▶ perform_gets ─▶ take* ─▶ end_step
//! ```
//!
//! # Implementations
//!
//! - [`MemoryStream`] / [`MemoryReader`]: a live in-process stream; a
//!   producer publishes steps while readers consume them
//! - [`FileSource`]: a `sluice-stream` container on disk that may still
//!   be growing

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod file;
pub mod memory;
mod step;

pub use error::SourceError;
pub use file::FileSource;
pub use memory::{MemoryReader, MemoryStream};

use std::marker::PhantomData;

use sluice_core::{element_count, Element, Shape, StepId};

/// Outcome of [`StepSource::begin_step`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// A step is open and may be read.
    Ready,
    /// No step is available yet; nothing was consumed. Retry later.
    NotReady,
    /// The stream has ended; no further steps will arrive.
    Ended,
}

/// Location and shape of one block of a variable in the open step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Index of the block within the variable, in publication order.
    pub block_id: usize,
    /// Block shape.
    pub shape: Shape,
}

impl BlockInfo {
    /// Number of elements (for row tables, rows times columns).
    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }
}

/// Claim on a deferred fetch, redeemed with [`StepSource::take`] after
/// [`StepSource::perform_gets`].
///
/// Valid only within the step that issued it.
#[derive(Debug)]
#[must_use = "a scheduled fetch is only useful once taken"]
pub struct GetHandle<T> {
    generation: u64,
    slot: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GetHandle<T> {
    pub(crate) fn new(generation: u64, slot: usize) -> Self {
        Self {
            generation,
            slot,
            _marker: PhantomData,
        }
    }
}

/// A step-synchronised stream of block-structured variables.
///
/// Each worker in a group owns its own source over the same logical
/// stream; every worker must observe the same sequence of statuses.
pub trait StepSource {
    /// Try to open the next step.
    ///
    /// Calling this while a step is open is a
    /// [`SourceError::StepProtocol`] error.
    fn begin_step(&mut self) -> Result<StepStatus, SourceError>;

    /// Release the open step and advance the cursor.
    ///
    /// Must be called exactly once after each [`StepStatus::Ready`].
    fn end_step(&mut self) -> Result<(), SourceError>;

    /// Producer-assigned index of the open step, if any.
    fn current_step(&self) -> Option<StepId>;

    /// Blocks of `var` in the open step, in publication order.
    ///
    /// A declared variable absent from this step has no blocks.
    fn blocks_info(&self, var: &str) -> Result<Vec<BlockInfo>, SourceError>;

    /// Schedule a fetch of one block of `var`.
    fn get<T: Element>(&mut self, var: &str, block_id: usize)
        -> Result<GetHandle<T>, SourceError>;

    /// Execute every fetch scheduled since the last call.
    fn perform_gets(&mut self) -> Result<(), SourceError>;

    /// Redeem a fetched block.
    ///
    /// Fails with [`SourceError::FetchPending`] if
    /// [`perform_gets`](Self::perform_gets) has not run since the fetch
    /// was scheduled.
    fn take<T: Element>(&mut self, handle: GetHandle<T>) -> Result<Vec<T>, SourceError>;
}
