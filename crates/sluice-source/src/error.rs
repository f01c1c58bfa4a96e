//! Error types for step sources.

use std::fmt;
use std::io;

use sluice_core::Dtype;
use sluice_stream::StreamError;

/// Errors raised by a [`StepSource`](crate::StepSource).
#[derive(Debug)]
pub enum SourceError {
    /// `begin_step`/`end_step` called out of order, or a fetch attempted
    /// with no step open.
    StepProtocol {
        /// Which rule was broken.
        detail: &'static str,
    },
    /// `take` was called before `perform_gets` executed the fetch.
    FetchPending {
        /// Variable of the pending fetch.
        var: String,
        /// Block of the pending fetch.
        block_id: usize,
    },
    /// A variable was requested with the wrong element type.
    TypeMismatch {
        /// Variable name.
        var: String,
        /// Element type the stream carries.
        stored: Dtype,
        /// Element type requested.
        requested: Dtype,
    },
    /// The stream does not declare this variable.
    UnknownVariable {
        /// Variable name.
        var: String,
    },
    /// The block index is out of range for this step.
    UnknownBlock {
        /// Variable name.
        var: String,
        /// Requested block.
        block_id: usize,
        /// Blocks available this step.
        block_count: usize,
    },
    /// A handle from an earlier step, or one already taken, was redeemed.
    StaleHandle,
    /// A step was published after the stream was closed.
    StreamClosed,
    /// The underlying container is corrupt or inconsistent.
    Stream(StreamError),
    /// An I/O error occurred while reading the source.
    Io(io::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepProtocol { detail } => write!(f, "step protocol violation: {detail}"),
            Self::FetchPending { var, block_id } => write!(
                f,
                "fetch of '{var}' block {block_id} taken before perform_gets"
            ),
            Self::TypeMismatch {
                var,
                stored,
                requested,
            } => write!(f, "variable '{var}' holds {stored}, requested {requested}"),
            Self::UnknownVariable { var } => write!(f, "unknown variable '{var}'"),
            Self::UnknownBlock {
                var,
                block_id,
                block_count,
            } => write!(
                f,
                "variable '{var}' has {block_count} blocks, block {block_id} requested"
            ),
            Self::StaleHandle => write!(f, "fetch handle does not belong to the open step"),
            Self::StreamClosed => write!(f, "stream is closed"),
            Self::Stream(e) => write!(f, "stream error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stream(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StreamError> for SourceError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl From<io::Error> for SourceError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
