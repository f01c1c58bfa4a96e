//! Top-level error type for the pipelines and the step driver.

use std::error::Error;
use std::fmt;

use sluice_comm::CommError;
use sluice_core::{InputError, StepId};
use sluice_source::SourceError;
use sluice_stream::StreamError;

use crate::config::ConfigError;
use crate::sink::SinkError;

/// Boxed error returned by an external collaborator.
pub type CollaboratorError = Box<dyn Error + Send + Sync + 'static>;

/// Errors that abort a pipeline run.
///
/// Every variant is fatal: a step that fails is never persisted, and the
/// run stops. The only recoverable condition, a step that is not ready
/// yet, is a [`StepStatus`](sluice_source::StepStatus), not an error.
#[derive(Debug)]
pub enum EngineError {
    /// Invalid configuration or pipeline assembly.
    Config(ConfigError),
    /// Upstream data violated an input-consistency rule.
    Input(InputError),
    /// A collective failed.
    Comm(CommError),
    /// The step source failed.
    Source(SourceError),
    /// Writing the duplicate stream failed.
    Stream(StreamError),
    /// Persisting output failed.
    Sink(SinkError),
    /// The escape-set synchronisation or physics collaborator failed.
    Collaborator {
        /// Which collaborator.
        stage: &'static str,
        /// What it reported.
        error: CollaboratorError,
    },
    /// The source stayed not-ready for longer than the retry limit.
    NotReadyLimit {
        /// The step that never became ready.
        step: StepId,
        /// Consecutive not-ready results observed.
        attempts: u64,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Input(e) => write!(f, "input: {e}"),
            Self::Comm(e) => write!(f, "collective: {e}"),
            Self::Source(e) => write!(f, "source: {e}"),
            Self::Stream(e) => write!(f, "duplicate stream: {e}"),
            Self::Sink(e) => write!(f, "sink: {e}"),
            Self::Collaborator { stage, error } => write!(f, "{stage}: {error}"),
            Self::NotReadyLimit { step, attempts } => write!(
                f,
                "step {step} not ready after {attempts} consecutive attempts"
            ),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Input(e) => Some(e),
            Self::Comm(e) => Some(e),
            Self::Source(e) => Some(e),
            Self::Stream(e) => Some(e),
            Self::Sink(e) => Some(e),
            Self::Collaborator { error, .. } => Some(error.as_ref()),
            Self::NotReadyLimit { .. } => None,
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<InputError> for EngineError {
    fn from(e: InputError) -> Self {
        Self::Input(e)
    }
}

impl From<CommError> for EngineError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<SourceError> for EngineError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

impl From<StreamError> for EngineError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

impl From<SinkError> for EngineError {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}
