//! Error types for collective communication.

use std::error::Error;
use std::fmt;

/// Errors raised by a collective.
///
/// Most collective misuse (a rank skipping a call) cannot be detected
/// locally and simply deadlocks; these variants cover what can be.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// A peer's channel closed while this rank was waiting on it.
    Disconnected {
        /// Rank that went away.
        peer: usize,
    },
    /// A peer contributed a buffer of the wrong length.
    LengthMismatch {
        /// Rank whose contribution was wrong.
        peer: usize,
        /// Length required by the collective.
        expected: usize,
        /// Length received.
        found: usize,
    },
    /// Ranks disagree about which collective they are in.
    ProtocolViolation {
        /// What was observed.
        detail: String,
    },
    /// A worker thread could not be spawned.
    SpawnFailed {
        /// Underlying OS error.
        reason: String,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "rank {peer} disconnected"),
            Self::LengthMismatch {
                peer,
                expected,
                found,
            } => write!(
                f,
                "rank {peer} contributed {found} elements, expected {expected}"
            ),
            Self::ProtocolViolation { detail } => {
                write!(f, "collective protocol violation: {detail}")
            }
            Self::SpawnFailed { reason } => write!(f, "worker spawn failed: {reason}"),
        }
    }
}

impl Error for CommError {}
