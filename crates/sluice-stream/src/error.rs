//! Error types for the step-stream container.

use std::fmt;
use std::io;

use sluice_core::Dtype;

/// Errors that can occur while writing or reading a step stream.
#[derive(Debug)]
pub enum StreamError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// The stream does not start with the expected `b"SLCE"` magic bytes.
    InvalidMagic,
    /// The format version is not supported by this build.
    UnsupportedVersion {
        /// The version found in the stream.
        found: u8,
    },
    /// A header or frame could not be decoded.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A frame payload does not hash to its recorded checksum.
    ChecksumMismatch {
        /// Checksum stored in the frame.
        recorded: u64,
        /// Checksum of the bytes actually read.
        computed: u64,
    },
    /// A dtype tag is not recognized.
    UnknownDtype {
        /// The unrecognized tag.
        tag: u8,
    },
    /// A frame tag is not recognized.
    UnknownFrameTag {
        /// The unrecognized tag.
        tag: u8,
    },
    /// A step frame names a variable the header does not declare, or
    /// carries it with a different element type.
    Undeclared {
        /// Variable name.
        name: String,
        /// Element type found in the frame.
        dtype: Dtype,
    },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes (expected b\"SLCE\")"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {found}")
            }
            Self::Malformed { detail } => write!(f, "malformed stream: {detail}"),
            Self::ChecksumMismatch { recorded, computed } => write!(
                f,
                "frame checksum mismatch: recorded={recorded:#018x}, computed={computed:#018x}"
            ),
            Self::UnknownDtype { tag } => write!(f, "unknown dtype tag {tag}"),
            Self::UnknownFrameTag { tag } => write!(f, "unknown frame tag {tag}"),
            Self::Undeclared { name, dtype } => {
                write!(f, "variable '{name}' ({dtype}) is not declared in the header")
            }
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
