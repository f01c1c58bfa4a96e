//! Step-stream container for sluice diagnostics.
//!
//! A stream is a header declaring named, typed variables followed by one
//! checksummed frame per step and a terminating end marker. Each step
//! frame carries, per variable, an ordered list of blocks; every block
//! has its own shape. Readers that tail a stream which is still being
//! written can distinguish "frame not fully written yet" from corruption.
//!
//! # Architecture
//!
//! - [`StreamWriter`] frames steps onto any `Write` sink
//! - [`StreamReader`] reads frames back from any `Read` source
//! - [`codec::try_decode_frame`] decodes from a byte slice that may end
//!   mid-frame, for tailing readers
//! - All I/O uses a custom binary codec (no serde dependency)
//!
//! # Format
//!
//! ```text
//! [MAGIC "SLCE"] [VERSION u8] [name str] [decl_count u32] [VarDecl]*
//! [tag u8] [payload_len u64] [checksum u64] [payload]    (repeated)
//! ```
//!
//! Tag 1 is a step frame, tag 2 the end marker (empty payload). The
//! checksum is FNV-1a over the payload bytes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod hash;
pub mod reader;
pub mod types;
pub mod writer;

pub use error::StreamError;
pub use hash::checksum;
pub use reader::{FrameIter, StreamReader};
pub use types::{Block, Frame, StepFrame, StreamHeader, VarBlocks, VarDecl};
pub use writer::StreamWriter;

/// Magic bytes at the start of every stream.
pub const MAGIC: [u8; 4] = *b"SLCE";

/// Current binary format version.
pub const FORMAT_VERSION: u8 = 1;

/// Frame tag for a step frame.
pub const TAG_STEP: u8 = 1;

/// Frame tag for the end-of-stream marker.
pub const TAG_END: u8 = 2;

/// Bytes preceding every frame payload: tag, payload length, checksum.
pub const FRAME_PREAMBLE_LEN: usize = 1 + 8 + 8;
