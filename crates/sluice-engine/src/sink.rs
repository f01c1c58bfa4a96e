//! Coordinator-side persistence of the reduced diffusion bins.

use std::error::Error;
use std::fmt;
use std::io::Write;

use sluice_core::{Dtype, EntityBins, StepId, BIN_FIELD_NAMES};
use sluice_stream::{StepFrame, StreamError, StreamHeader, StreamWriter, VarDecl};

/// Name of the persisted diffusion stream.
pub const DIFFUSION_STREAM: &str = "diffusion";

/// Errors raised while persisting a step.
#[derive(Debug)]
pub enum SinkError {
    /// A bin sequence does not have the declared entity count.
    ShapeMismatch {
        /// Bin field name.
        field: &'static str,
        /// Declared length.
        expected: usize,
        /// Length supplied.
        found: usize,
    },
    /// The underlying stream failed.
    Stream(StreamError),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch {
                field,
                expected,
                found,
            } => write!(
                f,
                "field '{field}' has {found} entries, output declares {expected}"
            ),
            Self::Stream(e) => write!(f, "stream: {e}"),
        }
    }
}

impl Error for SinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Stream(e) => Some(e),
            Self::ShapeMismatch { .. } => None,
        }
    }
}

impl From<StreamError> for SinkError {
    fn from(e: StreamError) -> Self {
        Self::Stream(e)
    }
}

/// Persists one snapshot of the ten bin sequences per step.
///
/// Lifecycle is explicit: [`open`](Self::open) declares the output
/// layout once, [`write_step`](Self::write_step) appends a step, and
/// [`close`](Self::close) writes the end marker. Each step is a single
/// frame, so a failed step never leaves a partial snapshot behind.
pub struct DiffusionSink<W: Write> {
    writer: StreamWriter<W>,
    entity_count: usize,
}

impl<W: Write> DiffusionSink<W> {
    /// Declare ten `f64` variables of length `entity_count` and write the
    /// stream header.
    pub fn open(writer: W, entity_count: usize) -> Result<Self, SinkError> {
        let header = BIN_FIELD_NAMES
            .iter()
            .fold(StreamHeader::new(DIFFUSION_STREAM), |h, name| {
                h.with_var(VarDecl::new(*name, Dtype::F64, &[entity_count]))
            });
        let writer = StreamWriter::new(writer, header)?;
        tracing::debug!(entity_count, "diffusion output opened");
        Ok(Self {
            writer,
            entity_count,
        })
    }

    /// Number of entities every sequence must have.
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Steps persisted so far.
    pub fn steps_written(&self) -> u64 {
        self.writer.frames_written()
    }

    /// Persist the bins for `step`.
    pub fn write_step(&mut self, step: StepId, bins: &EntityBins) -> Result<(), SinkError> {
        let mut frame = StepFrame::new(step.0);
        for (field, data) in bins.iter() {
            if data.len() != self.entity_count {
                return Err(SinkError::ShapeMismatch {
                    field,
                    expected: self.entity_count,
                    found: data.len(),
                });
            }
            frame
                .push_block(field, &[data.len()], data.to_vec().into())
                .map_err(|rejected| StreamError::Malformed {
                    detail: format!("field '{field}' cannot hold a {} block", rejected.dtype()),
                })?;
        }
        self.writer.write_step(&frame)?;
        Ok(())
    }

    /// Write the end marker and return the underlying writer.
    pub fn close(self) -> Result<W, SinkError> {
        Ok(self.writer.close()?)
    }
}
