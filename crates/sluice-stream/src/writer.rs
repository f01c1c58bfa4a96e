//! Step-stream writer.
//!
//! [`StreamWriter`] frames steps onto any `Write` sink. The header is
//! written immediately on construction; [`StreamWriter::close`] appends
//! the end marker.

use std::io::Write;

use crate::codec::{encode_frame, encode_header, encode_step_payload};
use crate::error::StreamError;
use crate::types::{StepFrame, StreamHeader};
use crate::{TAG_END, TAG_STEP};

/// Writes a step stream to a byte sink.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use a `File`. Each frame is assembled in memory and handed
/// to the sink with one `write_all` followed by a flush, so a reader
/// tailing the sink sees either nothing of a frame or all of it once the
/// flush lands. A writer dropped without [`close`](Self::close) leaves a
/// stream that is valid but never ends.
///
/// # Examples
///
/// ```
/// use sluice_core::Dtype;
/// use sluice_stream::{StepFrame, StreamHeader, StreamReader, StreamWriter, VarDecl};
///
/// let header = StreamHeader::new("demo").with_var(VarDecl::new("x", Dtype::F64, &[2]));
/// let mut writer = StreamWriter::new(Vec::new(), header).unwrap();
/// for step in 0..2u64 {
///     let mut frame = StepFrame::new(step);
///     frame.push_block("x", &[2], vec![step as f64; 2].into()).unwrap();
///     writer.write_step(&frame).unwrap();
/// }
/// assert_eq!(writer.frames_written(), 2);
/// let bytes = writer.close().unwrap();
///
/// let mut reader = StreamReader::open(bytes.as_slice()).unwrap();
/// assert_eq!(reader.next_frame().unwrap().unwrap().step, 0);
/// assert_eq!(reader.next_frame().unwrap().unwrap().step, 1);
/// assert!(reader.next_frame().unwrap().is_none());
/// assert!(reader.is_ended());
/// ```
pub struct StreamWriter<W: Write> {
    writer: W,
    header: StreamHeader,
    frames_written: u64,
}

impl<W: Write> StreamWriter<W> {
    /// Create a writer, immediately writing and flushing the header.
    pub fn new(mut writer: W, header: StreamHeader) -> Result<Self, StreamError> {
        let mut buf = Vec::new();
        encode_header(&mut buf, &header)?;
        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(Self {
            writer,
            header,
            frames_written: 0,
        })
    }

    /// Append one step frame.
    ///
    /// Every variable in `frame` must be declared in the header with the
    /// same element type. Nothing reaches the sink if validation or
    /// encoding fails.
    pub fn write_step(&mut self, frame: &StepFrame) -> Result<(), StreamError> {
        for var in &frame.vars {
            match self.header.decl(&var.name) {
                Some(decl) if decl.dtype == var.dtype => {}
                _ => {
                    return Err(StreamError::Undeclared {
                        name: var.name.clone(),
                        dtype: var.dtype,
                    })
                }
            }
        }
        let payload = encode_step_payload(frame)?;
        self.writer.write_all(&encode_frame(TAG_STEP, &payload))?;
        self.writer.flush()?;
        self.frames_written += 1;
        tracing::trace!(
            stream = %self.header.name,
            step = frame.step,
            bytes = payload.len(),
            "frame written"
        );
        Ok(())
    }

    /// Write the end marker, flush, and return the underlying sink.
    pub fn close(mut self) -> Result<W, StreamError> {
        self.writer.write_all(&encode_frame(TAG_END, &[]))?;
        self.writer.flush()?;
        tracing::debug!(
            stream = %self.header.name,
            frames = self.frames_written,
            "stream closed"
        );
        Ok(self.writer)
    }

    /// The header this writer was created with.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Number of step frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}
