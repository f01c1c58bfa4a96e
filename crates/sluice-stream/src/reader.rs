//! Step-stream reader.
//!
//! [`StreamReader`] reads frames from any `Read` source. The header is
//! validated on construction. For a source that is still being written,
//! see `FileSource` in `sluice-source`, which decodes from a byte buffer
//! and tolerates a partially written trailing frame.

use std::io::Read;

use crate::codec::{decode_frame, decode_header};
use crate::error::StreamError;
use crate::types::{Frame, StepFrame, StreamHeader};

/// Reads a complete step stream from a byte source.
pub struct StreamReader<R: Read> {
    reader: R,
    header: StreamHeader,
    frames_read: u64,
    ended: bool,
}

impl<R: Read> StreamReader<R> {
    /// Open a stream, reading and validating the header.
    pub fn open(mut reader: R) -> Result<Self, StreamError> {
        let header = decode_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            frames_read: 0,
            ended: false,
        })
    }

    /// The stream header.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Read the next step frame.
    ///
    /// Returns `None` after the end marker, and also on clean EOF at a
    /// frame boundary; [`is_ended`](Self::is_ended) tells the two apart.
    pub fn next_frame(&mut self) -> Result<Option<StepFrame>, StreamError> {
        if self.ended {
            return Ok(None);
        }
        match decode_frame(&mut self.reader)? {
            Some(Frame::Step(frame)) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Some(Frame::End) => {
                self.ended = true;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Whether the end marker has been read.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Number of step frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Convert into a step-frame iterator.
    pub fn frames(self) -> FrameIter<R> {
        FrameIter {
            reader: self,
            done: false,
        }
    }
}

/// Iterator adapter over step frames.
pub struct FrameIter<R: Read> {
    reader: StreamReader<R>,
    done: bool,
}

impl<R: Read> Iterator for FrameIter<R> {
    type Item = Result<StepFrame, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarDecl;
    use crate::writer::StreamWriter;
    use sluice_core::Dtype;

    fn header() -> StreamHeader {
        StreamHeader::new("t").with_var(VarDecl::new("v", Dtype::I32, &[]))
    }

    fn frame(step: u64) -> StepFrame {
        let mut f = StepFrame::new(step);
        f.push_block("v", &[2], vec![step as i32, -1].into()).unwrap();
        f
    }

    #[test]
    fn frame_iterator_stops_at_end_marker() {
        let mut w = StreamWriter::new(Vec::new(), header()).unwrap();
        for s in 0..3 {
            w.write_step(&frame(s)).unwrap();
        }
        let bytes = w.close().unwrap();

        let reader = StreamReader::open(bytes.as_slice()).unwrap();
        assert_eq!(reader.header(), &header());
        let frames: Vec<_> = reader.frames().collect::<Result<_, _>>().unwrap();
        assert_eq!(frames, vec![frame(0), frame(1), frame(2)]);
    }

    #[test]
    fn unclosed_stream_reads_but_does_not_end() {
        let mut w = StreamWriter::new(Vec::new(), header()).unwrap();
        w.write_step(&frame(0)).unwrap();
        let bytes = w.get_ref().clone();

        let mut r = StreamReader::open(bytes.as_slice()).unwrap();
        assert_eq!(r.next_frame().unwrap(), Some(frame(0)));
        assert_eq!(r.next_frame().unwrap(), None);
        assert!(!r.is_ended());
        assert_eq!(r.frames_read(), 1);
    }

    #[test]
    fn truncated_stream_errors() {
        let mut w = StreamWriter::new(Vec::new(), header()).unwrap();
        w.write_step(&frame(0)).unwrap();
        let mut bytes = w.get_ref().clone();
        bytes.truncate(bytes.len() - 3);

        let mut r = StreamReader::open(bytes.as_slice()).unwrap();
        assert!(r.next_frame().is_err());
    }

    #[test]
    fn bad_magic_on_open() {
        let data = b"XLCE\x01rest of data";
        assert!(matches!(
            StreamReader::open(data.as_slice()),
            Err(StreamError::InvalidMagic)
        ));
    }

    #[test]
    fn future_version_rejected() {
        let mut bytes = Vec::new();
        crate::codec::encode_header(&mut bytes, &header()).unwrap();
        bytes[4] = crate::FORMAT_VERSION + 1;
        assert!(matches!(
            StreamReader::open(bytes.as_slice()),
            Err(StreamError::UnsupportedVersion { .. })
        ));
    }
}
