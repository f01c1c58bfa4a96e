//! File-backed step source over a container that may still be growing.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sluice_core::{Element, StepId};
use sluice_stream::codec::{try_decode_frame, try_decode_header};
use sluice_stream::{Frame, StreamHeader};

use crate::step::Cursor;
use crate::{BlockInfo, GetHandle, SourceError, StepSource, StepStatus};

/// Reads a `sluice-stream` container from disk, step by step.
///
/// Every `begin_step` picks up whatever the producer has appended since
/// the last call. A header or trailing frame that is only partly written
/// yields [`StepStatus::NotReady`]; the end marker yields
/// [`StepStatus::Ended`]. A checksum failure on a complete frame is an
/// error, not a retry.
pub struct FileSource {
    path: PathBuf,
    file: File,
    /// Bytes read from the file but not yet consumed as frames.
    pending: Vec<u8>,
    header: Option<StreamHeader>,
    ended: bool,
    cursor: Cursor,
}

impl FileSource {
    /// Open the container at `path`. The file must exist; it may be empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file,
            pending: Vec::new(),
            header: None,
            ended: false,
            cursor: Cursor::default(),
        })
    }

    /// Path this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stream header, once it has been fully written.
    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    fn fill(&mut self) -> Result<(), SourceError> {
        // Reading past EOF on a regular file is not sticky: bytes appended
        // later are returned by the next read.
        let n = self.file.read_to_end(&mut self.pending)?;
        if n > 0 {
            tracing::trace!(path = %self.path.display(), bytes = n, "read appended bytes");
        }
        Ok(())
    }
}

/// A step can only be open once the header has been read.
fn opened(header: &Option<StreamHeader>) -> Result<&StreamHeader, SourceError> {
    header.as_ref().ok_or(SourceError::StepProtocol {
        detail: "no step is open",
    })
}

impl StepSource for FileSource {
    fn begin_step(&mut self) -> Result<StepStatus, SourceError> {
        self.cursor.ensure_closed()?;
        if self.ended {
            return Ok(StepStatus::Ended);
        }
        self.fill()?;

        if self.header.is_none() {
            match try_decode_header(&self.pending)? {
                Some((header, used)) => {
                    tracing::debug!(
                        path = %self.path.display(),
                        stream = %header.name,
                        vars = header.decls.len(),
                        "stream header read"
                    );
                    self.pending.drain(..used);
                    self.header = Some(header);
                }
                None => return Ok(StepStatus::NotReady),
            }
        }

        match try_decode_frame(&self.pending)? {
            None => Ok(StepStatus::NotReady),
            Some((Frame::End, used)) => {
                self.pending.drain(..used);
                self.ended = true;
                Ok(StepStatus::Ended)
            }
            Some((Frame::Step(frame), used)) => {
                self.pending.drain(..used);
                self.cursor.open(Arc::new(frame));
                Ok(StepStatus::Ready)
            }
        }
    }

    fn end_step(&mut self) -> Result<(), SourceError> {
        self.cursor.close().map(|_| ())
    }

    fn current_step(&self) -> Option<StepId> {
        self.cursor.current()
    }

    fn blocks_info(&self, var: &str) -> Result<Vec<BlockInfo>, SourceError> {
        let step = self.cursor.get()?;
        step.blocks_info(opened(&self.header)?, var)
    }

    fn get<T: Element>(
        &mut self,
        var: &str,
        block_id: usize,
    ) -> Result<GetHandle<T>, SourceError> {
        let header = opened(&self.header)?;
        self.cursor.get_mut()?.schedule(header, var, block_id)
    }

    fn perform_gets(&mut self) -> Result<(), SourceError> {
        self.cursor.get_mut()?.perform();
        Ok(())
    }

    fn take<T: Element>(&mut self, handle: GetHandle<T>) -> Result<Vec<T>, SourceError> {
        self.cursor.get_mut()?.take(handle)
    }
}
