//! Live in-process step stream.
//!
//! A producer [`publish`](MemoryStream::publish)es whole steps and finally
//! [`close`](MemoryStream::close)s the stream. Any number of
//! [`MemoryReader`]s, typically one per worker, each walk every published
//! step with their own cursor.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use sluice_core::{Element, StepId};
use sluice_stream::{StepFrame, StreamError, StreamHeader};

use crate::step::Cursor;
use crate::{BlockInfo, GetHandle, SourceError, StepSource, StepStatus};

struct State {
    steps: Vec<Arc<StepFrame>>,
    closed: bool,
}

struct Shared {
    header: StreamHeader,
    state: Mutex<State>,
    published: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Every mutation is a single push or flag store, so a poisoned
        // lock still guards consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Producer side of a live in-process stream.
///
/// Cheap to clone; clones publish into the same stream.
///
/// # Examples
///
/// ```
/// use sluice_core::Dtype;
/// use sluice_source::{MemoryStream, StepSource, StepStatus};
/// use sluice_stream::{StepFrame, StreamHeader, VarDecl};
///
/// let stream = MemoryStream::new(
///     StreamHeader::new("live").with_var(VarDecl::new("x", Dtype::F64, &[])),
/// );
/// let mut reader = stream.reader(None);
/// assert_eq!(reader.begin_step().unwrap(), StepStatus::NotReady);
///
/// let mut step = StepFrame::new(0);
/// step.push_block("x", &[3], vec![1.0f64, 2.0, 3.0].into()).unwrap();
/// stream.publish(step).unwrap();
/// stream.close();
///
/// assert_eq!(reader.begin_step().unwrap(), StepStatus::Ready);
/// let h = reader.get::<f64>("x", 0).unwrap();
/// reader.perform_gets().unwrap();
/// assert_eq!(reader.take(h).unwrap(), vec![1.0, 2.0, 3.0]);
/// reader.end_step().unwrap();
/// assert_eq!(reader.begin_step().unwrap(), StepStatus::Ended);
/// ```
#[derive(Clone)]
pub struct MemoryStream {
    shared: Arc<Shared>,
}

impl MemoryStream {
    /// Create an open, empty stream with the given declarations.
    pub fn new(header: StreamHeader) -> Self {
        Self {
            shared: Arc::new(Shared {
                header,
                state: Mutex::new(State {
                    steps: Vec::new(),
                    closed: false,
                }),
                published: Condvar::new(),
            }),
        }
    }

    /// Append a step and wake waiting readers.
    ///
    /// Every variable in `step` must be declared with a matching element
    /// type, and every block must hold as many elements as its shape.
    pub fn publish(&self, step: StepFrame) -> Result<(), SourceError> {
        step.check_shapes()?;
        for var in &step.vars {
            match self.shared.header.decl(&var.name) {
                Some(d) if d.dtype == var.dtype => {}
                _ => {
                    return Err(StreamError::Undeclared {
                        name: var.name.clone(),
                        dtype: var.dtype,
                    }
                    .into())
                }
            }
        }
        let mut state = self.shared.lock();
        if state.closed {
            return Err(SourceError::StreamClosed);
        }
        tracing::trace!(
            stream = %self.shared.header.name,
            step = step.step,
            blocks = step.block_count(),
            "step published"
        );
        state.steps.push(Arc::new(step));
        drop(state);
        self.shared.published.notify_all();
        Ok(())
    }

    /// Mark the end of the stream. Readers see [`StepStatus::Ended`] once
    /// they have consumed every published step. Idempotent.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.published.notify_all();
    }

    /// Number of steps published so far.
    pub fn published(&self) -> usize {
        self.shared.lock().steps.len()
    }

    /// The stream's declarations.
    pub fn header(&self) -> &StreamHeader {
        &self.shared.header
    }

    /// A new reader positioned at the first step.
    ///
    /// With `wait = Some(d)`, `begin_step` blocks up to `d` for a step to
    /// be published before reporting [`StepStatus::NotReady`]; with
    /// `None` it reports immediately.
    pub fn reader(&self, wait: Option<Duration>) -> MemoryReader {
        MemoryReader {
            shared: Arc::clone(&self.shared),
            next: 0,
            wait,
            cursor: Cursor::default(),
        }
    }
}

enum Poll {
    Step(Arc<StepFrame>),
    Ended,
    Empty,
}

/// Consumer side of a [`MemoryStream`].
pub struct MemoryReader {
    shared: Arc<Shared>,
    next: usize,
    wait: Option<Duration>,
    cursor: Cursor,
}

impl MemoryReader {
    fn poll(&self) -> Poll {
        let mut state = self.shared.lock();
        if let Some(wait) = self.wait {
            let deadline = Instant::now() + wait;
            while self.next >= state.steps.len() && !state.closed {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                state = self
                    .shared
                    .published
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            }
        }
        match state.steps.get(self.next) {
            Some(step) => Poll::Step(Arc::clone(step)),
            None if state.closed => Poll::Ended,
            None => Poll::Empty,
        }
    }
}

impl StepSource for MemoryReader {
    fn begin_step(&mut self) -> Result<StepStatus, SourceError> {
        self.cursor.ensure_closed()?;
        match self.poll() {
            Poll::Step(frame) => {
                self.cursor.open(frame);
                Ok(StepStatus::Ready)
            }
            Poll::Ended => Ok(StepStatus::Ended),
            Poll::Empty => Ok(StepStatus::NotReady),
        }
    }

    fn end_step(&mut self) -> Result<(), SourceError> {
        self.cursor.close()?;
        self.next += 1;
        Ok(())
    }

    fn current_step(&self) -> Option<StepId> {
        self.cursor.current()
    }

    fn blocks_info(&self, var: &str) -> Result<Vec<BlockInfo>, SourceError> {
        self.cursor.get()?.blocks_info(&self.shared.header, var)
    }

    fn get<T: Element>(
        &mut self,
        var: &str,
        block_id: usize,
    ) -> Result<GetHandle<T>, SourceError> {
        self.cursor
            .get_mut()?
            .schedule(&self.shared.header, var, block_id)
    }

    fn perform_gets(&mut self) -> Result<(), SourceError> {
        self.cursor.get_mut()?.perform();
        Ok(())
    }

    fn take<T: Element>(&mut self, handle: GetHandle<T>) -> Result<Vec<T>, SourceError> {
        self.cursor.get_mut()?.take(handle)
    }
}
