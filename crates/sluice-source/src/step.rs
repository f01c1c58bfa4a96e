//! Open-step state shared by every source: the step's data plus the
//! deferred-fetch slots.

use std::sync::Arc;

use sluice_core::{Buffer, Element, StepId};
use sluice_stream::{StepFrame, StreamHeader};

use crate::{BlockInfo, GetHandle, SourceError};

enum Slot {
    Pending { var: usize, block: usize },
    Fetched(Buffer),
    Taken,
}

pub(crate) struct OpenStep {
    frame: Arc<StepFrame>,
    generation: u64,
    slots: Vec<Slot>,
}

impl OpenStep {
    pub(crate) fn new(frame: Arc<StepFrame>, generation: u64) -> Self {
        Self {
            frame,
            generation,
            slots: Vec::new(),
        }
    }

    pub(crate) fn step(&self) -> StepId {
        StepId(self.frame.step)
    }

    pub(crate) fn blocks_info(
        &self,
        header: &StreamHeader,
        var: &str,
    ) -> Result<Vec<BlockInfo>, SourceError> {
        match self.frame.var(var) {
            Some(v) => Ok(v
                .blocks
                .iter()
                .enumerate()
                .map(|(block_id, b)| BlockInfo {
                    block_id,
                    shape: b.shape.clone(),
                })
                .collect()),
            None if header.decl(var).is_some() => Ok(Vec::new()),
            None => Err(SourceError::UnknownVariable {
                var: var.to_string(),
            }),
        }
    }

    pub(crate) fn schedule<T: Element>(
        &mut self,
        header: &StreamHeader,
        var: &str,
        block_id: usize,
    ) -> Result<GetHandle<T>, SourceError> {
        let stored = header
            .decl(var)
            .map(|d| d.dtype)
            .or_else(|| self.frame.var(var).map(|v| v.dtype))
            .ok_or_else(|| SourceError::UnknownVariable {
                var: var.to_string(),
            })?;
        if stored != T::DTYPE {
            return Err(SourceError::TypeMismatch {
                var: var.to_string(),
                stored,
                requested: T::DTYPE,
            });
        }
        let (var_idx, block_count) = self
            .frame
            .vars
            .iter()
            .enumerate()
            .find(|(_, v)| v.name == var)
            .map(|(i, v)| (i, v.blocks.len()))
            .unwrap_or((usize::MAX, 0));
        if block_id >= block_count {
            return Err(SourceError::UnknownBlock {
                var: var.to_string(),
                block_id,
                block_count,
            });
        }
        self.slots.push(Slot::Pending {
            var: var_idx,
            block: block_id,
        });
        Ok(GetHandle::new(self.generation, self.slots.len() - 1))
    }

    pub(crate) fn perform(&mut self) {
        for slot in &mut self.slots {
            if let Slot::Pending { var, block } = *slot {
                *slot = Slot::Fetched(self.frame.vars[var].blocks[block].data.clone());
            }
        }
    }

    pub(crate) fn take<T: Element>(&mut self, handle: GetHandle<T>) -> Result<Vec<T>, SourceError> {
        if handle.generation != self.generation {
            return Err(SourceError::StaleHandle);
        }
        let slot = self
            .slots
            .get_mut(handle.slot)
            .ok_or(SourceError::StaleHandle)?;
        match std::mem::replace(slot, Slot::Taken) {
            Slot::Fetched(buf) => buf.into_vec::<T>().map_err(|_| SourceError::StaleHandle),
            Slot::Pending { var, block } => {
                *slot = Slot::Pending { var, block };
                Err(SourceError::FetchPending {
                    var: self.frame.vars[var].name.clone(),
                    block_id: block,
                })
            }
            Slot::Taken => Err(SourceError::StaleHandle),
        }
    }
}

/// Open-step bookkeeping shared by sources: at most one open step, and a
/// generation counter that invalidates handles from earlier steps.
#[derive(Default)]
pub(crate) struct Cursor {
    open: Option<OpenStep>,
    generation: u64,
}

impl Cursor {
    pub(crate) fn ensure_closed(&self) -> Result<(), SourceError> {
        if self.open.is_some() {
            return Err(SourceError::StepProtocol {
                detail: "begin_step called while a step is open",
            });
        }
        Ok(())
    }

    pub(crate) fn open(&mut self, frame: Arc<StepFrame>) {
        self.generation += 1;
        self.open = Some(OpenStep::new(frame, self.generation));
    }

    pub(crate) fn close(&mut self) -> Result<StepId, SourceError> {
        self.open
            .take()
            .map(|s| s.step())
            .ok_or(SourceError::StepProtocol {
                detail: "end_step called with no open step",
            })
    }

    pub(crate) fn current(&self) -> Option<StepId> {
        self.open.as_ref().map(OpenStep::step)
    }

    pub(crate) fn get(&self) -> Result<&OpenStep, SourceError> {
        self.open.as_ref().ok_or(SourceError::StepProtocol {
            detail: "no step is open",
        })
    }

    pub(crate) fn get_mut(&mut self) -> Result<&mut OpenStep, SourceError> {
        self.open.as_mut().ok_or(SourceError::StepProtocol {
            detail: "no step is open",
        })
    }
}
