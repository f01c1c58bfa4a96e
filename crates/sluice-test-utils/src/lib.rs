//! Test fixtures and seeded data generators for Sluice development.
//!
//! [`fixtures`] builds small hand-checkable streams; [`random`] builds
//! larger reproducible ones from a seed. [`SharedBuffer`] is a cloneable
//! in-memory writer for inspecting sink and duplicate-stream output
//! after the pipeline that owns it has been dropped.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod random;

pub use fixtures::{
    diffusion_header, heatload_header, particle_block, particle_step, record, row, table,
    table_step,
};
pub use random::RandomStream;

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A `Write` target whose clones all append to the same bytes.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
