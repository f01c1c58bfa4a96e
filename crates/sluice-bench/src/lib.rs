//! Benchmark profiles for the Sluice reduction pipelines.
//!
//! - [`DiffusionProfile::reference`]: 16 blocks of 1K rows over 4K entities
//! - [`DiffusionProfile::stress`]: 64 blocks of 4K rows over 64K entities

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use sluice_source::MemoryStream;
use sluice_stream::StepFrame;
use sluice_test_utils::{diffusion_header, table_step, RandomStream};

/// Shape of a synthetic diffusion input.
#[derive(Clone, Copy, Debug)]
pub struct DiffusionProfile {
    /// Row-table blocks per step.
    pub blocks: usize,
    /// Rows per block.
    pub rows_per_block: usize,
    /// Entity bins.
    pub entity_count: usize,
}

impl DiffusionProfile {
    /// Moderate profile for per-commit runs.
    pub fn reference() -> Self {
        Self {
            blocks: 16,
            rows_per_block: 1_000,
            entity_count: 4_096,
        }
    }

    /// Large profile for scaling checks.
    pub fn stress() -> Self {
        Self {
            blocks: 64,
            rows_per_block: 4_000,
            entity_count: 65_536,
        }
    }

    /// One deterministic step of row tables.
    pub fn step(&self, seed: u64, step: u64) -> StepFrame {
        let mut gen = RandomStream::new(seed ^ step);
        let tables: Vec<Vec<f64>> = (0..self.blocks)
            .map(|_| gen.table(self.rows_per_block, self.entity_count))
            .collect();
        table_step(step, &tables)
    }

    /// A closed in-memory stream of `steps` steps.
    pub fn stream(&self, seed: u64, steps: u64) -> MemoryStream {
        let stream = MemoryStream::new(diffusion_header());
        for s in 0..steps {
            // Frames come from the declared header, so publish cannot fail.
            let _ = stream.publish(self.step(seed, s));
        }
        stream.close();
        stream
    }
}
