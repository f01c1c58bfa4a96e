//! Seeded generators for larger reproducible streams.

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sluice_core::{ParticleRecord, BIN_FIELD_COUNT, PHASE_WIDTH, TABLE_COLUMNS};

/// Deterministic source of row tables and particle records.
pub struct RandomStream {
    rng: ChaCha8Rng,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f64 {
        (self.rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.rng.next_u64() % n as u64) as usize
    }

    /// A table of `rows` rows with entity ids below `entity_count`.
    ///
    /// Bin values are small integers, so sums are exact regardless of
    /// addition order.
    pub fn table(&mut self, rows: usize, entity_count: usize) -> Vec<f64> {
        let mut t = Vec::with_capacity(rows * TABLE_COLUMNS);
        for _ in 0..rows {
            t.push(self.below(entity_count) as f64);
            for _ in 0..BIN_FIELD_COUNT {
                t.push(self.below(16) as f64);
            }
        }
        t
    }

    /// `n` records with ids starting at `first_gid`; each is escaped with
    /// probability `escaped`.
    pub fn records(&mut self, first_gid: i64, n: usize, escaped: f64) -> Vec<ParticleRecord> {
        (0..n)
            .map(|k| {
                let esc = self.unit() < escaped;
                let mut phase = [0.0f32; PHASE_WIDTH];
                for p in &mut phase {
                    *p = self.unit() as f32;
                }
                ParticleRecord {
                    gid: first_gid + k as i64,
                    flag: i32::from(esc) | ((self.below(16) as i32) << 1),
                    esc_step: if esc { self.below(100) as i32 } else { 0 },
                    phase,
                    dw: self.unit() as f32,
                }
            })
            .collect()
    }
}
