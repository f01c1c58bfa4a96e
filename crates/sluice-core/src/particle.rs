//! Particle records, their column layout, and escape classification.
//!
//! The simulation publishes particle observations as five parallel
//! columns (global id, flag, step of escape, energy-loss delta, and an
//! [`PHASE_WIDTH`]-wide phase vector). [`ParticleColumns`] holds those
//! columns flat and index-aligned; [`ParticleRecord`] is one row.

use indexmap::IndexMap;

use crate::error::InputError;
use crate::flags::ParticleFlags;

/// Number of `f32` phase-space components per particle.
pub const PHASE_WIDTH: usize = 11;

/// Particle species published by the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Species {
    /// Ions (variables prefixed `i`).
    Ion,
    /// Electrons (variables prefixed `e`).
    Electron,
}

impl Species {
    /// Both species, in processing order.
    pub const ALL: [Species; 2] = [Species::Ion, Species::Electron];

    /// Variable-name prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Ion => "i",
            Self::Electron => "e",
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ion => "ion",
            Self::Electron => "electron",
        }
    }

    /// Full variable name for a column suffix, e.g. `Ion.var("gid") == "igid"`.
    pub fn var(self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix())
    }
}

/// One particle observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleRecord {
    /// Global particle id.
    pub gid: i64,
    /// Raw status flag word (see [`ParticleFlags`]).
    pub flag: i32,
    /// Simulation step at which the particle escaped.
    pub esc_step: i32,
    /// Phase vector `[r, z, phi, rho, w1, w2, mu, w0, f0, psi, B]`.
    pub phase: [f32; PHASE_WIDTH],
    /// Energy-loss delta.
    pub dw: f32,
}

impl ParticleRecord {
    /// Decoded status flags.
    pub fn flags(&self) -> ParticleFlags {
        ParticleFlags::decode(self.flag)
    }

    /// Whether the escape bit is set.
    pub fn is_escaped(&self) -> bool {
        self.flags().escaped
    }

    /// Major radius.
    pub fn r(&self) -> f32 {
        self.phase[0]
    }

    /// Vertical position.
    pub fn z(&self) -> f32 {
        self.phase[1]
    }

    /// Toroidal angle.
    pub fn phi(&self) -> f32 {
        self.phase[2]
    }

    /// Parallel gyro-radius.
    pub fn rho(&self) -> f32 {
        self.phase[3]
    }

    /// Magnetic moment.
    pub fn mu(&self) -> f32 {
        self.phase[6]
    }

    /// Poloidal flux.
    pub fn psi(&self) -> f32 {
        self.phase[9]
    }

    /// Magnetic field magnitude.
    pub fn b(&self) -> f32 {
        self.phase[10]
    }
}

/// Flat, index-aligned particle columns.
///
/// `phase` holds [`PHASE_WIDTH`] entries per record; every other column
/// holds one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParticleColumns {
    /// Global ids.
    pub gid: Vec<i64>,
    /// Flag words.
    pub flag: Vec<i32>,
    /// Escape steps.
    pub step: Vec<i32>,
    /// Energy-loss deltas.
    pub dw: Vec<f32>,
    /// Phase vectors, row-major.
    pub phase: Vec<f32>,
}

impl ParticleColumns {
    /// Empty columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records implied by the identity column.
    pub fn len(&self) -> usize {
        self.gid.len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.gid.is_empty()
    }

    /// Append one fetched block worth of columns.
    pub fn extend_from(&mut self, other: ParticleColumns) {
        self.gid.extend(other.gid);
        self.flag.extend(other.flag);
        self.step.extend(other.step);
        self.dw.extend(other.dw);
        self.phase.extend(other.phase);
    }

    /// Check that every column agrees with the identity column.
    pub fn check_aligned(&self) -> Result<usize, InputError> {
        let n = self.gid.len();
        let checks = [
            ("flag", n, self.flag.len()),
            ("step", n, self.step.len()),
            ("dw", n, self.dw.len()),
            ("phase", n * PHASE_WIDTH, self.phase.len()),
        ];
        for (column, expected, found) in checks {
            if expected != found {
                return Err(InputError::MisalignedColumns {
                    column,
                    expected,
                    found,
                });
            }
        }
        Ok(n)
    }

    /// Rebuild one record per index.
    pub fn to_records(&self) -> Result<Vec<ParticleRecord>, InputError> {
        let n = self.check_aligned()?;
        let records = (0..n)
            .map(|k| {
                let mut phase = [0.0f32; PHASE_WIDTH];
                phase.copy_from_slice(&self.phase[k * PHASE_WIDTH..(k + 1) * PHASE_WIDTH]);
                ParticleRecord {
                    gid: self.gid[k],
                    flag: self.flag[k],
                    esc_step: self.step[k],
                    phase,
                    dw: self.dw[k],
                }
            })
            .collect();
        Ok(records)
    }

    /// Flatten records back into columns.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ParticleRecord>) -> Self {
        let mut cols = Self::new();
        for rec in records {
            cols.gid.push(rec.gid);
            cols.flag.push(rec.flag);
            cols.step.push(rec.esc_step);
            cols.dw.push(rec.dw);
            cols.phase.extend_from_slice(&rec.phase);
        }
        cols
    }

    /// Reconstruct and classify in one pass.
    pub fn classify(&self) -> Result<Classified, InputError> {
        Ok(classify(self.to_records()?))
    }
}

/// Escaped particles keyed by global id, in first-insertion order.
///
/// Insertion is first-seen-wins: proposing a record whose id is already
/// present leaves the stored record unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EscapedSet {
    records: IndexMap<i64, ParticleRecord>,
}

impl EscapedSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate. Returns `true` if it was inserted.
    pub fn propose(&mut self, record: ParticleRecord) -> bool {
        match self.records.entry(record.gid) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `gid` is present.
    pub fn contains(&self, gid: i64) -> bool {
        self.records.contains_key(&gid)
    }

    /// Record stored for `gid`.
    pub fn get(&self, gid: i64) -> Option<&ParticleRecord> {
        self.records.get(&gid)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ParticleRecord> {
        self.records.values()
    }
}

impl FromIterator<ParticleRecord> for EscapedSet {
    fn from_iter<I: IntoIterator<Item = ParticleRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        for rec in iter {
            set.propose(rec);
        }
        set
    }
}

/// Confined particles, in arrival order. Rebuilt every step.
pub type ConfinedList = Vec<ParticleRecord>;

/// Result of splitting records by their escape bit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classified {
    /// Records with the escape bit set.
    pub escaped: EscapedSet,
    /// Records without it.
    pub confined: ConfinedList,
}

/// Split records into escaped and confined collections.
pub fn classify(records: impl IntoIterator<Item = ParticleRecord>) -> Classified {
    let mut out = Classified::default();
    for rec in records {
        if rec.is_escaped() {
            out.escaped.propose(rec);
        } else {
            out.confined.push(rec);
        }
    }
    out
}

/// Append-only sequence of per-step escaped sets.
///
/// Never pruned: memory grows with the number of processed steps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepHistory {
    steps: Vec<EscapedSet>,
}

impl StepHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the escaped set of a newly processed step.
    pub fn push(&mut self, set: EscapedSet) {
        self.steps.push(set);
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps have been recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Escaped sets, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &EscapedSet> {
        self.steps.iter()
    }

    /// The most recent step's set.
    pub fn latest(&self) -> Option<&EscapedSet> {
        self.steps.last()
    }

    /// Total records held across all steps.
    pub fn total_records(&self) -> usize {
        self.steps.iter().map(EscapedSet::len).sum()
    }
}
