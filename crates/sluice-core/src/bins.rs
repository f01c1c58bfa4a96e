//! Per-entity accumulation bins for the diffusion diagnostic.
//!
//! A diffusion row table has [`TABLE_COLUMNS`] columns: the entity id
//! (a mesh triangle index stored as a float) followed by ten quantities,
//! one per bin field. Rows are *added* into the bins, so several rows or
//! blocks that reference the same entity accumulate.

use crate::error::InputError;

/// Number of accumulated quantities per entity.
pub const BIN_FIELD_COUNT: usize = 10;

/// Columns in a diffusion row table (entity id + bin fields).
pub const TABLE_COLUMNS: usize = BIN_FIELD_COUNT + 1;

/// Bin field names, in table column order (column `i + 1` feeds field `i`).
pub const BIN_FIELD_NAMES: [&str; BIN_FIELD_COUNT] = [
    "i_dr_avg",
    "i_dr_squared_average",
    "i_dE_avg",
    "i_dE_squared_average",
    "i_marker_den",
    "e_dr_avg",
    "e_dr_squared_average",
    "e_dE_avg",
    "e_dE_squared_average",
    "e_marker_den",
];

/// Ten parallel accumulators, one slot per entity.
///
/// Owned by a single worker. [`reset`](Self::reset) zeroes every slot and
/// must be called at the start of each ready step; nothing else clears
/// the bins.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityBins {
    entity_count: usize,
    fields: [Vec<f64>; BIN_FIELD_COUNT],
}

impl EntityBins {
    /// Allocate zeroed bins for `entity_count` entities.
    pub fn new(entity_count: usize) -> Self {
        Self {
            entity_count,
            fields: std::array::from_fn(|_| vec![0.0; entity_count]),
        }
    }

    /// Number of entities (length of every field).
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Zero every slot of every field.
    pub fn reset(&mut self) {
        for field in &mut self.fields {
            field.fill(0.0);
        }
    }

    /// Read one field by index (see [`BIN_FIELD_NAMES`]).
    ///
    /// # Panics
    ///
    /// Panics if `index >= BIN_FIELD_COUNT`.
    pub fn field(&self, index: usize) -> &[f64] {
        &self.fields[index]
    }

    /// Look a field up by name.
    pub fn field_by_name(&self, name: &str) -> Option<&[f64]> {
        BIN_FIELD_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.fields[i].as_slice())
    }

    /// Iterate `(name, values)` in canonical field order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[f64])> {
        BIN_FIELD_NAMES
            .iter()
            .copied()
            .zip(self.fields.iter().map(Vec::as_slice))
    }

    /// Mutable access to every field, in canonical order.
    ///
    /// Used by collective reductions, which overwrite the buffers in place.
    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut [f64])> {
        BIN_FIELD_NAMES
            .iter()
            .copied()
            .zip(self.fields.iter_mut().map(Vec::as_mut_slice))
    }

    /// Fold a flat row-major table into the bins and return the row count.
    ///
    /// The whole table is validated before any slot is touched, so a bad
    /// row leaves the bins exactly as they were.
    pub fn accumulate_table(&mut self, table: &[f64]) -> Result<usize, InputError> {
        if table.len() % TABLE_COLUMNS != 0 {
            return Err(InputError::RaggedTable {
                len: table.len(),
                columns: TABLE_COLUMNS,
            });
        }
        for row in table.chunks_exact(TABLE_COLUMNS) {
            self.entity_index(row[0])?;
        }
        let mut rows = 0;
        for row in table.chunks_exact(TABLE_COLUMNS) {
            let id = self.entity_index(row[0])?;
            for (field, &value) in self.fields.iter_mut().zip(&row[1..]) {
                field[id] += value;
            }
            rows += 1;
        }
        Ok(rows)
    }

    fn entity_index(&self, raw: f64) -> Result<usize, InputError> {
        if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 {
            return Err(InputError::InvalidEntityId { value: raw });
        }
        // Integral and non-negative; saturating cast is exact below 2^53.
        let id = raw as usize;
        if id >= self.entity_count {
            return Err(InputError::EntityIdOutOfRange {
                id,
                entity_count: self.entity_count,
            });
        }
        Ok(id)
    }
}
