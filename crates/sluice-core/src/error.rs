//! Input-consistency errors.
//!
//! Every variant describes upstream data that violates the publishing
//! contract. None of them is recoverable: continuing would silently
//! corrupt the accumulated quantities, so callers propagate them and
//! terminate the run.

use std::error::Error;
use std::fmt;

/// Upstream data failed a consistency check.
#[derive(Clone, Debug, PartialEq)]
pub enum InputError {
    /// A row table's length is not a multiple of its column count.
    RaggedTable {
        /// Number of elements in the table.
        len: usize,
        /// Expected column count.
        columns: usize,
    },
    /// A row's entity id is not a non-negative integer.
    InvalidEntityId {
        /// The raw value found in the id column.
        value: f64,
    },
    /// A row's entity id lies outside the bin range.
    EntityIdOutOfRange {
        /// The decoded entity id.
        id: usize,
        /// Number of entities the bins were sized for.
        entity_count: usize,
    },
    /// Parallel particle columns disagree in length.
    MisalignedColumns {
        /// Name of the column that disagrees with the identity column.
        column: &'static str,
        /// Length implied by the identity column.
        expected: usize,
        /// Actual length.
        found: usize,
    },
    /// Two fields of the same logical record publish different block counts.
    BlockCountMismatch {
        /// Variable whose block list disagrees.
        var: String,
        /// Block count of the identity variable.
        expected: usize,
        /// Block count found for `var`.
        found: usize,
    },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RaggedTable { len, columns } => {
                write!(f, "table of {len} elements is not a multiple of {columns} columns")
            }
            Self::InvalidEntityId { value } => {
                write!(f, "entity id {value} is not a non-negative integer")
            }
            Self::EntityIdOutOfRange { id, entity_count } => {
                write!(f, "entity id {id} outside bin range 0..{entity_count}")
            }
            Self::MisalignedColumns {
                column,
                expected,
                found,
            } => write!(
                f,
                "column '{column}' has {found} elements, expected {expected}"
            ),
            Self::BlockCountMismatch {
                var,
                expected,
                found,
            } => write!(
                f,
                "variable '{var}' publishes {found} blocks, expected {expected}"
            ),
        }
    }
}

impl Error for InputError {}
