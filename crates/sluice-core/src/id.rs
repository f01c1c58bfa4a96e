//! Strongly-typed identifiers and the [`Shape`] type alias.

use smallvec::SmallVec;
use std::fmt;

/// Monotonically increasing step counter.
///
/// Advanced once per successfully processed step. A step that the source
/// reports as not ready never consumes a `StepId`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

impl StepId {
    /// The step that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StepId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Dimensions of a published block.
///
/// Diagnostic blocks are at most two-dimensional (row tables), so four
/// inline slots never spill to the heap.
pub type Shape = SmallVec<[usize; 4]>;

/// Number of elements described by a shape (product of its dimensions).
///
/// A zero-dimensional shape describes a single scalar.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn step_id_advances_by_one() {
        assert_eq!(StepId(0).next(), StepId(1));
        assert_eq!(StepId(41).next().to_string(), "42");
    }

    #[test]
    fn element_count_multiplies_dims() {
        let table: Shape = smallvec![7, 11];
        assert_eq!(element_count(&table), 77);
        assert_eq!(element_count(&[0, 11]), 0);
        assert_eq!(element_count(&[]), 1);
    }
}
