//! Single-worker communicator.

use sluice_core::Element;

use crate::{check_varcount, CommError, Communicator, COORDINATOR};

/// A group of exactly one worker, which is also the coordinator.
///
/// Every collective degenerates to a local copy. Useful for serial runs
/// and as the reference behaviour in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoloComm;

impl Communicator for SoloComm {
    fn rank(&self) -> usize {
        COORDINATOR
    }

    fn size(&self) -> usize {
        1
    }

    fn reduce_sum(&self, _buf: &mut [f64]) -> Result<(), CommError> {
        Ok(())
    }

    fn all_gather<T: Element>(&self, value: T) -> Result<Vec<T>, CommError> {
        Ok(vec![value])
    }

    fn gather_varcount<T: Element>(
        &self,
        local: &[T],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<Option<Vec<T>>, CommError> {
        let total = check_varcount(COORDINATOR, 1, local.len(), counts, displs)?;
        let mut out = vec![T::default(); total];
        out[displs[0]..displs[0] + local.len()].copy_from_slice(local);
        Ok(Some(out))
    }

    fn broadcast<T: Element>(&self, data: Vec<T>) -> Result<Vec<T>, CommError> {
        Ok(data)
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }
}
