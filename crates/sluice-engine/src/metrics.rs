//! Per-step performance metrics for the reduction pipelines.
//!
//! [`StepMetrics`] captures timing and volume for a single completed
//! step. Pipelines overwrite it after every Ready step; the driver hands
//! the last one back in its run summary.

/// Timing and volume metrics collected during a single step.
///
/// All durations are in microseconds and cover this worker only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step, in microseconds.
    pub total_us: u64,
    /// Time spent executing deferred fetches, in microseconds.
    pub fetch_us: u64,
    /// Time spent writing the duplicate stream, in microseconds.
    pub dup_write_us: u64,
    /// Time spent inside collectives (reduce or gather), in microseconds.
    pub collective_us: u64,
    /// Time spent persisting output on the coordinator, in microseconds.
    pub output_us: u64,
    /// Blocks this worker fetched.
    pub blocks_read: usize,
    /// Table rows (diffusion) or particle records (heat load) this
    /// worker fetched.
    pub rows_read: usize,
    /// Escaped records added to the history this step, all species.
    pub escaped: usize,
}
