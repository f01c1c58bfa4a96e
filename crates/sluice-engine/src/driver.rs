//! The step loop shared by both pipelines.

use std::thread;

use sluice_core::StepId;
use sluice_source::StepStatus;

use crate::config::DriverConfig;
use crate::error::EngineError;
use crate::metrics::StepMetrics;

/// One worker's per-step reduction.
///
/// A `step` call that returns `NotReady` or `Ended` must have performed
/// no collective and mutated no accumulation state, so that every worker
/// observing the same status sequence stays in lockstep.
pub trait StepPipeline {
    /// Try to process the next step.
    fn step(&mut self) -> Result<StepStatus, EngineError>;

    /// Flush and close outputs. Safe to call more than once.
    fn finalize(&mut self) -> Result<(), EngineError>;

    /// Index of the next step this pipeline will complete.
    fn current_step(&self) -> StepId;

    /// Metrics of the most recently completed step.
    fn last_metrics(&self) -> &StepMetrics;
}

impl<P: StepPipeline + ?Sized> StepPipeline for &mut P {
    fn step(&mut self) -> Result<StepStatus, EngineError> {
        (**self).step()
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        (**self).finalize()
    }

    fn current_step(&self) -> StepId {
        (**self).current_step()
    }

    fn last_metrics(&self) -> &StepMetrics {
        (**self).last_metrics()
    }
}

/// Outcome of a completed [`run`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ready steps processed.
    pub steps_completed: u64,
    /// `NotReady` results retried over the whole run.
    pub not_ready_retries: u64,
    /// Metrics of the final completed step.
    pub last_metrics: StepMetrics,
}

/// Drive `pipeline` until its source ends.
///
/// `NotReady` sleeps for [`DriverConfig::retry_backoff`] and retries;
/// once `max_consecutive_not_ready` is reached the run fails with
/// [`EngineError::NotReadyLimit`]. `Ended` finalizes the pipeline.
/// Any error aborts the run without finalizing.
pub fn run<P: StepPipeline + ?Sized>(
    pipeline: &mut P,
    config: &DriverConfig,
) -> Result<RunSummary, EngineError> {
    config.validate()?;
    let mut summary = RunSummary::default();
    let mut consecutive = 0u64;
    loop {
        match pipeline.step()? {
            StepStatus::Ready => {
                consecutive = 0;
                summary.steps_completed += 1;
            }
            StepStatus::NotReady => {
                consecutive += 1;
                summary.not_ready_retries += 1;
                if let Some(limit) = config.max_consecutive_not_ready {
                    if consecutive >= limit {
                        tracing::warn!(
                            step = %pipeline.current_step(),
                            attempts = consecutive,
                            "giving up on not-ready step"
                        );
                        return Err(EngineError::NotReadyLimit {
                            step: pipeline.current_step(),
                            attempts: consecutive,
                        });
                    }
                }
                tracing::trace!(step = %pipeline.current_step(), "step not ready");
                thread::sleep(config.retry_backoff);
            }
            StepStatus::Ended => {
                pipeline.finalize()?;
                summary.last_metrics = pipeline.last_metrics().clone();
                tracing::info!(
                    steps = summary.steps_completed,
                    retries = summary.not_ready_retries,
                    "stream ended"
                );
                return Ok(summary);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays a scripted status sequence.
    struct Scripted {
        script: VecDeque<StepStatus>,
        step: StepId,
        finalized: u32,
        metrics: StepMetrics,
    }

    impl Scripted {
        fn new(script: &[StepStatus]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                step: StepId(0),
                finalized: 0,
                metrics: StepMetrics::default(),
            }
        }
    }

    impl StepPipeline for Scripted {
        fn step(&mut self) -> Result<StepStatus, EngineError> {
            let status = self.script.pop_front().unwrap_or(StepStatus::Ended);
            if status == StepStatus::Ready {
                self.step = self.step.next();
                self.metrics.rows_read = self.step.0 as usize;
            }
            Ok(status)
        }

        fn finalize(&mut self) -> Result<(), EngineError> {
            self.finalized += 1;
            Ok(())
        }

        fn current_step(&self) -> StepId {
            self.step
        }

        fn last_metrics(&self) -> &StepMetrics {
            &self.metrics
        }
    }

    fn fast(limit: Option<u64>) -> DriverConfig {
        DriverConfig {
            retry_backoff: Duration::ZERO,
            max_consecutive_not_ready: limit,
        }
    }

    #[test]
    fn retries_until_ended() {
        use StepStatus::*;
        let mut p = Scripted::new(&[NotReady, Ready, NotReady, NotReady, Ready, Ended]);
        let summary = run(&mut p, &fast(Some(3))).unwrap();
        assert_eq!(summary.steps_completed, 2);
        assert_eq!(summary.not_ready_retries, 3);
        assert_eq!(summary.last_metrics.rows_read, 2);
        assert_eq!(p.finalized, 1);
    }

    #[test]
    fn limit_counts_consecutive_results_only() {
        use StepStatus::*;
        let mut p = Scripted::new(&[Ready, NotReady, Ready, NotReady, NotReady, Ready]);
        let err = run(&mut p, &fast(Some(2))).unwrap_err();
        assert!(matches!(
            err,
            EngineError::NotReadyLimit {
                step: StepId(2),
                attempts: 2
            }
        ));
        assert_eq!(p.finalized, 0);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let mut p = Scripted::new(&[]);
        assert!(matches!(
            run(&mut p, &fast(Some(0))),
            Err(EngineError::Config(ConfigError::ZeroRetryLimit))
        ));
    }
}
