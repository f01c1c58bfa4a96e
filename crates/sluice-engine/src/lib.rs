//! Step-synchronised reduction pipelines.
//!
//! Two pipelines share one shape: every worker opens the same step of an
//! upstream [`StepSource`](sluice_source::StepSource), reads its
//! contiguous share of the step's blocks, reduces locally, then joins a
//! fixed sequence of collectives on a
//! [`Communicator`](sluice_comm::Communicator).
//!
//! - [`DiffusionPipeline`] sums per-entity bins to the coordinator and
//!   persists them through a [`DiffusionSink`].
//! - [`HeatloadPipeline`] classifies particles, gathers them to the
//!   coordinator, and feeds [`HeatloadPhysics`] with the synchronised
//!   escape history.
//!
//! [`run`] drives either pipeline until its source ends.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod collab;
pub mod config;
pub mod diffusion;
pub mod driver;
pub mod error;
pub mod heatload;
pub mod metrics;
pub mod sink;

pub use collab::{BroadcastSync, CoordinatorOnly, EscapeSync, HeatloadPhysics, SpeciesStep};
pub use config::{ConfigError, DiffusionConfig, DriverConfig, HeatloadConfig};
pub use diffusion::{DiffusionOutputs, DiffusionPipeline, DupStream, DUP_TABLE_VAR};
pub use driver::{run, RunSummary, StepPipeline};
pub use error::{CollaboratorError, EngineError};
pub use heatload::HeatloadPipeline;
pub use metrics::StepMetrics;
pub use sink::{DiffusionSink, SinkError, DIFFUSION_STREAM};
