//! Sluice: step-synchronised parallel reduction of streamed simulation
//! diagnostics.
//!
//! This is the top-level facade crate that re-exports the public API of
//! the Sluice sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use sluice::prelude::*;
//! use sluice::stream::{StepFrame, StreamHeader, VarDecl};
//! use sluice::types::Dtype;
//!
//! let input = MemoryStream::new(
//!     StreamHeader::new("input").with_var(VarDecl::new("table", Dtype::F64, &[])),
//! );
//! // One row: entity 1, then ten bin values.
//! let mut row = vec![1.0];
//! row.extend((1..=10).map(f64::from));
//! let mut step = StepFrame::new(0);
//! step.push_block("table", &[1, 11], row.into()).unwrap();
//! input.publish(step).unwrap();
//! input.close();
//!
//! let config = DiffusionConfig { entity_count: 2, ..Default::default() };
//! let sink = DiffusionSink::open(Vec::new(), 2).unwrap();
//! let mut pipeline =
//!     DiffusionPipeline::new(input.reader(None), SoloComm, config, Some(sink), None).unwrap();
//! let summary = run(&mut pipeline, &DriverConfig::default()).unwrap();
//! assert_eq!(summary.steps_completed, 1);
//! assert_eq!(pipeline.bins().field_by_name("i_marker_den"), Some(&[0.0, 5.0][..]));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `sluice-core` | ids, buffers, bins, particle records, partitioning |
//! | [`comm`] | `sluice-comm` | communicator trait, solo and thread-group backends |
//! | [`stream`] | `sluice-stream` | step-stream container format |
//! | [`source`] | `sluice-source` | step sources over memory and files |
//! | [`engine`] | `sluice-engine` | diffusion and heat-load pipelines, driver |
//! | [`logging`] | (this crate) | subscriber setup |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod logging;

/// Core data types (`sluice-core`).
pub use sluice_core as types;

/// Worker-group communication (`sluice-comm`).
///
/// [`comm::ThreadGroup::run`] spawns one scoped thread per rank.
pub use sluice_comm as comm;

/// Step-stream container format (`sluice-stream`).
pub use sluice_stream as stream;

/// Step sources (`sluice-source`).
pub use sluice_source as source;

/// Reduction pipelines and the step driver (`sluice-engine`).
pub use sluice_engine as engine;

/// Common imports for typical Sluice usage.
pub mod prelude {
    // Core
    pub use sluice_core::{EntityBins, ParticleRecord, Species, StepId};

    // Communication
    pub use sluice_comm::{Communicator, SoloComm, ThreadComm, ThreadGroup};

    // Sources
    pub use sluice_source::{FileSource, MemoryStream, StepSource, StepStatus};

    // Engine
    pub use sluice_engine::{
        run, BroadcastSync, CoordinatorOnly, DiffusionConfig, DiffusionPipeline, DiffusionSink,
        DriverConfig, EngineError, EscapeSync, HeatloadConfig, HeatloadPhysics, HeatloadPipeline,
        RunSummary, SpeciesStep, StepMetrics, StepPipeline,
    };
}
