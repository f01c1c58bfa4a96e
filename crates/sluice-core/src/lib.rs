//! Core types for the sluice diagnostic reduction pipeline.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the data model shared by every other crate in the workspace: step
//! identifiers, typed element buffers, the block partitioner, per-entity
//! accumulation bins, particle records with their flag decoding, and the
//! input-consistency error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bins;
pub mod element;
pub mod error;
pub mod flags;
pub mod id;
pub mod particle;
pub mod partition;

pub use bins::{EntityBins, BIN_FIELD_COUNT, BIN_FIELD_NAMES, TABLE_COLUMNS};
pub use element::{Buffer, Dtype, Element};
pub use error::InputError;
pub use flags::ParticleFlags;
pub use id::{element_count, Shape, StepId};
pub use particle::{
    classify, Classified, ConfinedList, EscapedSet, ParticleColumns, ParticleRecord, Species,
    StepHistory, PHASE_WIDTH,
};
pub use partition::{split, split_slice, Partition};
