//! Pipeline and driver configuration, validation, and error types.
//!
//! Each config struct has a [`Default`] and a `validate()` that checks
//! structural invariants up front, before any collective is entered.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use sluice_core::Species;

// ── DriverConfig ───────────────────────────────────────────────────

/// Retry policy for the step loop in [`run`](crate::run).
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Sleep between `NotReady` retries. Default: 10 ms.
    pub retry_backoff: Duration,
    /// Give up after this many consecutive `NotReady` results.
    /// `None` retries forever. Default: `None`.
    pub max_consecutive_not_ready: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(10),
            max_consecutive_not_ready: None,
        }
    }
}

impl DriverConfig {
    /// Validate the retry policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_consecutive_not_ready == Some(0) {
            return Err(ConfigError::ZeroRetryLimit);
        }
        Ok(())
    }
}

// ── DiffusionConfig ────────────────────────────────────────────────

/// Configuration for the diffusion pipeline.
#[derive(Clone, Debug)]
pub struct DiffusionConfig {
    /// Number of entity bins (mesh triangles). Must be at least 1.
    pub entity_count: usize,
    /// Name of the row-table variable in the input stream.
    /// Default: `"table"`.
    pub table_var: String,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            entity_count: 1,
            table_var: "table".to_string(),
        }
    }
}

impl DiffusionConfig {
    /// Validate bin count and variable name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_count == 0 {
            return Err(ConfigError::ZeroEntities);
        }
        // Entity ids travel as f64 in the row tables; keep them well inside
        // the exactly-representable integer range.
        if u32::try_from(self.entity_count).is_err() {
            return Err(ConfigError::EntityCountOverflow {
                value: self.entity_count,
            });
        }
        if self.table_var.is_empty() {
            return Err(ConfigError::EmptyVariableName);
        }
        Ok(())
    }
}

// ── HeatloadConfig ─────────────────────────────────────────────────

/// Configuration for the heat-load pipeline.
#[derive(Clone, Debug)]
pub struct HeatloadConfig {
    /// Species processed each step, in order. Default: ions then electrons.
    pub species: Vec<Species>,
}

impl Default for HeatloadConfig {
    fn default() -> Self {
        Self {
            species: Species::ALL.to_vec(),
        }
    }
}

impl HeatloadConfig {
    /// Validate the species list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.species.is_empty() {
            return Err(ConfigError::NoSpecies);
        }
        for (i, s) in self.species.iter().enumerate() {
            if self.species[..i].contains(s) {
                return Err(ConfigError::DuplicateSpecies { species: *s });
            }
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating a configuration or assembling a
/// pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `entity_count` is zero.
    ZeroEntities,
    /// `entity_count` exceeds `u32::MAX`.
    EntityCountOverflow {
        /// The configured value.
        value: usize,
    },
    /// A variable name is empty.
    EmptyVariableName,
    /// The species list is empty.
    NoSpecies,
    /// A species is listed twice.
    DuplicateSpecies {
        /// The repeated species.
        species: Species,
    },
    /// `max_consecutive_not_ready` is `Some(0)`.
    ZeroRetryLimit,
    /// The output sink is missing on the coordinator or present elsewhere.
    SinkPlacement {
        /// Rank of the offending worker.
        rank: usize,
        /// Whether that worker was given a sink.
        has_sink: bool,
    },
    /// The sink was opened for a different number of entities.
    SinkEntityMismatch {
        /// Entities declared by the sink.
        sink: usize,
        /// Entities in the pipeline config.
        config: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroEntities => write!(f, "entity_count must be at least 1"),
            Self::EntityCountOverflow { value } => {
                write!(f, "entity_count {value} exceeds u32::MAX")
            }
            Self::EmptyVariableName => write!(f, "variable name is empty"),
            Self::NoSpecies => write!(f, "no species configured"),
            Self::DuplicateSpecies { species } => {
                write!(f, "species {} listed more than once", species.name())
            }
            Self::ZeroRetryLimit => {
                write!(f, "max_consecutive_not_ready must be at least 1 when set")
            }
            Self::SinkPlacement { rank, has_sink } => {
                if *has_sink {
                    write!(f, "rank {rank} is not the coordinator but was given a sink")
                } else {
                    write!(f, "coordinator rank {rank} has no output sink")
                }
            }
            Self::SinkEntityMismatch { sink, config } => write!(
                f,
                "sink declares {sink} entities but the pipeline bins {config}"
            ),
        }
    }
}

impl Error for ConfigError {}
