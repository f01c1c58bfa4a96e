//! External collaborators of the heat-load pipeline.
//!
//! The pipeline's obligation ends at handing these traits correctly
//! shaped, fully synchronised inputs. What they compute is theirs.

use sluice_comm::Communicator;
use sluice_core::{EscapedSet, ParticleColumns, ParticleRecord, Species, StepHistory, StepId};

use crate::error::{CollaboratorError, EngineError};

// ── EscapeSync ─────────────────────────────────────────────────────

/// Produces the globally consistent escaped set for one species.
///
/// Collective: every rank calls `sync` once per species per step, in the
/// same order.
pub trait EscapeSync {
    /// `gathered` is the coordinator's classification of every worker's
    /// records; it is empty on other ranks. Returns the set this rank
    /// appends to its history.
    fn sync<C: Communicator>(
        &mut self,
        comm: &C,
        species: Species,
        gathered: EscapedSet,
    ) -> Result<EscapedSet, EngineError>;
}

/// Broadcast the coordinator's set so every rank holds the same history.
#[derive(Clone, Copy, Debug, Default)]
pub struct BroadcastSync;

impl EscapeSync for BroadcastSync {
    fn sync<C: Communicator>(
        &mut self,
        comm: &C,
        species: Species,
        gathered: EscapedSet,
    ) -> Result<EscapedSet, EngineError> {
        let cols = if comm.is_coordinator() {
            ParticleColumns::from_records(gathered.iter())
        } else {
            ParticleColumns::new()
        };
        let synced = ParticleColumns {
            gid: comm.broadcast(cols.gid)?,
            flag: comm.broadcast(cols.flag)?,
            step: comm.broadcast(cols.step)?,
            dw: comm.broadcast(cols.dw)?,
            phase: comm.broadcast(cols.phase)?,
        };
        let set: EscapedSet = synced.to_records()?.into_iter().collect();
        tracing::debug!(
            rank = comm.rank(),
            species = species.name(),
            escaped = set.len(),
            "escaped set synchronised"
        );
        Ok(set)
    }
}

/// Keep each rank's input unchanged: the coordinator holds the full set,
/// every other rank an empty one. No communication.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoordinatorOnly;

impl EscapeSync for CoordinatorOnly {
    fn sync<C: Communicator>(
        &mut self,
        _comm: &C,
        _species: Species,
        gathered: EscapedSet,
    ) -> Result<EscapedSet, EngineError> {
        Ok(gathered)
    }
}

// ── HeatloadPhysics ────────────────────────────────────────────────

/// One species' inputs to the physics collaborator for one step.
#[derive(Clone, Copy, Debug)]
pub struct SpeciesStep<'a> {
    /// Species these inputs belong to.
    pub species: Species,
    /// This worker's confined records for the step.
    pub confined: &'a [ParticleRecord],
    /// Every synchronised escaped set so far, including this step's.
    pub history: &'a StepHistory,
}

/// Heat-load computation and output, invoked once per completed step on
/// every rank.
pub trait HeatloadPhysics {
    /// Consume one step's inputs, one entry per configured species in
    /// configuration order.
    fn deposit(&mut self, step: StepId, inputs: &[SpeciesStep<'_>])
        -> Result<(), CollaboratorError>;

    /// Called once after the stream ends.
    fn finalize(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

impl<P: HeatloadPhysics + ?Sized> HeatloadPhysics for Box<P> {
    fn deposit(
        &mut self,
        step: StepId,
        inputs: &[SpeciesStep<'_>],
    ) -> Result<(), CollaboratorError> {
        (**self).deposit(step, inputs)
    }

    fn finalize(&mut self) -> Result<(), CollaboratorError> {
        (**self).finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_comm::{SoloComm, ThreadGroup};
    use sluice_core::PHASE_WIDTH;

    fn escaped(gid: i64) -> ParticleRecord {
        ParticleRecord {
            gid,
            flag: 1,
            esc_step: 3,
            phase: [gid as f32; PHASE_WIDTH],
            dw: 0.5,
        }
    }

    #[test]
    fn broadcast_gives_every_rank_the_coordinator_set() {
        let out = ThreadGroup::run(3, |comm| {
            let gathered: EscapedSet = if comm.is_coordinator() {
                [escaped(4), escaped(9)].into_iter().collect()
            } else {
                EscapedSet::new()
            };
            BroadcastSync
                .sync(&comm, Species::Ion, gathered)
                .unwrap()
        })
        .unwrap();
        for set in &out {
            assert_eq!(set.len(), 2);
            assert_eq!(set.get(9), Some(&escaped(9)));
        }
        assert_eq!(out[0], out[2]);
    }

    #[test]
    fn coordinator_only_passes_through() {
        let set: EscapedSet = [escaped(1)].into_iter().collect();
        let out = CoordinatorOnly
            .sync(&SoloComm, Species::Electron, set.clone())
            .unwrap();
        assert_eq!(out, set);
    }
}
