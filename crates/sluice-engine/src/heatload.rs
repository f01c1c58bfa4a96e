//! Heat-load pipeline: particle classification and escape bookkeeping.
//!
//! Per step and per configured species, every worker reads its share of
//! the particle blocks and classifies them locally. The records are then
//! gathered to the coordinator in two phases, the coordinator classifies
//! the gathered set, and the [`EscapeSync`] collaborator decides what
//! each rank appends to its history. Finally [`HeatloadPhysics`] gets one
//! call with every species' inputs.

use std::time::Instant;

use indexmap::IndexMap;
use sluice_comm::{Communicator, GatherLayout};
use sluice_core::{
    split, ConfinedList, EscapedSet, InputError, ParticleColumns, Species, StepHistory, StepId,
    PHASE_WIDTH,
};
use sluice_source::{StepSource, StepStatus};

use crate::collab::{BroadcastSync, EscapeSync, HeatloadPhysics, SpeciesStep};
use crate::config::HeatloadConfig;
use crate::driver::StepPipeline;
use crate::error::EngineError;
use crate::metrics::StepMetrics;

/// The heat-load consolidation for one worker.
pub struct HeatloadPipeline<S, C, P, E = BroadcastSync> {
    source: S,
    comm: C,
    physics: P,
    sync: E,
    histories: IndexMap<Species, StepHistory>,
    step: StepId,
    metrics: StepMetrics,
    finalized: bool,
}

impl<S, C, P, E> HeatloadPipeline<S, C, P, E>
where
    S: StepSource,
    C: Communicator,
    P: HeatloadPhysics,
    E: EscapeSync,
{
    /// Assemble a worker's pipeline. Species are processed in the order
    /// the config lists them.
    pub fn new(
        source: S,
        comm: C,
        config: HeatloadConfig,
        physics: P,
        sync: E,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let histories = config
            .species
            .iter()
            .map(|s| (*s, StepHistory::new()))
            .collect();
        Ok(Self {
            source,
            comm,
            physics,
            sync,
            histories,
            step: StepId::default(),
            metrics: StepMetrics::default(),
            finalized: false,
        })
    }

    /// Synchronised escape history of `species`, if configured.
    pub fn history(&self, species: Species) -> Option<&StepHistory> {
        self.histories.get(&species)
    }

    /// The physics collaborator.
    pub fn physics(&self) -> &P {
        &self.physics
    }

    /// Consume the pipeline, returning the physics collaborator.
    pub fn into_physics(self) -> P {
        self.physics
    }

    /// Fetch this rank's share of one species' particle columns.
    fn read_local(&mut self, species: Species) -> Result<ParticleColumns, EngineError> {
        let gid_var = species.var("gid");
        let flag_var = species.var("flag");
        let step_var = species.var("step");
        let dw_var = species.var("dw");
        let phase_var = species.var("phase");

        let blocks = self.source.blocks_info(&gid_var)?;
        let mut others = Vec::with_capacity(4);
        for var in [&flag_var, &step_var, &dw_var, &phase_var] {
            let info = self.source.blocks_info(var)?;
            if info.len() != blocks.len() {
                return Err(InputError::BlockCountMismatch {
                    var: var.clone(),
                    expected: blocks.len(),
                    found: info.len(),
                }
                .into());
            }
            others.push(info);
        }
        let part = split(blocks.len(), self.comm.size(), self.comm.rank());
        tracing::debug!(
            step = %self.step,
            rank = self.comm.rank(),
            species = species.name(),
            offset = part.offset,
            nblock = part.count,
            "heatload partition"
        );

        let mut cols = ParticleColumns::new();
        for k in part.range() {
            let block = &blocks[k];
            let all_empty = block.element_count() == 0
                && others.iter().all(|info| info[k].element_count() == 0);
            if all_empty {
                continue;
            }
            let id = block.block_id;
            let gid = self.source.get::<i64>(&gid_var, id)?;
            let flag = self.source.get::<i32>(&flag_var, id)?;
            let step = self.source.get::<i32>(&step_var, id)?;
            let dw = self.source.get::<f32>(&dw_var, id)?;
            let phase = self.source.get::<f32>(&phase_var, id)?;

            let t = Instant::now();
            self.source.perform_gets()?;
            self.metrics.fetch_us += t.elapsed().as_micros() as u64;

            let fetched = ParticleColumns {
                gid: self.source.take(gid)?,
                flag: self.source.take(flag)?,
                step: self.source.take(step)?,
                dw: self.source.take(dw)?,
                phase: self.source.take(phase)?,
            };
            fetched.check_aligned()?;
            cols.extend_from(fetched);
            self.metrics.blocks_read += 1;
        }
        Ok(cols)
    }

    /// Two-phase gather of every rank's columns to the coordinator.
    fn gather(&self, local: &ParticleColumns) -> Result<Option<ParticleColumns>, EngineError> {
        let layout = GatherLayout::exchange(&self.comm, local.len())?;
        let gid = layout.gather(&self.comm, &local.gid, 1)?;
        let flag = layout.gather(&self.comm, &local.flag, 1)?;
        let step = layout.gather(&self.comm, &local.step, 1)?;
        let dw = layout.gather(&self.comm, &local.dw, 1)?;
        let phase = layout.gather(&self.comm, &local.phase, PHASE_WIDTH)?;
        Ok(match (gid, flag, step, dw, phase) {
            (Some(gid), Some(flag), Some(step), Some(dw), Some(phase)) => Some(ParticleColumns {
                gid,
                flag,
                step,
                dw,
                phase,
            }),
            _ => None,
        })
    }

    /// Process one species of the open step; returns the local confined
    /// records.
    fn process_species(&mut self, species: Species) -> Result<ConfinedList, EngineError> {
        let local = self.read_local(species)?;
        let local_class = local.classify()?;
        self.metrics.rows_read += local.len();

        let t = Instant::now();
        let gathered = match self.gather(&local)? {
            Some(all) => all.classify()?.escaped,
            None => EscapedSet::new(),
        };
        let synced = self.sync.sync(&self.comm, species, gathered)?;
        self.metrics.collective_us += t.elapsed().as_micros() as u64;
        self.metrics.escaped += synced.len();

        tracing::debug!(
            step = %self.step,
            rank = self.comm.rank(),
            species = species.name(),
            local = local.len(),
            confined = local_class.confined.len(),
            escaped = synced.len(),
            "species consolidated"
        );
        if let Some(history) = self.histories.get_mut(&species) {
            history.push(synced);
        }
        Ok(local_class.confined)
    }
}

impl<S, C, P, E> StepPipeline for HeatloadPipeline<S, C, P, E>
where
    S: StepSource,
    C: Communicator,
    P: HeatloadPhysics,
    E: EscapeSync,
{
    fn step(&mut self) -> Result<StepStatus, EngineError> {
        let start = Instant::now();
        match self.source.begin_step()? {
            StepStatus::Ready => {}
            other => return Ok(other),
        }
        self.metrics = StepMetrics::default();

        let species: Vec<Species> = self.histories.keys().copied().collect();
        let mut confined = Vec::with_capacity(species.len());
        for s in &species {
            confined.push(self.process_species(*s)?);
        }

        let t = Instant::now();
        let inputs: Vec<SpeciesStep<'_>> = species
            .iter()
            .zip(&confined)
            .filter_map(|(s, c)| {
                self.histories.get(s).map(|history| SpeciesStep {
                    species: *s,
                    confined: c,
                    history,
                })
            })
            .collect();
        self.physics
            .deposit(self.step, &inputs)
            .map_err(|error| EngineError::Collaborator {
                stage: "physics",
                error,
            })?;
        self.metrics.output_us = t.elapsed().as_micros() as u64;

        self.source.end_step()?;
        self.metrics.total_us = start.elapsed().as_micros() as u64;
        tracing::info!(
            step = %self.step,
            rank = self.comm.rank(),
            records = self.metrics.rows_read,
            escaped = self.metrics.escaped,
            total_us = self.metrics.total_us,
            "heatload step complete"
        );
        self.step = self.step.next();
        Ok(StepStatus::Ready)
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        self.physics
            .finalize()
            .map_err(|error| EngineError::Collaborator {
                stage: "physics",
                error,
            })
    }

    fn current_step(&self) -> StepId {
        self.step
    }

    fn last_metrics(&self) -> &StepMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CoordinatorOnly;
    use crate::error::CollaboratorError;
    use sluice_comm::SoloComm;
    use sluice_source::{MemoryReader, MemoryStream};
    use sluice_stream::StepFrame;
    use sluice_test_utils::{heatload_header, particle_step};

    /// Species order of every deposit call.
    #[derive(Default)]
    struct RecordingPhysics {
        calls: Vec<Vec<Species>>,
    }

    impl HeatloadPhysics for RecordingPhysics {
        fn deposit(
            &mut self,
            _: StepId,
            inputs: &[SpeciesStep<'_>],
        ) -> Result<(), CollaboratorError> {
            self.calls.push(inputs.iter().map(|i| i.species).collect());
            Ok(())
        }
    }

    struct Failing;

    impl HeatloadPhysics for Failing {
        fn deposit(&mut self, _: StepId, _: &[SpeciesStep<'_>]) -> Result<(), CollaboratorError> {
            Err("out of disk".into())
        }
    }

    #[test]
    fn physics_sees_species_in_config_order() {
        let stream = MemoryStream::new(heatload_header());
        stream.publish(particle_step(0, &[(1, 0), (2, 1)])).unwrap();
        stream.close();

        let mut p = HeatloadPipeline::new(
            stream.reader(None),
            SoloComm,
            HeatloadConfig {
                species: vec![Species::Electron, Species::Ion],
            },
            RecordingPhysics::default(),
            CoordinatorOnly,
        )
        .unwrap();
        assert_eq!(p.step().unwrap(), StepStatus::Ready);
        let calls = &p.physics().calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![Species::Electron, Species::Ion]);
        assert_eq!(p.history(Species::Ion).unwrap().len(), 1);
    }

    #[test]
    fn misaligned_columns_are_fatal() {
        let stream = MemoryStream::new(heatload_header());
        let mut frame = StepFrame::new(0);
        frame.push_block("igid", &[2], vec![1i64, 2].into()).unwrap();
        frame.push_block("iflag", &[2], vec![0i32, 0].into()).unwrap();
        frame.push_block("istep", &[2], vec![0i32, 0].into()).unwrap();
        frame.push_block("idw", &[1], vec![0.0f32].into()).unwrap();
        frame
            .push_block("iphase", &[2, PHASE_WIDTH], vec![0.0f32; 2 * PHASE_WIDTH].into())
            .unwrap();
        stream.publish(frame).unwrap();

        let mut p = HeatloadPipeline::new(
            stream.reader(None),
            SoloComm,
            HeatloadConfig {
                species: vec![Species::Ion],
            },
            RecordingPhysics::default(),
            CoordinatorOnly,
        )
        .unwrap();
        assert!(matches!(
            p.step(),
            Err(EngineError::Input(InputError::MisalignedColumns {
                column: "dw",
                expected: 2,
                found: 1
            }))
        ));
        assert!(p.physics().calls.is_empty());
    }

    type IonPipeline = HeatloadPipeline<MemoryReader, SoloComm, RecordingPhysics, CoordinatorOnly>;

    fn misaligned_pipeline(frame: StepFrame) -> IonPipeline {
        let stream = MemoryStream::new(heatload_header());
        stream.publish(frame).unwrap();
        HeatloadPipeline::new(
            stream.reader(None),
            SoloComm,
            HeatloadConfig {
                species: vec![Species::Ion],
            },
            RecordingPhysics::default(),
            CoordinatorOnly,
        )
        .unwrap()
    }

    fn ion_block(frame: &mut StepFrame, gid: &[i64], dw: &[f32]) {
        let n = gid.len();
        frame.push_block("igid", &[n], gid.to_vec().into()).unwrap();
        frame.push_block("iflag", &[n], vec![0i32; n].into()).unwrap();
        frame.push_block("istep", &[n], vec![0i32; n].into()).unwrap();
        frame.push_block("idw", &[dw.len()], dw.to_vec().into()).unwrap();
        frame
            .push_block("iphase", &[n, PHASE_WIDTH], vec![0.0f32; n * PHASE_WIDTH].into())
            .unwrap();
    }

    #[test]
    fn short_block_is_not_rescued_by_a_long_one() {
        let mut frame = StepFrame::new(0);
        ion_block(&mut frame, &[1, 2], &[10.0]);
        ion_block(&mut frame, &[3], &[20.0, 30.0]);
        let mut p = misaligned_pipeline(frame);
        assert!(matches!(
            p.step(),
            Err(EngineError::Input(InputError::MisalignedColumns {
                column: "dw",
                expected: 2,
                found: 1
            }))
        ));
        assert!(p.physics().calls.is_empty());
        assert!(p.history(Species::Ion).unwrap().is_empty());
    }

    #[test]
    fn empty_identity_block_with_data_is_misaligned() {
        let mut frame = StepFrame::new(0);
        ion_block(&mut frame, &[1], &[10.0]);
        ion_block(&mut frame, &[], &[20.0]);
        let mut p = misaligned_pipeline(frame);
        assert!(matches!(
            p.step(),
            Err(EngineError::Input(InputError::MisalignedColumns {
                column: "dw",
                expected: 0,
                found: 1
            }))
        ));
    }

    #[test]
    fn block_counts_must_agree_across_columns() {
        let stream = MemoryStream::new(heatload_header());
        let mut frame = particle_step(0, &[(1, 0)]);
        frame.push_block("iflag", &[1], vec![0i32].into()).unwrap();
        stream.publish(frame).unwrap();

        let mut p = HeatloadPipeline::new(
            stream.reader(None),
            SoloComm,
            HeatloadConfig::default(),
            RecordingPhysics::default(),
            CoordinatorOnly,
        )
        .unwrap();
        match p.step() {
            Err(EngineError::Input(InputError::BlockCountMismatch {
                var,
                expected,
                found,
            })) => {
                assert_eq!(var, "iflag");
                assert_eq!((expected, found), (1, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn physics_failure_names_the_stage() {
        let stream = MemoryStream::new(heatload_header());
        stream.publish(particle_step(0, &[])).unwrap();
        let mut p = HeatloadPipeline::new(
            stream.reader(None),
            SoloComm,
            HeatloadConfig::default(),
            Failing,
            BroadcastSync,
        )
        .unwrap();
        match p.step() {
            Err(EngineError::Collaborator { stage, error }) => {
                assert_eq!(stage, "physics");
                assert_eq!(error.to_string(), "out of disk");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(p.current_step(), StepId(0));
    }
}
