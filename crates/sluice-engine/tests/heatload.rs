//! Heat-load runs: gather layout, classification, and history sync.

use std::cell::Cell;

use sluice_comm::{CommError, Communicator, SoloComm, ThreadGroup};
use sluice_core::{Element, InputError, ParticleRecord, Species, StepId, PHASE_WIDTH};
use sluice_engine::{
    run, BroadcastSync, CollaboratorError, CoordinatorOnly, DriverConfig, EngineError,
    HeatloadConfig, HeatloadPhysics, HeatloadPipeline, SpeciesStep, StepPipeline,
};
use sluice_source::{MemoryStream, StepStatus};
use sluice_stream::StepFrame;
use sluice_test_utils::{heatload_header, particle_block, particle_step, record, RandomStream};

/// What the physics collaborator saw for one species in one step.
#[derive(Clone, Debug, PartialEq)]
struct Seen {
    step: StepId,
    species: Species,
    confined: Vec<i64>,
    history_len: usize,
    latest_escaped: Vec<i64>,
}

#[derive(Default)]
struct RecordingPhysics {
    seen: Vec<Seen>,
    finalized: u32,
}

impl HeatloadPhysics for RecordingPhysics {
    fn deposit(&mut self, step: StepId, inputs: &[SpeciesStep<'_>]) -> Result<(), CollaboratorError> {
        for input in inputs {
            self.seen.push(Seen {
                step,
                species: input.species,
                confined: input.confined.iter().map(|r| r.gid).collect(),
                history_len: input.history.len(),
                latest_escaped: input
                    .history
                    .latest()
                    .map(|set| set.iter().map(|r| r.gid).collect())
                    .unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), CollaboratorError> {
        self.finalized += 1;
        Ok(())
    }
}

/// Counts collective calls made through it.
struct Counting {
    inner: SoloComm,
    calls: Cell<usize>,
}

impl Counting {
    fn new() -> Self {
        Self {
            inner: SoloComm,
            calls: Cell::new(0),
        }
    }

    fn bump(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl Communicator for Counting {
    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn reduce_sum(&self, buf: &mut [f64]) -> Result<(), CommError> {
        self.bump();
        self.inner.reduce_sum(buf)
    }

    fn all_gather<T: Element>(&self, value: T) -> Result<Vec<T>, CommError> {
        self.bump();
        self.inner.all_gather(value)
    }

    fn gather_varcount<T: Element>(
        &self,
        local: &[T],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<Option<Vec<T>>, CommError> {
        self.bump();
        self.inner.gather_varcount(local, counts, displs)
    }

    fn broadcast<T: Element>(&self, data: Vec<T>) -> Result<Vec<T>, CommError> {
        self.bump();
        self.inner.broadcast(data)
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.bump();
        self.inner.barrier()
    }
}

fn ions() -> HeatloadConfig {
    HeatloadConfig {
        species: vec![Species::Ion],
    }
}

fn escaped_run(first: i64, n: usize) -> Vec<ParticleRecord> {
    (0..n as i64).map(|k| record(first + k, 1)).collect()
}

#[test]
fn gather_of_uneven_counts_groups_by_rank() {
    let stream = MemoryStream::new(heatload_header());
    let mut frame = StepFrame::new(0);
    particle_block(&mut frame, Species::Ion, &[]);
    particle_block(&mut frame, Species::Ion, &escaped_run(10, 3));
    particle_block(&mut frame, Species::Ion, &escaped_run(20, 5));
    stream.publish(frame).unwrap();
    stream.close();

    let expected: Vec<i64> = vec![10, 11, 12, 20, 21, 22, 23, 24];
    let out = ThreadGroup::run(3, |comm| {
        let mut p = HeatloadPipeline::new(
            stream.reader(None),
            comm,
            ions(),
            RecordingPhysics::default(),
            CoordinatorOnly,
        )
        .unwrap();
        assert_eq!(p.step().unwrap(), StepStatus::Ready);
        let latest: Vec<ParticleRecord> = p
            .history(Species::Ion)
            .unwrap()
            .latest()
            .unwrap()
            .iter()
            .copied()
            .collect();
        (p.last_metrics().rows_read, latest)
    })
    .unwrap();

    assert_eq!(out[0].0, 0);
    assert_eq!(out[1].0, 3);
    assert_eq!(out[2].0, 5);
    let gids: Vec<i64> = out[0].1.iter().map(|r| r.gid).collect();
    assert_eq!(gids, expected);
    assert_eq!(out[0].1[4], record(21, 1));
    assert!(out[1].1.is_empty());
    assert!(out[2].1.is_empty());
}

#[test]
fn broadcast_sync_gives_every_rank_the_same_history() {
    let stream = MemoryStream::new(heatload_header());
    let mut gen = RandomStream::new(3);
    for step in 0..3u64 {
        let mut frame = StepFrame::new(step);
        for s in Species::ALL {
            for b in 0..4i64 {
                let first = (step as i64 * 1000) + b * 100;
                particle_block(&mut frame, s, &gen.records(first, 12, 0.3));
            }
        }
        stream.publish(frame).unwrap();
    }
    stream.close();

    let out = ThreadGroup::run(3, |comm| {
        let mut p = HeatloadPipeline::new(
            stream.reader(None),
            comm,
            HeatloadConfig::default(),
            RecordingPhysics::default(),
            BroadcastSync,
        )
        .unwrap();
        let summary = run(&mut p, &DriverConfig::default()).unwrap();
        let histories: Vec<_> = Species::ALL
            .iter()
            .map(|s| p.history(*s).unwrap().clone())
            .collect();
        (summary.steps_completed, histories, p.into_physics())
    })
    .unwrap();

    for (steps, histories, physics) in &out {
        assert_eq!(*steps, 3);
        assert_eq!(histories, &out[0].1);
        assert_eq!(physics.finalized, 1);
        assert_eq!(physics.seen.len(), 3 * Species::ALL.len());
    }
    let ion = &out[0].1[0];
    assert_eq!(ion.len(), 3);
    assert!(ion.total_records() > 0);

    // Confined records are local: together the ranks see each exactly once.
    let mut confined: Vec<i64> = out
        .iter()
        .flat_map(|(_, _, physics)| physics.seen.iter())
        .filter(|s| s.species == Species::Ion && s.step == StepId(0))
        .flat_map(|s| s.confined.iter().copied())
        .collect();
    confined.sort_unstable();
    let escaped = ion.iter().next().unwrap().len();
    assert_eq!(confined.len() + escaped, 4 * 12);
    confined.dedup();
    assert_eq!(confined.len() + escaped, 4 * 12);
}

#[test]
fn classification_splits_escaped_and_confined() {
    let stream = MemoryStream::new(heatload_header());
    // Odd ids carry the escape bit; other flag bits must not matter.
    let records: Vec<(i64, i32)> = (0..10)
        .map(|g| {
            let escaped = matches!(g, 1 | 3 | 5 | 7);
            (g, i32::from(escaped) | 0b1_0110)
        })
        .collect();
    stream.publish(particle_step(0, &records)).unwrap();
    stream.close();

    let mut p = HeatloadPipeline::new(
        stream.reader(None),
        SoloComm,
        HeatloadConfig::default(),
        RecordingPhysics::default(),
        BroadcastSync,
    )
    .unwrap();
    run(&mut p, &DriverConfig::default()).unwrap();

    let physics = p.into_physics();
    assert_eq!(physics.seen.len(), 2);
    for seen in &physics.seen {
        assert_eq!(seen.confined, vec![0, 2, 4, 6, 8, 9]);
        assert_eq!(seen.latest_escaped, vec![1, 3, 5, 7]);
        assert_eq!(seen.history_len, 1);
    }
}

#[test]
fn history_grows_and_keeps_first_seen_record() {
    let stream = MemoryStream::new(heatload_header());
    let mut frame = StepFrame::new(0);
    let first = record(5, 1);
    let mut dup = record(5, 1);
    dup.dw = 99.0;
    particle_block(&mut frame, Species::Ion, &[first, dup]);
    stream.publish(frame).unwrap();
    stream.publish(particle_step(1, &[(6, 1)])).unwrap();

    let mut p = HeatloadPipeline::new(
        stream.reader(None),
        SoloComm,
        ions(),
        RecordingPhysics::default(),
        BroadcastSync,
    )
    .unwrap();
    assert_eq!(p.step().unwrap(), StepStatus::Ready);
    assert_eq!(p.step().unwrap(), StepStatus::Ready);
    assert_eq!(p.step().unwrap(), StepStatus::NotReady);

    let history = p.history(Species::Ion).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.total_records(), 2);
    let step0 = history.iter().next().unwrap();
    assert_eq!(step0.get(5), Some(&first));
    assert!(p.history(Species::Electron).is_none());
    assert_eq!(p.current_step(), StepId(2));
}

#[test]
fn not_ready_step_touches_nothing() {
    let stream = MemoryStream::new(heatload_header());
    stream
        .publish(particle_step(0, &[(1, 0), (2, 1), (3, 1)]))
        .unwrap();

    let comm = Counting::new();
    let mut p = HeatloadPipeline::new(
        stream.reader(None),
        &comm,
        HeatloadConfig::default(),
        RecordingPhysics::default(),
        BroadcastSync,
    )
    .unwrap();
    assert_eq!(p.step().unwrap(), StepStatus::Ready);
    let calls = comm.calls.get();
    assert!(calls > 0);
    let histories: Vec<_> = Species::ALL
        .iter()
        .map(|s| p.history(*s).unwrap().clone())
        .collect();
    let metrics = p.last_metrics().clone();

    for _ in 0..3 {
        assert_eq!(p.step().unwrap(), StepStatus::NotReady);
    }
    assert_eq!(comm.calls.get(), calls);
    for (s, h) in Species::ALL.iter().zip(&histories) {
        assert_eq!(p.history(*s).unwrap(), h);
    }
    assert_eq!(p.last_metrics(), &metrics);
    assert_eq!(p.physics().seen.len(), Species::ALL.len());
    assert_eq!(p.current_step(), StepId(1));
}

#[test]
fn compensating_block_lengths_abort_the_run() {
    let mut frame = StepFrame::new(0);
    for (gid, dw) in [(vec![1i64, 2], vec![10.0f32]), (vec![3], vec![20.0, 30.0])] {
        let n = gid.len();
        frame.push_block("igid", &[n], gid.into()).unwrap();
        frame.push_block("iflag", &[n], vec![0i32; n].into()).unwrap();
        frame.push_block("istep", &[n], vec![0i32; n].into()).unwrap();
        frame.push_block("idw", &[dw.len()], dw.into()).unwrap();
        frame
            .push_block("iphase", &[n, PHASE_WIDTH], vec![0.0f32; n * PHASE_WIDTH].into())
            .unwrap();
    }
    let stream = MemoryStream::new(heatload_header());
    stream.publish(frame).unwrap();
    stream.close();

    let mut p = HeatloadPipeline::new(
        stream.reader(None),
        SoloComm,
        ions(),
        RecordingPhysics::default(),
        CoordinatorOnly,
    )
    .unwrap();
    let err = run(&mut p, &DriverConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Input(InputError::MisalignedColumns { column: "dw", .. })
    ));
    assert!(p.physics().seen.is_empty());
    assert_eq!(p.physics().finalized, 0);
}
