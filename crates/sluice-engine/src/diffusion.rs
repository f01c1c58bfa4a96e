//! Diffusion pipeline: per-entity bins summed to the coordinator.
//!
//! Each Ready step every worker resets its bins, takes its contiguous
//! share of the step's row-table blocks, optionally mirrors the raw tables
//! to a per-rank duplicate stream, folds every row into the bins, then
//! joins ten sum-reductions. The coordinator persists the result.

use std::io::Write;
use std::time::Instant;

use sluice_comm::Communicator;
use sluice_core::{split, Dtype, EntityBins, Shape, StepId, TABLE_COLUMNS};
use sluice_source::{StepSource, StepStatus};
use sluice_stream::{StepFrame, StreamError, StreamHeader, StreamWriter, VarDecl};

use crate::config::{ConfigError, DiffusionConfig};
use crate::driver::StepPipeline;
use crate::error::EngineError;
use crate::metrics::StepMetrics;
use crate::sink::DiffusionSink;

/// Variable name of mirrored tables in the duplicate stream.
pub const DUP_TABLE_VAR: &str = "table";

/// Per-rank duplicate stream of every row table the rank consumed.
///
/// One frame per Ready step, written before any of the step's tables is
/// accumulated; one block per consumed table, with the table's original
/// shape.
pub struct DupStream<W: Write> {
    writer: StreamWriter<W>,
}

impl<W: Write> DupStream<W> {
    /// Write the duplicate-stream header for `rank`.
    pub fn open(writer: W, rank: usize) -> Result<Self, EngineError> {
        let header = StreamHeader::new(format!("diffusion-dup-{rank}"))
            .with_var(VarDecl::new(DUP_TABLE_VAR, Dtype::F64, &[0, TABLE_COLUMNS]));
        Ok(Self {
            writer: StreamWriter::new(writer, header)?,
        })
    }

    /// Frames written so far.
    pub fn steps_written(&self) -> u64 {
        self.writer.frames_written()
    }

    fn write_tables(
        &mut self,
        step: StepId,
        tables: &[(Shape, Vec<f64>)],
    ) -> Result<(), StreamError> {
        let mut frame = StepFrame::new(step.0);
        for (shape, table) in tables {
            frame
                .push_block(DUP_TABLE_VAR, shape, table.clone().into())
                .map_err(|rejected| StreamError::Malformed {
                    detail: format!(
                        "'{DUP_TABLE_VAR}' cannot hold a {} block",
                        rejected.dtype()
                    ),
                })?;
        }
        self.writer.write_step(&frame)
    }
}

/// Outputs returned by [`DiffusionPipeline::into_outputs`].
pub struct DiffusionOutputs<W> {
    /// The coordinator's closed sink writer.
    pub sink: Option<W>,
    /// This rank's closed duplicate-stream writer.
    pub dup: Option<W>,
}

/// The diffusion reduction for one worker.
pub struct DiffusionPipeline<S, C, W: Write> {
    source: S,
    comm: C,
    config: DiffusionConfig,
    bins: EntityBins,
    sink: Option<DiffusionSink<W>>,
    dup: Option<DupStream<W>>,
    closed: DiffusionOutputs<W>,
    step: StepId,
    metrics: StepMetrics,
}

impl<S, C, W> DiffusionPipeline<S, C, W>
where
    S: StepSource,
    C: Communicator,
    W: Write,
{
    /// Assemble a worker's pipeline.
    ///
    /// The coordinator must be given the sink and no other rank may have
    /// one. `dup` is optional on every rank.
    pub fn new(
        source: S,
        comm: C,
        config: DiffusionConfig,
        sink: Option<DiffusionSink<W>>,
        dup: Option<DupStream<W>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if sink.is_some() != comm.is_coordinator() {
            return Err(ConfigError::SinkPlacement {
                rank: comm.rank(),
                has_sink: sink.is_some(),
            }
            .into());
        }
        if let Some(sink) = &sink {
            if sink.entity_count() != config.entity_count {
                return Err(ConfigError::SinkEntityMismatch {
                    sink: sink.entity_count(),
                    config: config.entity_count,
                }
                .into());
            }
        }
        Ok(Self {
            bins: EntityBins::new(config.entity_count),
            source,
            comm,
            config,
            sink,
            dup,
            closed: DiffusionOutputs {
                sink: None,
                dup: None,
            },
            step: StepId::default(),
            metrics: StepMetrics::default(),
        })
    }

    /// Bins after the most recent step. On the coordinator these are the
    /// global sums; elsewhere they are scratch left by the reduction.
    pub fn bins(&self) -> &EntityBins {
        &self.bins
    }

    /// The communicator this pipeline runs on.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Consume the pipeline and return any writers closed by
    /// [`finalize`](StepPipeline::finalize).
    pub fn into_outputs(self) -> DiffusionOutputs<W> {
        self.closed
    }

    /// Fetch this rank's share of the open step, mirror it to the
    /// duplicate stream, then fold it into the bins.
    fn accumulate(&mut self) -> Result<(), EngineError> {
        let var = self.config.table_var.as_str();
        let blocks = self.source.blocks_info(var)?;
        let part = split(blocks.len(), self.comm.size(), self.comm.rank());
        tracing::debug!(
            step = %self.step,
            rank = self.comm.rank(),
            offset = part.offset,
            nblock = part.count,
            "diffusion partition"
        );

        let mut tables = Vec::with_capacity(part.count);
        for block in &blocks[part.range()] {
            if block.element_count() == 0 {
                continue;
            }
            let handle = self.source.get::<f64>(var, block.block_id)?;
            let fetch = Instant::now();
            self.source.perform_gets()?;
            self.metrics.fetch_us += fetch.elapsed().as_micros() as u64;
            tables.push((block.shape.clone(), self.source.take(handle)?));
        }

        if let Some(dup) = self.dup.as_mut() {
            let t = Instant::now();
            dup.write_tables(self.step, &tables)?;
            self.metrics.dup_write_us = t.elapsed().as_micros() as u64;
        }

        for (_, table) in &tables {
            self.metrics.rows_read += self.bins.accumulate_table(table)?;
            self.metrics.blocks_read += 1;
        }
        Ok(())
    }
}

impl<S, C, W> StepPipeline for DiffusionPipeline<S, C, W>
where
    S: StepSource,
    C: Communicator,
    W: Write,
{
    fn step(&mut self) -> Result<StepStatus, EngineError> {
        let start = Instant::now();
        match self.source.begin_step()? {
            StepStatus::Ready => {}
            other => return Ok(other),
        }
        self.metrics = StepMetrics::default();
        self.bins.reset();

        self.accumulate()?;

        let t = Instant::now();
        for (_, field) in self.bins.fields_mut() {
            self.comm.reduce_sum(field)?;
        }
        self.metrics.collective_us = t.elapsed().as_micros() as u64;

        if let Some(sink) = self.sink.as_mut() {
            let t = Instant::now();
            sink.write_step(self.step, &self.bins)?;
            self.metrics.output_us = t.elapsed().as_micros() as u64;
        }

        self.source.end_step()?;
        self.metrics.total_us = start.elapsed().as_micros() as u64;
        tracing::info!(
            step = %self.step,
            rank = self.comm.rank(),
            blocks = self.metrics.blocks_read,
            rows = self.metrics.rows_read,
            total_us = self.metrics.total_us,
            "diffusion step complete"
        );
        self.step = self.step.next();
        Ok(StepStatus::Ready)
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        if let Some(sink) = self.sink.take() {
            self.closed.sink = Some(sink.close()?);
        }
        if let Some(dup) = self.dup.take() {
            self.closed.dup = Some(dup.writer.close()?);
        }
        Ok(())
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
    use sluice_comm::{SoloComm, ThreadGroup};
    use sluice_source::MemoryStream;
    use sluice_stream::StreamReader;

    fn input() -> MemoryStream {
        MemoryStream::new(
            StreamHeader::new("in").with_var(VarDecl::new("table", Dtype::F64, &[])),
        )
    }

    #[test]
    fn sink_must_live_on_the_coordinator() {
        let s = input();
        let err = DiffusionPipeline::<_, _, Vec<u8>>::new(
            s.reader(None),
            SoloComm,
            DiffusionConfig::default(),
            None,
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::SinkPlacement {
                rank: 0,
                has_sink: false
            })
        ));

        let out = ThreadGroup::run(2, |comm| {
            let sink = DiffusionSink::open(Vec::new(), 1).unwrap();
            DiffusionPipeline::new(
                s.reader(None),
                comm,
                DiffusionConfig::default(),
                Some(sink),
                None,
            )
            .is_ok()
        })
        .unwrap();
        assert_eq!(out, vec![true, false]);
    }

    #[test]
    fn sink_entity_count_must_match() {
        let s = input();
        let sink = DiffusionSink::open(Vec::new(), 7).unwrap();
        let err = DiffusionPipeline::new(
            s.reader(None),
            SoloComm,
            DiffusionConfig {
                entity_count: 8,
                ..Default::default()
            },
            Some(sink),
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::SinkEntityMismatch { sink: 7, config: 8 })
        ));
    }

    #[test]
    fn bad_entity_id_is_fatal_and_not_persisted() {
        let s = input();
        let mut frame = StepFrame::new(0);
        let mut row = vec![9.0];
        row.extend([1.0; 10]);
        frame.push_block("table", &[1, 11], row.into()).unwrap();
        s.publish(frame).unwrap();

        let sink = DiffusionSink::open(Vec::new(), 4).unwrap();
        let mut p = DiffusionPipeline::new(
            s.reader(None),
            SoloComm,
            DiffusionConfig {
                entity_count: 4,
                ..Default::default()
            },
            Some(sink),
            None,
        )
        .unwrap();
        assert!(matches!(p.step(), Err(EngineError::Input(_))));
        assert_eq!(p.current_step(), StepId(0));
        assert_eq!(p.sink.as_ref().unwrap().steps_written(), 0);
    }

    #[test]
    fn tables_are_mirrored_before_a_bad_row_aborts_the_step() {
        let s = input();
        let mut frame = StepFrame::new(0);
        let mut good = vec![1.0];
        good.extend([2.0; 10]);
        let mut bad = vec![9.0];
        bad.extend([3.0; 10]);
        frame.push_block("table", &[1, 11], good.clone().into()).unwrap();
        frame.push_block("table", &[1, 11], bad.clone().into()).unwrap();
        s.publish(frame).unwrap();

        let sink = DiffusionSink::open(Vec::new(), 2).unwrap();
        let dup = DupStream::open(Vec::new(), 0).unwrap();
        let mut p = DiffusionPipeline::new(
            s.reader(None),
            SoloComm,
            DiffusionConfig {
                entity_count: 2,
                ..Default::default()
            },
            Some(sink),
            Some(dup),
        )
        .unwrap();
        assert!(matches!(p.step(), Err(EngineError::Input(_))));
        assert_eq!(p.dup.as_ref().unwrap().steps_written(), 1);
        assert_eq!(p.sink.as_ref().unwrap().steps_written(), 0);

        p.finalize().unwrap();
        let bytes = p.into_outputs().dup.unwrap();
        let reader = StreamReader::open(bytes.as_slice()).unwrap();
        assert_eq!(
            reader.header().decl(DUP_TABLE_VAR).unwrap().shape.as_slice(),
            &[0, TABLE_COLUMNS]
        );
        let frames: Vec<StepFrame> = reader.frames().collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 1);
        let mirrored = frames[0].var(DUP_TABLE_VAR).unwrap();
        assert_eq!(mirrored.blocks.len(), 2);
        assert_eq!(mirrored.concat::<f64>().unwrap(), [good, bad].concat());
    }
}
