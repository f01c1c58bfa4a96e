//! Hand-checkable stream fixtures.

use sluice_core::{Dtype, ParticleRecord, Species, BIN_FIELD_COUNT, PHASE_WIDTH, TABLE_COLUMNS};
use sluice_stream::{StepFrame, StreamHeader, VarDecl};

/// Input header for the diffusion pipeline: one ragged `f64` variable
/// named `table`.
pub fn diffusion_header() -> StreamHeader {
    StreamHeader::new("diffusion-input").with_var(VarDecl::new("table", Dtype::F64, &[]))
}

/// One table row: entity id followed by the ten bin values.
pub fn row(entity: usize, values: [f64; BIN_FIELD_COUNT]) -> Vec<f64> {
    let mut r = Vec::with_capacity(TABLE_COLUMNS);
    r.push(entity as f64);
    r.extend_from_slice(&values);
    r
}

/// Concatenate rows into a flat table.
pub fn table(rows: &[Vec<f64>]) -> Vec<f64> {
    rows.concat()
}

/// A step with one `table` block per entry, each shaped `[rows, 11]`.
pub fn table_step(step: u64, tables: &[Vec<f64>]) -> StepFrame {
    let mut frame = StepFrame::new(step);
    for t in tables {
        let rows = t.len() / TABLE_COLUMNS;
        frame
            .push_block("table", &[rows, TABLE_COLUMNS], t.clone().into())
            .expect("table blocks are all f64");
    }
    frame
}

/// Input header for the heat-load pipeline: five ragged particle columns
/// per species.
pub fn heatload_header() -> StreamHeader {
    Species::ALL
        .iter()
        .fold(StreamHeader::new("heatload-input"), |h, s| {
            h.with_var(VarDecl::new(s.var("gid"), Dtype::I64, &[]))
                .with_var(VarDecl::new(s.var("flag"), Dtype::I32, &[]))
                .with_var(VarDecl::new(s.var("step"), Dtype::I32, &[]))
                .with_var(VarDecl::new(s.var("dw"), Dtype::F32, &[]))
                .with_var(VarDecl::new(s.var("phase"), Dtype::F32, &[]))
        })
}

/// A particle with a phase vector derived from its id.
pub fn record(gid: i64, flag: i32) -> ParticleRecord {
    let mut phase = [0.0f32; PHASE_WIDTH];
    for (k, p) in phase.iter_mut().enumerate() {
        *p = gid as f32 + k as f32 * 0.5;
    }
    ParticleRecord {
        gid,
        flag,
        esc_step: if flag & 1 == 1 { 7 } else { 0 },
        phase,
        dw: gid as f32 * 0.25,
    }
}

/// Append one block of `records` to each of the species' five columns.
pub fn particle_block(frame: &mut StepFrame, species: Species, records: &[ParticleRecord]) {
    let n = records.len();
    let gid: Vec<i64> = records.iter().map(|r| r.gid).collect();
    let flag: Vec<i32> = records.iter().map(|r| r.flag).collect();
    let step: Vec<i32> = records.iter().map(|r| r.esc_step).collect();
    let dw: Vec<f32> = records.iter().map(|r| r.dw).collect();
    let phase: Vec<f32> = records.iter().flat_map(|r| r.phase).collect();
    let pushes = [
        frame.push_block(&species.var("gid"), &[n], gid.into()),
        frame.push_block(&species.var("flag"), &[n], flag.into()),
        frame.push_block(&species.var("step"), &[n], step.into()),
        frame.push_block(&species.var("dw"), &[n], dw.into()),
        frame.push_block(&species.var("phase"), &[n, PHASE_WIDTH], phase.into()),
    ];
    for p in pushes {
        p.expect("particle columns keep their dtype");
    }
}

/// A step with a single block per species holding `(gid, flag)` records
/// built by [`record`]. Both species receive the same records.
pub fn particle_step(step: u64, records: &[(i64, i32)]) -> StepFrame {
    let recs: Vec<ParticleRecord> = records.iter().map(|&(g, f)| record(g, f)).collect();
    let mut frame = StepFrame::new(step);
    for s in Species::ALL {
        particle_block(&mut frame, s, &recs);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_step_shapes_blocks() {
        let t = table(&[row(0, [1.0; 10]), row(2, [2.0; 10])]);
        let frame = table_step(3, &[t.clone(), Vec::new()]);
        let var = frame.var("table").unwrap();
        assert_eq!(var.blocks.len(), 2);
        assert_eq!(var.blocks[0].shape.as_slice(), &[2, 11]);
        assert_eq!(var.blocks[1].shape.as_slice(), &[0, 11]);
        assert_eq!(var.concat::<f64>().unwrap(), t);
    }

    #[test]
    fn particle_step_fills_both_species() {
        let frame = particle_step(0, &[(1, 0), (2, 1)]);
        for s in Species::ALL {
            assert_eq!(frame.var(&s.var("gid")).unwrap().concat::<i64>().unwrap(), vec![1, 2]);
            let phase = frame.var(&s.var("phase")).unwrap().concat::<f32>().unwrap();
            assert_eq!(phase.len(), 2 * PHASE_WIDTH);
        }
    }
}
