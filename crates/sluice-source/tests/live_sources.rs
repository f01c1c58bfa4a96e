//! Sources consumed while a producer is still writing.

use std::fs::File;
use std::time::Duration;

use sluice_core::Dtype;
use sluice_source::{FileSource, MemoryStream, SourceError, StepSource, StepStatus};
use sluice_stream::{StepFrame, StreamHeader, StreamWriter, VarDecl};

fn header() -> StreamHeader {
    StreamHeader::new("producer").with_var(VarDecl::new("table", Dtype::F64, &[]))
}

fn frame(step: u64) -> StepFrame {
    let mut f = StepFrame::new(step);
    f.push_block("table", &[1, 11], vec![step as f64; 11].into())
        .unwrap();
    f
}

/// Drain a source, retrying NotReady, and return the first column of
/// every step's first block.
fn drain<S: StepSource>(src: &mut S) -> Result<(Vec<f64>, u32), SourceError> {
    let mut firsts = Vec::new();
    let mut not_ready = 0;
    loop {
        match src.begin_step()? {
            StepStatus::Ready => {
                let info = src.blocks_info("table")?;
                let h = src.get::<f64>("table", info[0].block_id)?;
                src.perform_gets()?;
                firsts.push(src.take(h)?[0]);
                src.end_step()?;
            }
            StepStatus::NotReady => {
                not_ready += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            StepStatus::Ended => return Ok((firsts, not_ready)),
        }
    }
}

#[test]
fn file_source_follows_a_concurrent_writer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.slc");
    File::create(&path).unwrap();

    let mut src = FileSource::open(&path).unwrap();
    let writer_path = path.clone();
    let producer = std::thread::spawn(move || {
        let mut w = StreamWriter::new(File::create(writer_path).unwrap(), header()).unwrap();
        for step in 0..5 {
            w.write_step(&frame(step)).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        w.close().unwrap();
    });

    let (firsts, _) = drain(&mut src).unwrap();
    producer.join().unwrap();
    assert_eq!(firsts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(src.header().unwrap().name, "producer");
}

#[test]
fn memory_readers_on_many_threads_agree() {
    let stream = MemoryStream::new(header());
    let readers: Vec<_> = (0..3).map(|_| stream.reader(Some(Duration::from_millis(50)))).collect();

    let consumers: Vec<_> = readers
        .into_iter()
        .map(|mut r| std::thread::spawn(move || drain(&mut r).unwrap().0))
        .collect();

    for step in 0..4 {
        stream.publish(frame(step)).unwrap();
    }
    stream.close();

    for c in consumers {
        assert_eq!(c.join().unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
    }
}
