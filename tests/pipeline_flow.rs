//! Record-stream shape on the way through a pipeline.
//!
//! Covers the guarantees downstream stages rely on: every stream is
//! bracketed by its header and trailer, streams from different files never
//! interleave, batches respect the configured size ceiling, and records a
//! stage flushes or flags still reach the right output file.

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use cdrflow::ber::{Length, Tag, TagClass};
use cdrflow::config::PipelineConfig;
use cdrflow::input::{passthrough_transform, TlvRecordParser, TransactionalInputAdapter};
use cdrflow::output::{single_line_expansion, TransactionalOutputAdapter};
use cdrflow::pipeline::{
    DataRecord, Pipeline, RecordError, Stage, StageChain, StreamMarker,
};
use cdrflow::txn::TransactionManager;

fn pipeline_config(root: &Path) -> PipelineConfig {
    let sub = |name: &str| {
        let path = root.join(name);
        fs::create_dir_all(&path).unwrap();
        path.display().to_string()
    };
    PipelineConfig {
        input_file_path: sub("in"),
        done_file_path: sub("done"),
        err_file_path: sub("err"),
        output_file_path: sub("out"),
        input_file_prefix: "CDR_".to_string(),
        input_file_suffix: ".dat".to_string(),
        done_file_prefix: "CDR_".to_string(),
        done_file_suffix: ".done".to_string(),
        err_file_prefix: "CDR_".to_string(),
        err_file_suffix: ".err".to_string(),
        output_file_prefix: "OUT_".to_string(),
        output_file_suffix: ".txt".to_string(),
        ..PipelineConfig::default()
    }
}

fn build_pipeline(
    config: &PipelineConfig,
    stages: StageChain,
    batch_size: usize,
) -> Pipeline<TransactionalOutputAdapter> {
    let manager = Arc::new(TransactionManager::new(4, 2));
    let input = TransactionalInputAdapter::new(
        "voice",
        config,
        Arc::clone(&manager),
        TlvRecordParser::factory(),
        passthrough_transform(),
        batch_size,
    )
    .unwrap();
    let output = TransactionalOutputAdapter::new("voice", config, single_line_expansion());
    Pipeline::new(
        "voice",
        manager,
        input,
        stages,
        output,
        Duration::from_millis(1),
    )
}

fn drain(pipeline: &mut Pipeline<TransactionalOutputAdapter>) {
    let stop = AtomicBool::new(false);
    pipeline.run(&stop, true).unwrap();
}

fn write_input(config: &PipelineConfig, name: &str, payloads: &[&str]) {
    let mut bytes = Vec::new();
    for payload in payloads {
        Tag::primitive(TagClass::Universal, 4).encode_into(&mut bytes);
        Length::Definite(payload.len() as u32).encode_into(&mut bytes);
        bytes.extend_from_slice(payload.as_bytes());
    }
    fs::write(Path::new(&config.input_file_path).join(name), bytes).unwrap();
}

fn read_output(config: &PipelineConfig, name: &str) -> String {
    fs::read_to_string(Path::new(&config.output_file_path).join(name)).unwrap()
}

/// Appends one line per header, record and trailer to a shared log.
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Stage for Recorder {
    fn proc_header(&mut self, header: StreamMarker) -> StreamMarker {
        self.log
            .lock()
            .unwrap()
            .push(format!("H:{}", header.base_name));
        header
    }

    fn proc_valid_record(&mut self, record: DataRecord) -> Option<DataRecord> {
        self.log.lock().unwrap().push(format!("D:{}", record.data));
        Some(record)
    }

    fn proc_trailer(&mut self, trailer: &StreamMarker) -> Option<DataRecord> {
        self.log
            .lock()
            .unwrap()
            .push(format!("T:{}", trailer.base_name));
        None
    }
}

fn recording_chain() -> (StageChain, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut stages = StageChain::new();
    stages.push(Box::new(Recorder {
        log: Arc::clone(&log),
    }));
    (stages, log)
}

/// A stream arrives as header, every record in file order, trailer.
#[test]
fn test_stream_is_bracketed_in_order() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["a", "b", "c", "d"]);

    let (stages, log) = recording_chain();
    let mut pipeline = build_pipeline(&config, stages, 100);
    drain(&mut pipeline);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["H:001", "D:a", "D:b", "D:c", "D:d", "T:001"]
    );
}

/// Two files pass one after the other: a stream's records all fall
/// between its own header and trailer, never inside another stream.
#[test]
fn test_streams_never_interleave() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_A.dat", &["A1", "A2", "A3"]);
    write_input(&config, "CDR_B.dat", &["B1", "B2", "B3"]);

    let (stages, log) = recording_chain();
    // Small batches so each stream spans several ticks.
    let mut pipeline = build_pipeline(&config, stages, 2);
    drain(&mut pipeline);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 10);

    // Claim order follows directory-listing order, so only the bracketing
    // is fixed, not which stream goes first.
    let mut open: Option<char> = None;
    let mut seen = Vec::new();
    for entry in log.iter() {
        let (kind, rest) = entry.split_at(2);
        let stream = rest.chars().next().unwrap();
        match kind {
            "H:" => {
                assert!(open.is_none(), "header inside an open stream: {}", entry);
                open = Some(stream);
                seen.push(stream);
            }
            "T:" => {
                assert_eq!(open, Some(stream), "trailer closes the wrong stream");
                open = None;
            }
            _ => {
                assert_eq!(open, Some(stream), "record outside its stream: {}", entry);
            }
        }
    }
    assert!(open.is_none());
    seen.sort();
    assert_eq!(seen, vec!['A', 'B']);
}

/// Seven records at batch size three: the header and trailer ride along
/// with the data, so nine entries move in exactly three full batches.
#[test]
fn test_batches_respect_the_size_ceiling() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(
        &config,
        "CDR_001.dat",
        &["r1", "r2", "r3", "r4", "r5", "r6", "r7"],
    );

    let mut pipeline = build_pipeline(&config, StageChain::new(), 3);
    let mut moved = Vec::new();
    loop {
        let count = pipeline.tick().unwrap();
        if count == 0 {
            break;
        }
        moved.push(count);
    }

    assert_eq!(moved, vec![3, 3, 3]);
    assert_eq!(pipeline.records_loaded(), 7);
}

/// Counts valid records and appends one summary record when the stream
/// ends.
struct Summarize {
    count: u64,
}

impl Stage for Summarize {
    fn proc_valid_record(&mut self, record: DataRecord) -> Option<DataRecord> {
        self.count += 1;
        Some(record)
    }

    fn proc_trailer(&mut self, trailer: &StreamMarker) -> Option<DataRecord> {
        if self.count == 0 {
            return None;
        }
        let summary = format!("SUM;{};{}", trailer.base_name, self.count);
        self.count = 0;
        Some(DataRecord::new(summary))
    }
}

/// A record flushed on the trailer is written before the stream's output
/// file closes, after every data record.
#[test]
fn test_trailer_flush_reaches_the_output_file() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["a", "b"]);

    let mut stages = StageChain::new();
    stages.push(Box::new(Summarize { count: 0 }));
    let mut pipeline = build_pipeline(&config, stages, 100);
    drain(&mut pipeline);

    assert_eq!(read_output(&config, "OUT_001.txt"), "a\nb\nSUM;001;2\n");
}

/// Attaches an error to records carrying the marker text.
struct FlagBad;

impl Stage for FlagBad {
    fn proc_valid_record(&mut self, mut record: DataRecord) -> Option<DataRecord> {
        if record.data.contains("bad") {
            record.add_error(RecordError::new("CDR_REC_REJECTED", "failed validation"));
        }
        Some(record)
    }
}

/// Records flagged by a stage are written to the stream's error file;
/// clean records keep going to the output file. The input file itself
/// still commits.
#[test]
fn test_flagged_records_land_in_the_error_file() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["good1", "bad1", "good2"]);

    let mut stages = StageChain::new();
    stages.push(Box::new(FlagBad));
    let mut pipeline = build_pipeline(&config, stages, 100);
    drain(&mut pipeline);

    assert_eq!(read_output(&config, "OUT_001.txt"), "good1\ngood2\n");
    assert_eq!(
        fs::read_to_string(Path::new(&config.err_file_path).join("CDR_001.err")).unwrap(),
        "bad1\n"
    );
    assert!(Path::new(&config.done_file_path)
        .join("CDR_001.done")
        .exists());
}

/// A stage that suppresses records thins the output without touching the
/// stream's bracketing or its disposition.
#[test]
fn test_suppressed_records_leave_no_trace_in_output() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["keep1", "drop1", "keep2", "drop2"]);

    struct DropMarked;
    impl Stage for DropMarked {
        fn proc_valid_record(&mut self, record: DataRecord) -> Option<DataRecord> {
            if record.data.starts_with("drop") {
                None
            } else {
                Some(record)
            }
        }
    }

    let mut stages = StageChain::new();
    stages.push(Box::new(DropMarked));
    let mut pipeline = build_pipeline(&config, stages, 100);
    drain(&mut pipeline);

    assert_eq!(read_output(&config, "OUT_001.txt"), "keep1\nkeep2\n");
    assert!(Path::new(&config.done_file_path)
        .join("CDR_001.done")
        .exists());
    assert_eq!(pipeline.records_loaded(), 4);
}
