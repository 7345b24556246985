//! Startup recovery of claims a previous process left behind.
//!
//! A claim is journaled before the rename that takes the file, so a crash
//! at any point leaves either an unclaimed file, a journaled claim whose
//! rename never happened, or a processing-named file with a journal entry.
//! Recovery runs in the input adapter's constructor and must return every
//! half-claimed file to its original name without touching anything else.

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use cdrflow::ber::{Length, Tag, TagClass};
use cdrflow::config::PipelineConfig;
use cdrflow::input::{passthrough_transform, TlvRecordParser, TransactionalInputAdapter};
use cdrflow::journal::{ClaimJournal, JOURNAL_FILE_NAME};
use cdrflow::output::{single_line_expansion, TransactionalOutputAdapter};
use cdrflow::pipeline::{Pipeline, StageChain};
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
        StageChain::new(),
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

fn names_in(dir: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

/// A pipeline dropped mid-stream leaves its file under the processing
/// name; the next start returns it and processes it from the beginning.
#[test]
fn test_interrupted_stream_is_returned_and_reprocessed() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["a", "b", "c", "d"]);

    {
        let mut pipeline = build_pipeline(&config, 2);
        // Claim the file and move one partial batch, then die.
        assert!(pipeline.tick().unwrap() > 0);
    }

    let in_dir = Path::new(&config.input_file_path);
    assert!(in_dir.join("tmpCDR_001.dat").exists());

    let mut pipeline = build_pipeline(&config, 100);
    // Recovery ran in the constructor.
    assert!(in_dir.join("CDR_001.dat").exists());
    assert!(!in_dir.join("tmpCDR_001.dat").exists());

    drain(&mut pipeline);

    assert_eq!(names_in(&config.done_file_path), vec!["CDR_001.done"]);
    assert_eq!(
        fs::read_to_string(Path::new(&config.output_file_path).join("OUT_001.txt")).unwrap(),
        "a\nb\nc\nd\n"
    );
    assert_eq!(pipeline.records_loaded(), 4);
}

/// A crash between the journal append and the rename leaves the file at
/// its original name. Recovery settles the orphaned claim and the file
/// is picked up as fresh work.
#[test]
fn test_journaled_claim_without_rename_settles_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["a", "b"]);

    let in_dir = Path::new(&config.input_file_path);
    {
        let mut journal = ClaimJournal::open(in_dir).unwrap();
        journal
            .record_claim(
                9,
                "001",
                &in_dir.join("CDR_001.dat"),
                &in_dir.join("tmpCDR_001.dat"),
            )
            .unwrap();
    }

    let mut pipeline = build_pipeline(&config, 100);
    drain(&mut pipeline);

    assert_eq!(names_in(&config.done_file_path), vec!["CDR_001.done"]);
    assert_eq!(names_in(&config.input_file_path), vec![JOURNAL_FILE_NAME]);
}

/// Files already disposed by a previous run stay where they are; a
/// restart over the same directories finds nothing to do.
#[test]
fn test_finished_files_are_not_reprocessed_after_restart() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["a", "b"]);

    {
        let mut pipeline = build_pipeline(&config, 100);
        drain(&mut pipeline);
    }

    let mut pipeline = build_pipeline(&config, 100);
    drain(&mut pipeline);

    assert_eq!(pipeline.records_loaded(), 0);
    assert_eq!(names_in(&config.done_file_path), vec!["CDR_001.done"]);
    assert_eq!(names_in(&config.output_file_path), vec!["OUT_001.txt"]);
}

/// A processing-named file with no journal entry belongs to nobody this
/// process knows about; it is neither claimed nor disposed.
#[test]
fn test_unjournaled_processing_file_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    let in_dir = Path::new(&config.input_file_path);
    let mut bytes = Vec::new();
    Tag::primitive(TagClass::Universal, 4).encode_into(&mut bytes);
    Length::Definite(1).encode_into(&mut bytes);
    bytes.push(b'x');
    fs::write(in_dir.join("tmpCDR_009.dat"), bytes).unwrap();

    let mut pipeline = build_pipeline(&config, 100);
    drain(&mut pipeline);

    assert_eq!(
        names_in(&config.input_file_path),
        vec![JOURNAL_FILE_NAME, "tmpCDR_009.dat"]
    );
    assert!(names_in(&config.done_file_path).is_empty());
    assert!(names_in(&config.err_file_path).is_empty());
}

/// Once every claim has a disposition the journal compacts to nothing,
/// so it cannot grow without bound across runs.
#[test]
fn test_journal_compacts_once_all_claims_settle() {
    let dir = TempDir::new().unwrap();
    let config = pipeline_config(dir.path());
    write_input(&config, "CDR_001.dat", &["a"]);
    write_input(&config, "CDR_002.dat", &["b"]);

    let mut pipeline = build_pipeline(&config, 100);
    drain(&mut pipeline);

    let journal = Path::new(&config.input_file_path).join(JOURNAL_FILE_NAME);
    assert_eq!(fs::metadata(&journal).unwrap().len(), 0);
}
