//! Processing stage contract
//!
//! Stages are the seam for everything domain-specific: validation, lookup,
//! rating, aggregation. A stage sees every record of every stream in order
//! and may replace payloads, attach errors, suppress records, or emit
//! buffered records when a stream's trailer arrives.

use super::record::{DataRecord, Record, StreamMarker};

/// One processing step in a pipeline.
///
/// Valid and error records take separate paths so a stage can, for
/// instance, rate valid records while only annotating already-failed ones.
/// Returning `None` suppresses the record (aggregation, filtering).
/// Stages are `Send` because a pipeline may run on a worker-pool thread.
pub trait Stage: Send {
    /// A new stream is starting. The marker may be rewritten.
    fn proc_header(&mut self, header: StreamMarker) -> StreamMarker {
        header
    }

    /// Process a record with no attached errors.
    fn proc_valid_record(&mut self, record: DataRecord) -> Option<DataRecord>;

    /// Process a record that already carries errors.
    ///
    /// The default passes it through untouched.
    fn proc_error_record(&mut self, record: DataRecord) -> Option<DataRecord> {
        Some(record)
    }

    /// The stream is ending. Called repeatedly while it returns
    /// `Some(record)`, letting the stage flush records it buffered during
    /// the stream; `None` lets the trailer pass.
    fn proc_trailer(&mut self, trailer: &StreamMarker) -> Option<DataRecord> {
        let _ = trailer;
        None
    }
}

/// An ordered chain of stages.
///
/// Records visit stages in push order. Records a stage flushes on a
/// trailer continue through the stages after it, so an aggregator's output
/// still gets rated downstream.
pub struct StageChain {
    stages: Vec<Box<dyn Stage>>,
}

impl StageChain {
    /// An empty chain; records pass through unchanged.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage to the end of the chain.
    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Number of stages in the chain.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run one batch through the whole chain, preserving record order.
    pub fn process_batch(&mut self, batch: Vec<Record>) -> Vec<Record> {
        let mut out = Vec::with_capacity(batch.len());
        for record in batch {
            match record {
                Record::Header(mut marker) => {
                    for stage in &mut self.stages {
                        marker = stage.proc_header(marker);
                    }
                    out.push(Record::Header(marker));
                }
                Record::Data(data) => {
                    if let Some(data) = self.process_data_from(0, data) {
                        out.push(Record::Data(data));
                    }
                }
                Record::Trailer(marker) => {
                    for i in 0..self.stages.len() {
                        while let Some(flushed) = self.stages[i].proc_trailer(&marker) {
                            if let Some(data) = self.process_data_from(i + 1, flushed) {
                                out.push(Record::Data(data));
                            }
                        }
                    }
                    out.push(Record::Trailer(marker));
                }
            }
        }
        out
    }

    fn process_data_from(&mut self, start: usize, mut record: DataRecord) -> Option<DataRecord> {
        for stage in &mut self.stages[start..] {
            let next = if record.is_error() {
                stage.proc_error_record(record)
            } else {
                stage.proc_valid_record(record)
            };
            match next {
                Some(r) => record = r,
                None => return None,
            }
        }
        Some(record)
    }
}

impl Default for StageChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::RecordError;

    /// Uppercases valid payloads, drops records containing "drop".
    struct Upcase;

    impl Stage for Upcase {
        fn proc_valid_record(&mut self, record: DataRecord) -> Option<DataRecord> {
            if record.data.contains("drop") {
                return None;
            }
            Some(DataRecord::new(record.data.to_uppercase()))
        }
    }

    /// Flags records shorter than four characters as errors.
    struct MinLength;

    impl Stage for MinLength {
        fn proc_valid_record(&mut self, mut record: DataRecord) -> Option<DataRecord> {
            if record.data.len() < 4 {
                record.add_error(RecordError::new("CDR_REC_TOO_SHORT", "payload too short"));
            }
            Some(record)
        }
    }

    /// Buffers every valid record and emits one summary line on the trailer.
    struct Summarize {
        count: u64,
        flushed: bool,
    }

    impl Summarize {
        fn new() -> Self {
            Self {
                count: 0,
                flushed: false,
            }
        }
    }

    impl Stage for Summarize {
        fn proc_valid_record(&mut self, record: DataRecord) -> Option<DataRecord> {
            self.count += 1;
            Some(record)
        }

        fn proc_trailer(&mut self, trailer: &StreamMarker) -> Option<DataRecord> {
            if self.flushed {
                return None;
            }
            self.flushed = true;
            Some(DataRecord::new(format!(
                "SUMMARY;{};{}",
                trailer.base_name, self.count
            )))
        }
    }

    fn stream(records: &[&str]) -> Vec<Record> {
        let mut batch = vec![Record::Header(StreamMarker::header("CDR_001", 1))];
        for r in records {
            batch.push(Record::Data(DataRecord::new(*r)));
        }
        batch.push(Record::Trailer(StreamMarker::trailer(
            "CDR_001",
            1,
            records.len() as u64,
        )));
        batch
    }

    #[test]
    fn test_empty_chain_passes_records_through() {
        let mut chain = StageChain::new();
        assert!(chain.is_empty());
        let batch = stream(&["a", "b"]);
        assert_eq!(chain.process_batch(batch.clone()), batch);
    }

    #[test]
    fn test_stage_transforms_and_suppresses() {
        let mut chain = StageChain::new();
        chain.push(Box::new(Upcase));
        let out = chain.process_batch(stream(&["keep", "drop me", "also"]));

        let payloads: Vec<_> = out
            .iter()
            .filter_map(|r| r.as_data())
            .map(|d| d.data.as_str())
            .collect();
        assert_eq!(payloads, vec!["KEEP", "ALSO"]);
        // Markers survive suppression.
        assert!(matches!(out.first(), Some(Record::Header(_))));
        assert!(matches!(out.last(), Some(Record::Trailer(_))));
    }

    #[test]
    fn test_error_records_skip_valid_path() {
        let mut chain = StageChain::new();
        chain.push(Box::new(MinLength));
        chain.push(Box::new(Upcase));
        let out = chain.process_batch(stream(&["abc", "abcdef"]));

        let data: Vec<_> = out.iter().filter_map(|r| r.as_data()).collect();
        // "abc" was flagged by MinLength, so Upcase saw it on the error
        // path and left it alone.
        assert_eq!(data[0].data, "abc");
        assert!(data[0].is_error());
        assert_eq!(data[1].data, "ABCDEF");
        assert!(!data[1].is_error());
    }

    #[test]
    fn test_trailer_flush_passes_through_later_stages() {
        let mut chain = StageChain::new();
        chain.push(Box::new(Summarize::new()));
        chain.push(Box::new(Upcase));
        let out = chain.process_batch(stream(&["one", "two"]));

        let payloads: Vec<_> = out
            .iter()
            .filter_map(|r| r.as_data())
            .map(|d| d.data.as_str())
            .collect();
        // The summary was emitted on the trailer and still upcased by the
        // stage after the aggregator.
        assert_eq!(payloads, vec!["ONE", "TWO", "SUMMARY;CDR_001;2"]);

        let trailer_pos = out.iter().position(|r| matches!(r, Record::Trailer(_)));
        assert_eq!(trailer_pos, Some(out.len() - 1));
    }
}
