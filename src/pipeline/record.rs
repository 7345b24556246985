//! Pipeline record model
//!
//! Everything that flows between adapters and stages is a `Record`. A
//! file's stream is bracketed by synthetic Header and Trailer markers
//! carrying the stream identity, so stages and the output adapter can
//! correlate data records to files without any side channel.

use crate::txn::TransactionId;

/// Synthetic record bracketing one file's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMarker {
    /// The input file's base name, stripped of prefix and suffix
    pub base_name: String,
    /// Transaction owning the stream
    pub transaction: TransactionId,
    /// Data records emitted for the stream; zero on headers, the final
    /// count on trailers
    pub records: u64,
}

impl StreamMarker {
    /// Marker for the start of a stream.
    pub fn header(base_name: impl Into<String>, transaction: TransactionId) -> Self {
        Self {
            base_name: base_name.into(),
            transaction,
            records: 0,
        }
    }

    /// Marker for the end of a stream, carrying the data record count.
    pub fn trailer(
        base_name: impl Into<String>,
        transaction: TransactionId,
        records: u64,
    ) -> Self {
        Self {
            base_name: base_name.into(),
            transaction,
            records,
        }
    }
}

/// One error attached to a record by a stage or parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// Stable error code
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl RecordError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The unit of work flowing between stages.
///
/// A record with attached errors is an *error record*: it is routed through
/// `proc_error_record` and ends up in the error output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    /// Textual payload
    pub data: String,
    /// Errors attached so far, in attachment order
    pub errors: Vec<RecordError>,
}

impl DataRecord {
    /// A record with no errors.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            errors: Vec::new(),
        }
    }

    /// Attach an error, turning the record into an error record.
    pub fn add_error(&mut self, error: RecordError) {
        self.errors.push(error);
    }

    /// True when at least one error is attached.
    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A record in a file's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// First record of every stream
    Header(StreamMarker),
    /// Payload-bearing record
    Data(DataRecord),
    /// Last record of every completed stream
    Trailer(StreamMarker),
}

impl Record {
    /// True for header and trailer markers.
    pub fn is_marker(&self) -> bool {
        matches!(self, Record::Header(_) | Record::Trailer(_))
    }

    /// The payload record, if this is one.
    pub fn as_data(&self) -> Option<&DataRecord> {
        match self {
            Record::Data(data) => Some(data),
            _ => None,
        }
    }
}
