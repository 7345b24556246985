//! Record sources
//!
//! A `RecordSource` turns one claimed file into a sequence of raw textual
//! records. Two families exist: line-oriented flat files are read lazily,
//! one line per record, while binary TLV files are slurped whole and handed
//! to a `BatchParser` that finds the record boundaries up front.
//!
//! Sources are strategy objects: the adapter is constructed with a
//! `SourceFactory` closure and never knows which family it is reading.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use crate::ber::{BerError, BerReader};

use super::errors::{InputError, InputErrorCode, InputResult};

/// Sequential supply of raw records from one open file.
pub trait RecordSource: Send {
    /// The next raw record, or `None` at end of stream.
    fn next_record(&mut self) -> InputResult<Option<String>>;
}

/// Builds a source for a claimed processing-named file.
pub type SourceFactory = Box<dyn Fn(&Path) -> InputResult<Box<dyn RecordSource>> + Send>;

/// Lazily reads a flat file line by line.
#[derive(Debug)]
pub struct LineSource {
    lines: io::Lines<BufReader<File>>,
}

impl LineSource {
    pub fn open(path: &Path) -> InputResult<Self> {
        let file = File::open(path).map_err(|e| {
            InputError::open_failed(format!("failed to open {}", path.display()), e)
        })?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }

    /// Factory producing line sources.
    pub fn factory() -> SourceFactory {
        Box::new(|path| Ok(Box::new(LineSource::open(path)?) as Box<dyn RecordSource>))
    }
}

impl RecordSource for LineSource {
    fn next_record(&mut self) -> InputResult<Option<String>> {
        match self.lines.next() {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(InputError::read_failed("failed to read line", e)),
            None => Ok(None),
        }
    }
}

/// Splits a slurped binary file into raw records all at once.
pub trait BatchParser: Send {
    fn parse(&mut self, bytes: &[u8]) -> InputResult<Vec<String>>;
}

/// Source over a binary file whose records were found by a `BatchParser`.
#[derive(Debug)]
pub struct BinarySource {
    records: std::vec::IntoIter<String>,
}

impl BinarySource {
    /// Slurp `path` and split it with `parser`.
    pub fn open(path: &Path, parser: &mut dyn BatchParser) -> InputResult<Self> {
        let bytes = fs::read(path).map_err(|e| {
            InputError::open_failed(format!("failed to read {}", path.display()), e)
        })?;
        let records = parser.parse(&bytes).map_err(|e| match e.code() {
            InputErrorCode::CdrInputParseFailed => {
                InputError::parse_failed_in(path.display(), e.message().to_string())
            }
            _ => e,
        })?;
        Ok(Self {
            records: records.into_iter(),
        })
    }
}

impl RecordSource for BinarySource {
    fn next_record(&mut self) -> InputResult<Option<String>> {
        Ok(self.records.next())
    }
}

/// Batch parser for BER TLV streams.
///
/// Every top-level element becomes one record: a primitive element yields
/// its value bytes as lossy UTF-8, a constructed element yields its
/// primitive leaf values in encounter order, joined by the separator.
/// Trailing end-of-content padding (zero octet pairs) is tolerated.
pub struct TlvRecordParser {
    separator: char,
}

impl TlvRecordParser {
    pub fn new() -> Self {
        Self { separator: '|' }
    }

    /// Use a different leaf separator.
    pub fn with_separator(separator: char) -> Self {
        Self { separator }
    }

    /// Factory producing slurped TLV sources.
    pub fn factory() -> SourceFactory {
        Box::new(|path| {
            let mut parser = TlvRecordParser::new();
            Ok(Box::new(BinarySource::open(path, &mut parser)?) as Box<dyn RecordSource>)
        })
    }
}

impl Default for TlvRecordParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchParser for TlvRecordParser {
    fn parse(&mut self, bytes: &[u8]) -> InputResult<Vec<String>> {
        let mut reader = BerReader::from_bytes(bytes.to_vec());
        let mut records = Vec::new();
        loop {
            match reader.read_tag() {
                Ok(_) => {}
                Err(e) if e.is_end_of_stream() => break,
                // Zero padding after the last record decodes as
                // end-of-content markers.
                Err(e) if e.is_end_of_content() => break,
                Err(e) => return Err(ber_error(e)),
            }
            let mut leaves = Vec::new();
            collect_element(&mut reader, &mut leaves)?;
            records.push(leaves.join(&self.separator.to_string()));
        }
        Ok(records)
    }
}

/// Consume the length and value of the element whose tag was just read,
/// descending into constructed values and collecting primitive leaves.
fn collect_element<R: Read>(
    reader: &mut BerReader<R>,
    leaves: &mut Vec<String>,
) -> InputResult<()> {
    let length = reader.read_length().map_err(ber_error)?;
    let end = reader.value_end_offset();

    match reader.read_value().map_err(ber_error)? {
        Some(value) => {
            leaves.push(String::from_utf8_lossy(&value).into_owned());
        }
        None if length.is_indefinite() => loop {
            match reader.read_tag() {
                Ok(_) => collect_element(reader, leaves)?,
                Err(e) if e.is_end_of_content() => break,
                Err(e) => return Err(ber_error(e)),
            }
        },
        None => {
            // Definite-length constructed value: children run until the
            // announced end offset.
            let end = end.unwrap_or(reader.offset());
            while reader.offset() < end {
                reader.read_tag().map_err(ber_error)?;
                collect_element(reader, leaves)?;
            }
            if reader.offset() != end {
                return Err(InputError::parse_failed(format!(
                    "constructed value overran its declared end at offset {}",
                    end
                )));
            }
        }
    }
    Ok(())
}

/// A broken byte source is fatal; everything else means this one file is
/// not a valid TLV stream.
fn ber_error(e: BerError) -> InputError {
    if e.is_fatal() {
        InputError::read_failed(
            "TLV read failed",
            io::Error::new(io::ErrorKind::Other, e.to_string()),
        )
    } else {
        InputError::parse_failed(e.to_string())
    }
}
