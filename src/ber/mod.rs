//! BER tag/length/value decoding
//!
//! Binary event-record files arriving from network elements are BER-framed:
//! a flat or nested sequence of tag/length/value triples. This module
//! provides the sequential cursor that binary batch parsers use to find
//! record boundaries, plus the tag and length octet codecs.

pub mod cursor;
pub mod errors;
pub mod tag;

pub use cursor::BerReader;
pub use errors::{BerError, BerErrorCode, BerResult};
pub use tag::{Length, Tag, TagClass};
