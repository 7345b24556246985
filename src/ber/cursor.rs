//! Sequential BER decode cursor
//!
//! `BerReader` walks a byte source as repeating tag/length/value triples.
//! The three operations must be called in order; after a value is consumed
//! the cursor is back at the next tag. Constructed values are not descended
//! automatically: `read_value` returns `None` for them and the caller
//! recurses with further `read_tag`/`read_length`/`read_value` calls, using
//! `value_end_offset` (definite lengths) or the end-of-content signal
//! (indefinite lengths) to know where the nesting closes.
//!
//! After a malformed-framing error the cursor position is unspecified and
//! the reader must be discarded.

use std::io::{self, Read};

use super::errors::{BerError, BerResult};
use super::tag::{Length, Tag, TagClass};

/// Which operation the cursor expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Tag,
    Length,
    Value,
}

/// Stateful BER reader over a sequential byte source.
pub struct BerReader<R: Read> {
    source: R,
    state: DecodeState,
    /// Bytes consumed from the source so far
    offset: u64,
    current_tag: Option<Tag>,
    current_length: Option<Length>,
    /// Absolute offset at which the current value ends, definite lengths only
    value_end: Option<u64>,
}

impl BerReader<io::Cursor<Vec<u8>>> {
    /// Reader over an in-memory buffer, for adapters that slurp whole files.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        BerReader::new(io::Cursor::new(bytes))
    }
}

impl<R: Read> BerReader<R> {
    /// Create a reader positioned at the first tag.
    pub fn new(source: R) -> Self {
        Self {
            source,
            state: DecodeState::Tag,
            offset: 0,
            current_tag: None,
            current_length: None,
            value_end: None,
        }
    }

    /// Bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Absolute offset at which the current tag's value ends.
    ///
    /// Set by `read_length` for definite lengths; `None` before the first
    /// length and for indefinite-length values. Lets a caller loop over the
    /// children of a constructed value until `offset()` reaches it.
    pub fn value_end_offset(&self) -> Option<u64> {
        self.value_end
    }

    /// Read the next identifier octets and return the decoded tag.
    ///
    /// Fails with the end-of-stream signal at the end of the source, with
    /// the end-of-content signal on the 0x00 0x00 marker (both marker octets
    /// are consumed, so the cursor lands on the tag that follows the closed
    /// value), and with a malformed-framing error on truncated or invalid
    /// identifier octets.
    pub fn read_tag(&mut self) -> BerResult<Tag> {
        if self.state != DecodeState::Tag {
            return Err(BerError::wrong_state(format!(
                "read_tag called while {}",
                self.state_name()
            )));
        }

        let first = match self.read_octet()? {
            Some(octet) => octet,
            None => return Err(BerError::end_of_stream()),
        };

        // 0x00 is reserved for the end-of-content marker; a real universal
        // tag 0 never appears. The marker is two octets, consume both.
        if first == 0x00 {
            return match self.read_octet()? {
                Some(0x00) => Err(BerError::end_of_content()),
                Some(other) => Err(BerError::malformed_at(
                    self.offset,
                    format!(
                        "end-of-content tag followed by length octet 0x{:02X}, expected 0x00",
                        other
                    ),
                )),
                None => Err(BerError::malformed_at(
                    self.offset,
                    "end-of-content tag truncated before its length octet",
                )),
            };
        }

        let class = TagClass::from_identifier_octet(first);
        let constructed = first & 0x20 != 0;
        let mut number = (first & 0x1F) as u32;

        // All-ones number bits escape to the multi-byte form.
        if number == 0x1F {
            number = 0;
            loop {
                let octet = match self.read_octet()? {
                    Some(octet) => octet,
                    None => {
                        return Err(BerError::malformed_at(
                            self.offset,
                            "multi-byte tag number truncated",
                        ))
                    }
                };
                if number > u32::MAX >> 7 {
                    return Err(BerError::malformed_at(
                        self.offset,
                        "multi-byte tag number exceeds 32 bits",
                    ));
                }
                number = (number << 7) | (octet & 0x7F) as u32;
                if octet & 0x80 == 0 {
                    break;
                }
            }
        }

        let tag = Tag {
            class,
            constructed,
            number,
        };
        self.current_tag = Some(tag);
        self.state = DecodeState::Length;
        Ok(tag)
    }

    /// Read the length octets for the tag just read.
    ///
    /// Short form and long form up to 4 length octets are supported; longer
    /// length fields cannot fit the 32-bit length and are malformed. The
    /// bare 0x80 sentinel yields `Length::Indefinite` and is only legal on
    /// constructed tags.
    pub fn read_length(&mut self) -> BerResult<Length> {
        if self.state != DecodeState::Length {
            return Err(BerError::wrong_state(format!(
                "read_length called while {}",
                self.state_name()
            )));
        }

        let first = match self.read_octet()? {
            Some(octet) => octet,
            None => {
                return Err(BerError::malformed_at(
                    self.offset,
                    "tag truncated before its length octet",
                ))
            }
        };

        let length = if first == 0x80 {
            let tag = self.current_tag.as_ref();
            if !tag.map(|t| t.constructed).unwrap_or(false) {
                return Err(BerError::malformed_at(
                    self.offset,
                    "indefinite length on a primitive tag",
                ));
            }
            Length::Indefinite
        } else if first & 0x80 == 0 {
            Length::Definite(first as u32)
        } else {
            let count = (first & 0x7F) as usize;
            if count > 4 {
                return Err(BerError::malformed_at(
                    self.offset,
                    format!("length field of {} octets exceeds the 4 supported", count),
                ));
            }
            let mut value: u32 = 0;
            for _ in 0..count {
                let octet = match self.read_octet()? {
                    Some(octet) => octet,
                    None => {
                        return Err(BerError::malformed_at(
                            self.offset,
                            "long-form length octets truncated",
                        ))
                    }
                };
                value = (value << 8) | octet as u32;
            }
            Length::Definite(value)
        };

        self.value_end = match length {
            Length::Definite(len) => Some(self.offset + len as u64),
            Length::Indefinite => None,
        };
        self.current_length = Some(length);
        self.state = DecodeState::Value;
        Ok(length)
    }

    /// Read the value bytes for the tag/length just read.
    ///
    /// Primitive tags yield exactly the announced bytes. Constructed tags
    /// yield `None` without consuming anything; the caller recurses into the
    /// nested triples instead. Either way the cursor then expects the next
    /// tag.
    pub fn read_value(&mut self) -> BerResult<Option<Vec<u8>>> {
        if self.state != DecodeState::Value {
            return Err(BerError::wrong_state(format!(
                "read_value called while {}",
                self.state_name()
            )));
        }

        let tag = self
            .current_tag
            .ok_or_else(|| BerError::wrong_state("read_value with no current tag"))?;

        if tag.constructed {
            self.state = DecodeState::Tag;
            return Ok(None);
        }

        let len = match self.current_length {
            Some(Length::Definite(len)) => len,
            // read_length rejects indefinite on primitive tags
            _ => return Err(BerError::wrong_state("read_value with no current length")),
        };

        let mut value = vec![0u8; len as usize];
        self.source.read_exact(&mut value).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                BerError::malformed_at(
                    self.offset,
                    format!("value truncated: expected {} bytes", len),
                )
            } else {
                BerError::read_failed("failed to read value bytes", e)
            }
        })?;
        self.offset += len as u64;
        self.state = DecodeState::Tag;
        Ok(Some(value))
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            DecodeState::Tag => "expecting a tag",
            DecodeState::Length => "expecting a length",
            DecodeState::Value => "expecting a value",
        }
    }

    fn read_octet(&mut self) -> BerResult<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.source.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.offset += 1;
                    return Ok(Some(buf[0]));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(BerError::read_failed("failed to read from source", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_primitive(class: TagClass, number: u32, value: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        Tag::primitive(class, number).encode_into(&mut buf);
        Length::Definite(value.len() as u32).encode_into(&mut buf);
        buf.extend_from_slice(value);
        buf
    }

    #[test]
    fn test_single_primitive_triple() {
        let bytes = encode_primitive(TagClass::Universal, 4, &[0xAA, 0xBB, 0xCC]);
        let mut reader = BerReader::from_bytes(bytes);

        let tag = reader.read_tag().unwrap();
        assert_eq!(tag.class, TagClass::Universal);
        assert!(!tag.constructed);
        assert_eq!(tag.number, 4);

        let length = reader.read_length().unwrap();
        assert_eq!(length, Length::Definite(3));
        assert_eq!(reader.value_end_offset(), Some(5));

        let value = reader.read_value().unwrap();
        assert_eq!(value, Some(vec![0xAA, 0xBB, 0xCC]));
        assert_eq!(reader.offset(), 5);
    }

    #[test]
    fn test_consecutive_triples() {
        let mut bytes = encode_primitive(TagClass::Application, 1, b"first");
        bytes.extend(encode_primitive(TagClass::Application, 2, b"second"));
        let mut reader = BerReader::from_bytes(bytes);

        assert_eq!(reader.read_tag().unwrap().number, 1);
        reader.read_length().unwrap();
        assert_eq!(reader.read_value().unwrap().unwrap(), b"first");

        assert_eq!(reader.read_tag().unwrap().number, 2);
        reader.read_length().unwrap();
        assert_eq!(reader.read_value().unwrap().unwrap(), b"second");
    }

    #[test]
    fn test_end_of_stream_on_empty_source() {
        let mut reader = BerReader::from_bytes(Vec::new());
        let err = reader.read_tag().unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn test_end_of_stream_after_last_triple() {
        let bytes = encode_primitive(TagClass::Universal, 4, b"x");
        let mut reader = BerReader::from_bytes(bytes);
        reader.read_tag().unwrap();
        reader.read_length().unwrap();
        reader.read_value().unwrap();

        assert!(reader.read_tag().unwrap_err().is_end_of_stream());
        // The signal repeats on further calls.
        assert!(reader.read_tag().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn test_out_of_sequence_calls_are_wrong_state() {
        let bytes = encode_primitive(TagClass::Universal, 4, b"x");
        let mut reader = BerReader::from_bytes(bytes);

        use super::super::errors::BerErrorCode;
        assert_eq!(
            reader.read_length().unwrap_err().code(),
            BerErrorCode::CdrBerWrongState
        );
        assert_eq!(
            reader.read_value().unwrap_err().code(),
            BerErrorCode::CdrBerWrongState
        );

        reader.read_tag().unwrap();
        assert_eq!(
            reader.read_tag().unwrap_err().code(),
            BerErrorCode::CdrBerWrongState
        );
    }

    #[test]
    fn test_length_boundaries_round_trip() {
        for len in [0usize, 127, 128] {
            let value = vec![0x5A; len];
            let bytes = encode_primitive(TagClass::Context, 7, &value);
            let mut reader = BerReader::from_bytes(bytes);
            reader.read_tag().unwrap();
            assert_eq!(reader.read_length().unwrap(), Length::Definite(len as u32));
            assert_eq!(reader.read_value().unwrap().unwrap(), value);
        }
    }

    #[test]
    fn test_three_byte_length_boundary_header() {
        // 2^24 + 1 needs four length octets; decode the header only.
        let mut bytes = Vec::new();
        Tag::primitive(TagClass::Universal, 4).encode_into(&mut bytes);
        Length::Definite(0x0100_0001).encode_into(&mut bytes);
        let mut reader = BerReader::from_bytes(bytes);
        reader.read_tag().unwrap();
        assert_eq!(reader.read_length().unwrap(), Length::Definite(0x0100_0001));
        assert_eq!(reader.value_end_offset(), Some(6 + 0x0100_0001));
    }

    #[test]
    fn test_multi_byte_tag_numbers() {
        for number in [31u32, 127, 128, 0x0FFF_FFFF] {
            let bytes = encode_primitive(TagClass::Private, number, b"v");
            let mut reader = BerReader::from_bytes(bytes);
            let tag = reader.read_tag().unwrap();
            assert_eq!(tag.number, number);
            assert_eq!(tag.class, TagClass::Private);
        }
    }

    #[test]
    fn test_constructed_value_is_walked_by_recursion() {
        // SEQUENCE { OCTET STRING "ab", OCTET STRING "c" }
        let mut children = encode_primitive(TagClass::Universal, 4, b"ab");
        children.extend(encode_primitive(TagClass::Universal, 4, b"c"));
        let mut bytes = Vec::new();
        Tag::constructed(TagClass::Universal, 16).encode_into(&mut bytes);
        Length::Definite(children.len() as u32).encode_into(&mut bytes);
        bytes.extend_from_slice(&children);

        let mut reader = BerReader::from_bytes(bytes);
        let outer = reader.read_tag().unwrap();
        assert!(outer.constructed);
        reader.read_length().unwrap();
        let end = reader.value_end_offset().unwrap();
        assert_eq!(reader.read_value().unwrap(), None);

        let mut values = Vec::new();
        while reader.offset() < end {
            reader.read_tag().unwrap();
            reader.read_length().unwrap();
            values.push(reader.read_value().unwrap().unwrap());
        }
        assert_eq!(values, vec![b"ab".to_vec(), b"c".to_vec()]);
        assert!(reader.read_tag().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn test_indefinite_length_closed_by_end_of_content() {
        let mut bytes = Vec::new();
        Tag::constructed(TagClass::Universal, 16).encode_into(&mut bytes);
        Length::Indefinite.encode_into(&mut bytes);
        bytes.extend(encode_primitive(TagClass::Universal, 4, b"inner"));
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend(encode_primitive(TagClass::Universal, 4, b"after"));

        let mut reader = BerReader::from_bytes(bytes);
        let outer = reader.read_tag().unwrap();
        assert!(outer.constructed);
        assert_eq!(reader.read_length().unwrap(), Length::Indefinite);
        assert_eq!(reader.value_end_offset(), None);
        assert_eq!(reader.read_value().unwrap(), None);

        reader.read_tag().unwrap();
        reader.read_length().unwrap();
        assert_eq!(reader.read_value().unwrap().unwrap(), b"inner");

        assert!(reader.read_tag().unwrap_err().is_end_of_content());

        // Both marker octets were consumed; the sibling follows.
        reader.read_tag().unwrap();
        reader.read_length().unwrap();
        assert_eq!(reader.read_value().unwrap().unwrap(), b"after");
    }

    #[test]
    fn test_indefinite_length_on_primitive_is_malformed() {
        let mut reader = BerReader::from_bytes(vec![0x04, 0x80]);
        reader.read_tag().unwrap();
        let err = reader.read_length().unwrap_err();
        assert!(!err.is_end_of_content());
        assert!(err.message().contains("primitive"));
    }

    #[test]
    fn test_length_field_over_four_octets_is_malformed() {
        let mut reader = BerReader::from_bytes(vec![0x04, 0x85, 1, 2, 3, 4, 5]);
        reader.read_tag().unwrap();
        let err = reader.read_length().unwrap_err();
        assert!(err.message().contains("4"));
    }

    #[test]
    fn test_truncated_value_is_malformed() {
        let mut reader = BerReader::from_bytes(vec![0x04, 0x05, 0xAA, 0xBB]);
        reader.read_tag().unwrap();
        reader.read_length().unwrap();
        let err = reader.read_value().unwrap_err();
        assert!(err.message().contains("truncated"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_truncated_multi_byte_tag_is_malformed() {
        let mut reader = BerReader::from_bytes(vec![0x5F]);
        let err = reader.read_tag().unwrap_err();
        assert!(!err.is_end_of_stream());
        assert!(err.message().contains("truncated"));
    }

    #[test]
    fn test_end_of_content_with_nonzero_length_is_malformed() {
        let mut reader = BerReader::from_bytes(vec![0x00, 0x01]);
        let err = reader.read_tag().unwrap_err();
        assert!(!err.is_end_of_content());
        assert!(err.message().contains("0x01"));
    }
}
