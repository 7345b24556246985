//! Journal entry framing
//!
//! Each entry is framed for crash-safe sequential replay:
//! - Entry Length (u32 LE, total including this field)
//! - Entry Type (u8): CLAIM / DISPOSE
//! - Transaction Id (u64 LE)
//! - Payload (variable)
//! - Checksum (u32 LE, CRC32 over everything before it)
//!
//! Strings inside payloads are length-prefixed (u32 LE + UTF-8 bytes).

use std::io::{self, Cursor, Read};

use chrono::Utc;

use super::checksum::{compute_checksum, verify_checksum};
use crate::txn::TransactionId;

/// Entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    /// A file was claimed for a transaction
    Claim = 0,
    /// A claim reached a terminal outcome
    Dispose = 1,
}

impl EntryType {
    /// Convert from u8, returns None for invalid values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntryType::Claim),
            1 => Some(EntryType::Dispose),
            _ => None,
        }
    }

    /// Convert to u8.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Terminal outcome of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Disposition {
    /// The input file was committed and renamed to its done name
    Done = 0,
    /// The input file was rolled back and renamed to its error name
    Error = 1,
    /// Recovery returned the file to its original name
    Returned = 2,
}

impl Disposition {
    /// Convert from u8, returns None for invalid values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Disposition::Done),
            1 => Some(Disposition::Error),
            2 => Some(Disposition::Returned),
            _ => None,
        }
    }

    /// Convert to u8.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// Written immediately before the claim rename
    Claim {
        txn: TransactionId,
        /// Base name shared by all derived paths
        base: String,
        /// Absolute original path
        original: String,
        /// Absolute processing path
        processing: String,
        /// RFC 3339 timestamp of the claim
        at: String,
    },
    /// Written immediately after the terminal rename or delete
    Dispose {
        txn: TransactionId,
        disposition: Disposition,
        /// RFC 3339 timestamp of the disposition
        at: String,
    },
}

impl JournalEntry {
    /// Create a claim entry timestamped now.
    pub fn claim(
        txn: TransactionId,
        base: impl Into<String>,
        original: impl Into<String>,
        processing: impl Into<String>,
    ) -> Self {
        JournalEntry::Claim {
            txn,
            base: base.into(),
            original: original.into(),
            processing: processing.into(),
            at: Utc::now().to_rfc3339(),
        }
    }

    /// Create a dispose entry timestamped now.
    pub fn dispose(txn: TransactionId, disposition: Disposition) -> Self {
        JournalEntry::Dispose {
            txn,
            disposition,
            at: Utc::now().to_rfc3339(),
        }
    }

    /// Transaction this entry belongs to.
    pub fn transaction(&self) -> TransactionId {
        match self {
            JournalEntry::Claim { txn, .. } => *txn,
            JournalEntry::Dispose { txn, .. } => *txn,
        }
    }

    fn entry_type(&self) -> EntryType {
        match self {
            JournalEntry::Claim { .. } => EntryType::Claim,
            JournalEntry::Dispose { .. } => EntryType::Dispose,
        }
    }

    fn serialize_payload(&self) -> Vec<u8> {
        fn write_string(buf: &mut Vec<u8>, s: &str) {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }

        let mut buf = Vec::new();
        match self {
            JournalEntry::Claim {
                base,
                original,
                processing,
                at,
                ..
            } => {
                write_string(&mut buf, base);
                write_string(&mut buf, original);
                write_string(&mut buf, processing);
                write_string(&mut buf, at);
            }
            JournalEntry::Dispose {
                disposition, at, ..
            } => {
                buf.push(disposition.as_u8());
                write_string(&mut buf, at);
            }
        }
        buf
    }

    /// Serialize the complete entry, framed and checksummed.
    pub fn serialize(&self) -> Vec<u8> {
        let payload = self.serialize_payload();
        // length field + type + txn + payload + checksum
        let entry_length = (4 + 1 + 8 + payload.len() + 4) as u32;

        let mut entry = Vec::with_capacity(entry_length as usize);
        entry.extend_from_slice(&entry_length.to_le_bytes());
        entry.push(self.entry_type().as_u8());
        entry.extend_from_slice(&self.transaction().to_le_bytes());
        entry.extend_from_slice(&payload);

        let checksum = compute_checksum(&entry);
        entry.extend_from_slice(&checksum.to_le_bytes());
        entry
    }

    /// Deserialize one entry from the front of `data`, verifying the
    /// checksum.
    ///
    /// Returns the entry and the number of bytes consumed. Truncated input
    /// yields `UnexpectedEof`, checksum or type violations yield
    /// `InvalidData`; the replay loop maps these to torn-tail tolerance
    /// versus corruption.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        const MIN_ENTRY_SIZE: usize = 4 + 1 + 8 + 4;

        if data.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "entry length field truncated",
            ));
        }

        let entry_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if entry_length < MIN_ENTRY_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry length {} below minimum", entry_length),
            ));
        }
        if data.len() < entry_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry truncated: declared {} bytes, {} available",
                    entry_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = entry_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        if !verify_checksum(&data[..checksum_offset], stored_checksum) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "entry checksum mismatch",
            ));
        }

        let entry_type = EntryType::from_u8(data[4]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid entry type: {}", data[4]),
            )
        })?;
        let txn = u64::from_le_bytes([
            data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
        ]);

        let mut cursor = Cursor::new(&data[13..checksum_offset]);
        let entry = match entry_type {
            EntryType::Claim => {
                let base = read_string(&mut cursor)?;
                let original = read_string(&mut cursor)?;
                let processing = read_string(&mut cursor)?;
                let at = read_string(&mut cursor)?;
                JournalEntry::Claim {
                    txn,
                    base,
                    original,
                    processing,
                    at,
                }
            }
            EntryType::Dispose => {
                let mut byte = [0u8; 1];
                cursor.read_exact(&mut byte)?;
                let disposition = Disposition::from_u8(byte[0]).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid disposition: {}", byte[0]),
                    )
                })?;
                let at = read_string(&mut cursor)?;
                JournalEntry::Dispose {
                    txn,
                    disposition,
                    at,
                }
            }
        };

        Ok((entry, entry_length))
    }
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut string_buf = vec![0u8; len];
    reader.read_exact(&mut string_buf)?;

    String::from_utf8(string_buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8: {}", e)))
}
