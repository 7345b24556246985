//! Claim journal
//!
//! The claim rename alone is not crash-safe: a process stopping between
//! claiming a file and disposing of it would leave the file stranded under
//! its processing name forever. The journal closes that window. A `Claim`
//! entry is appended and fsync'd immediately before the claim rename; a
//! `Dispose` entry immediately after the terminal rename or delete. On
//! startup, replaying the journal returns every undisposed processing file
//! to its original name so the next scan picks it up fresh.
//!
//! The journal lives inside the watched input directory as
//! `.cdrflow-journal` (dot-prefixed, so no scan glob can claim it). A torn
//! final entry is expected after a crash and is dropped; a checksum failure
//! with entries after it means real corruption and is fatal. Once every
//! journaled claim is disposed the file is compacted to zero length.

pub mod checksum;
pub mod entry;
pub mod errors;

pub use entry::{Disposition, EntryType, JournalEntry};
pub use errors::{JournalError, JournalErrorCode, JournalResult};

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::txn::TransactionId;

/// File name of the journal inside the input directory.
pub const JOURNAL_FILE_NAME: &str = ".cdrflow-journal";

/// A claim with no disposition yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClaim {
    pub base: String,
    pub original: PathBuf,
    pub processing: PathBuf,
}

/// A claim settled by `recover`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredClaim {
    pub txn: TransactionId,
    pub base: String,
    pub original: PathBuf,
    pub processing: PathBuf,
    /// True when the processing file existed and was renamed back
    pub returned: bool,
}

/// Append-only, checksummed claim journal for one input directory.
#[derive(Debug)]
pub struct ClaimJournal {
    path: PathBuf,
    file: File,
    pending: HashMap<TransactionId, PendingClaim>,
}

impl ClaimJournal {
    /// Open (or create) the journal for an input directory and replay its
    /// entries into the pending-claim map.
    ///
    /// A truncated or checksum-corrupt final entry is dropped and the file
    /// cut back to the last valid boundary. Corruption followed by further
    /// entries is fatal.
    pub fn open(input_dir: &Path) -> JournalResult<Self> {
        let path = input_dir.join(JOURNAL_FILE_NAME);

        let buf = match fs::read(&path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(JournalError::append_failed(
                    format!("failed to read journal {}", path.display()),
                    e,
                ))
            }
        };

        let (entries, valid_len) = Self::replay(&buf)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                JournalError::append_failed(
                    format!("failed to open journal {}", path.display()),
                    e,
                )
            })?;

        // Drop a torn tail so the next append starts at a clean boundary.
        if (valid_len as u64) < file.metadata().map(|m| m.len()).unwrap_or(valid_len as u64) {
            file.set_len(valid_len as u64).map_err(|e| {
                JournalError::append_failed(
                    format!("failed to truncate torn journal tail {}", path.display()),
                    e,
                )
            })?;
        }

        let mut pending = HashMap::new();
        for entry in entries {
            match entry {
                JournalEntry::Claim {
                    txn,
                    base,
                    original,
                    processing,
                    ..
                } => {
                    pending.insert(
                        txn,
                        PendingClaim {
                            base,
                            original: PathBuf::from(original),
                            processing: PathBuf::from(processing),
                        },
                    );
                }
                JournalEntry::Dispose { txn, .. } => {
                    pending.remove(&txn);
                }
            }
        }

        let mut journal = Self {
            path,
            file,
            pending,
        };

        // Nothing outstanding means the history is dead weight.
        if journal.pending.is_empty() && valid_len > 0 {
            journal.compact()?;
        }

        Ok(journal)
    }

    /// Parse entries from a journal image, returning them along with the
    /// byte length of the valid prefix.
    fn replay(buf: &[u8]) -> JournalResult<(Vec<JournalEntry>, usize)> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < buf.len() {
            match JournalEntry::deserialize(&buf[offset..]) {
                Ok((entry, consumed)) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    // Torn final write.
                    break;
                }
                Err(e) => {
                    // A bad entry that still fits the buffer: tolerate it
                    // only when nothing follows it.
                    if Self::entry_reaches_end(&buf[offset..]) {
                        break;
                    }
                    return Err(JournalError::corruption_at_offset(
                        offset as u64,
                        format!("journal entry invalid: {}", e),
                    ));
                }
            }
        }
        Ok((entries, offset))
    }

    fn entry_reaches_end(rest: &[u8]) -> bool {
        if rest.len() < 4 {
            return true;
        }
        let declared = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        declared >= rest.len()
    }

    /// Append and fsync a claim entry. Must precede the claim rename.
    pub fn record_claim(
        &mut self,
        txn: TransactionId,
        base: &str,
        original: &Path,
        processing: &Path,
    ) -> JournalResult<()> {
        let entry = JournalEntry::claim(
            txn,
            base,
            original.display().to_string(),
            processing.display().to_string(),
        );
        self.append(&entry)?;
        self.pending.insert(
            txn,
            PendingClaim {
                base: base.to_string(),
                original: original.to_path_buf(),
                processing: processing.to_path_buf(),
            },
        );
        Ok(())
    }

    /// Append and fsync a dispose entry. Must follow the terminal rename
    /// or delete. Compacts the journal when no claims remain pending.
    pub fn record_disposition(
        &mut self,
        txn: TransactionId,
        disposition: Disposition,
    ) -> JournalResult<()> {
        let entry = JournalEntry::dispose(txn, disposition);
        self.append(&entry)?;
        self.pending.remove(&txn);
        if self.pending.is_empty() {
            self.compact()?;
        }
        Ok(())
    }

    /// Settle every pending claim left over from a previous process.
    ///
    /// A claim whose processing file still exists is renamed back to its
    /// original name; a claim that never got past the rename is settled
    /// without touching anything. Either way a `Returned` disposition is
    /// journaled so the books close.
    pub fn recover(&mut self) -> JournalResult<Vec<RecoveredClaim>> {
        let mut recovered = Vec::new();
        let mut settled: Vec<_> = self.pending.drain().collect();
        // Deterministic recovery order.
        settled.sort_by_key(|(txn, _)| *txn);

        for (txn, claim) in settled {
            let returned = if claim.processing.exists() {
                fs::rename(&claim.processing, &claim.original).map_err(|e| {
                    JournalError::recovery_failed(
                        format!(
                            "failed to return {} to {}",
                            claim.processing.display(),
                            claim.original.display()
                        ),
                        e,
                    )
                })?;
                true
            } else {
                false
            };

            let entry = JournalEntry::dispose(txn, Disposition::Returned);
            self.append(&entry)?;

            recovered.push(RecoveredClaim {
                txn,
                base: claim.base,
                original: claim.original,
                processing: claim.processing,
                returned,
            });
        }

        if self.pending.is_empty() {
            self.compact()?;
        }
        Ok(recovered)
    }

    /// Number of claims without a disposition.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending claim for a transaction, if any.
    pub fn pending_claim(&self, txn: TransactionId) -> Option<&PendingClaim> {
        self.pending.get(&txn)
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, entry: &JournalEntry) -> JournalResult<()> {
        let serialized = entry.serialize();
        self.file.write_all(&serialized).map_err(|e| {
            JournalError::append_failed(
                format!("failed to append entry for transaction {}", entry.transaction()),
                e,
            )
        })?;
        self.file.sync_all().map_err(|e| {
            JournalError::fsync_failed(
                format!("fsync failed after entry for transaction {}", entry.transaction()),
                e,
            )
        })?;
        Ok(())
    }

    fn compact(&mut self) -> JournalResult<()> {
        self.file.set_len(0).map_err(|e| {
            JournalError::append_failed(
                format!("failed to compact journal {}", self.path.display()),
                e,
            )
        })?;
        self.file.sync_all().map_err(|e| {
            JournalError::fsync_failed(
                format!("fsync failed after compacting {}", self.path.display()),
                e,
            )
        })?;
        Ok(())
    }
}
