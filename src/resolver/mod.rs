//! # File-Set Resolver
//!
//! Maps a configured file family (`{prefix}*{suffix}` in an input
//! directory) onto concrete work items, and performs the claim that
//! binds one file to exactly one transaction.
//!
//! A claim is a journal entry followed by an atomic rename of the
//! original file to its processing name. The rename is the
//! linearization point: whichever process renames first owns the file,
//! and a competing claimer observes a failed rename and backs off.

mod errors;

pub use errors::{ResolveError, ResolveResult};

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::PipelineConfig;
use crate::journal::{ClaimJournal, Disposition, JOURNAL_FILE_NAME};
use crate::txn::TransactionId;

/// The four path roles a claimed file moves through.
///
/// `original` and `processing` live in the input directory. `done` and
/// `error` are final resting places and may live anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPaths {
    /// Variable part of the file name, shared by all derived names
    pub base: String,
    /// The file as produced by the upstream system
    pub original: PathBuf,
    /// The claimed name: processing prefix prepended to the original name
    pub processing: PathBuf,
    /// Destination on commit
    pub done: PathBuf,
    /// Destination on rollback
    pub error: PathBuf,
}

/// Resolves candidate files for one pipeline and claims them.
pub struct FileSetResolver {
    input_dir: PathBuf,
    processing_prefix: String,
    done_dir: PathBuf,
    done_prefix: String,
    done_suffix: String,
    err_dir: PathBuf,
    err_prefix: String,
    err_suffix: String,
    /// Anchored `^prefix(.+)suffix$`; the capture is the base name.
    base_pattern: Regex,
}

impl FileSetResolver {
    /// Build a resolver from one pipeline's file templates.
    pub fn from_config(pipeline: &PipelineConfig) -> ResolveResult<Self> {
        let pattern = format!(
            "^{}(.+){}$",
            regex::escape(&pipeline.input_file_prefix),
            regex::escape(&pipeline.input_file_suffix)
        );
        let base_pattern = Regex::new(&pattern)
            .map_err(|e| ResolveError::InvalidPattern(e.to_string()))?;

        Ok(FileSetResolver {
            input_dir: PathBuf::from(&pipeline.input_file_path),
            processing_prefix: pipeline.processing_prefix.clone(),
            done_dir: PathBuf::from(&pipeline.done_file_path),
            done_prefix: pipeline.done_file_prefix.clone(),
            done_suffix: pipeline.done_file_suffix.clone(),
            err_dir: PathBuf::from(&pipeline.err_file_path),
            err_prefix: pipeline.err_file_prefix.clone(),
            err_suffix: pipeline.err_file_suffix.clone(),
            base_pattern,
        })
    }

    /// Extract the base name from a candidate file name.
    ///
    /// Returns `None` when the name does not match the family. The
    /// wildcard must cover at least one character, so a name that is
    /// exactly `prefix + suffix` is not a candidate.
    pub fn base_name(&self, file_name: &str) -> Option<String> {
        self.base_pattern
            .captures(file_name)
            .map(|caps| caps[1].to_string())
    }

    /// List candidate file names in the input directory.
    ///
    /// Candidates match the configured family and do not already carry
    /// the processing prefix. Names come back in directory-listing
    /// order, which is OS-dependent; claim order follows it.
    pub fn scan(&self) -> ResolveResult<Vec<String>> {
        let entries = fs::read_dir(&self.input_dir).map_err(|e| ResolveError::ScanFailed {
            dir: self.input_dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ResolveError::ScanFailed {
                dir: self.input_dir.display().to_string(),
                reason: e.to_string(),
            })?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                // Non-UTF8 names cannot belong to a configured family
                Err(_) => continue,
            };
            if name == JOURNAL_FILE_NAME {
                continue;
            }
            // Files already claimed by this or another process
            if !self.processing_prefix.is_empty() && name.starts_with(&self.processing_prefix) {
                continue;
            }
            if self.base_name(&name).is_none() {
                continue;
            }
            if !entry.path().is_file() {
                continue;
            }
            candidates.push(name);
        }
        Ok(candidates)
    }

    /// Compute all derived paths for a candidate file name.
    pub fn paths_for(&self, file_name: &str) -> Option<ClaimPaths> {
        let base = self.base_name(file_name)?;
        Some(ClaimPaths {
            original: self.input_dir.join(file_name),
            processing: self
                .input_dir
                .join(format!("{}{}", self.processing_prefix, file_name)),
            done: self
                .done_dir
                .join(format!("{}{}{}", self.done_prefix, base, self.done_suffix)),
            error: self
                .err_dir
                .join(format!("{}{}{}", self.err_prefix, base, self.err_suffix)),
            base,
        })
    }

    /// Claim a candidate file for a transaction.
    ///
    /// The claim is journaled before the rename so that a crash between
    /// the two leaves a record to settle on recovery. A failed rename
    /// means another claimer won the race (or the file vanished); the
    /// journal entry is settled immediately and `ClaimLost` is returned
    /// so the caller can cancel the transaction.
    pub fn claim(
        &self,
        file_name: &str,
        txn: TransactionId,
        journal: &mut ClaimJournal,
    ) -> ResolveResult<ClaimPaths> {
        let paths = self
            .paths_for(file_name)
            .ok_or_else(|| ResolveError::NotACandidate {
                file: file_name.to_string(),
            })?;

        journal.record_claim(txn, &paths.base, &paths.original, &paths.processing)?;

        if let Err(e) = fs::rename(&paths.original, &paths.processing) {
            // Settle the claim record so the journal can compact; if
            // this also fails the claim is settled on the next recovery.
            journal.record_disposition(txn, Disposition::Returned)?;
            return Err(ResolveError::ClaimLost {
                file: file_name.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(paths)
    }

    /// The directory this resolver scans.
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }
}
