//! cdrflow - Transactional batch-file mediation pipeline for telecom event records
//!
//! Input files are claimed by atomic rename, streamed through a chain of
//! processing stages in bounded batches, and written out under a per-file
//! transaction that either commits (rename to done) or rolls back (rename to
//! error, discard partial output). A file always ends up in exactly one of
//! three places: done, error, or back where it started after a crash.

pub mod ber;
pub mod cli;
pub mod config;
pub mod input;
pub mod journal;
pub mod observability;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod resolver;
pub mod txn;
