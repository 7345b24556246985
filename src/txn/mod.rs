//! Transaction coordination
//!
//! One transaction corresponds to one input file's full processing
//! lifecycle. The manager arbitrates how many may be open at once and
//! decides commit versus rollback; adapters implement the
//! `TransactionClient` callbacks that the pipeline driver invokes to carry
//! the decision out.

pub mod client;
pub mod errors;
pub mod manager;

pub use client::{CallbackStatus, TransactionClient};
pub use errors::{TxnError, TxnResult};
pub use manager::{Outcome, TransactionManager, TransactionStatus};

/// Transaction identifier, unique within a process lifetime.
pub type TransactionId = u64;
