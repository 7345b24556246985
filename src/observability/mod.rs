//! Observability
//!
//! Structured JSON logging for the mediation pipeline. Every lifecycle
//! transition (claim, transaction state change, disposition) emits exactly
//! one event line so an operator can reconstruct a file's history from the
//! log alone.

pub mod events;
pub mod logger;
pub mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::StreamScope;
