//! Structured JSON log lines
//!
//! One log line = one event. Output is a single flat JSON object with the
//! event name first, then severity, then caller-supplied fields in the order
//! given (callers own the ordering so related lines diff cleanly).
//! Writes are synchronous and unbuffered; Error and Fatal go to stderr,
//! everything else to stdout.

use std::fmt;
use std::io::{self, Write};

use super::events::Event;
use crate::txn::TransactionId;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-record detail, off in production
    Trace = 0,
    /// Normal lifecycle progress
    Info = 1,
    /// Recoverable anomalies (claim races, close failures)
    Warn = 2,
    /// One record/file/transaction lost
    Error = 3,
    /// The pipeline cannot continue
    Fatal = 4,
}

impl Severity {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Synchronous structured logger.
///
/// Logging must never fail the pipeline: write errors are swallowed.
pub struct Logger;

impl Logger {
    /// Log an event at the given severity with key/value fields.
    pub fn log(severity: Severity, event: Event, fields: &[(&str, &str)]) {
        if severity >= Severity::Error {
            Self::render(severity, event, fields, &mut io::stderr());
        } else {
            Self::render(severity, event, fields, &mut io::stdout());
        }
    }

    /// Info-level event.
    pub fn info(event: Event, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    /// Warn-level event.
    pub fn warn(event: Event, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    /// Error-level event.
    pub fn error(event: Event, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }

    /// Log an event tied to a transaction; the `txn` field is emitted first.
    pub fn txn(severity: Severity, id: TransactionId, event: Event, fields: &[(&str, &str)]) {
        let id_str = id.to_string();
        let mut all: Vec<(&str, &str)> = Vec::with_capacity(fields.len() + 1);
        all.push(("txn", id_str.as_str()));
        all.extend_from_slice(fields);
        Self::log(severity, event, &all);
    }

    fn render<W: Write>(severity: Severity, event: Event, fields: &[(&str, &str)], out: &mut W) {
        let mut line = String::with_capacity(128);
        line.push_str("{\"event\":\"");
        line.push_str(event.as_str());
        line.push_str("\",\"severity\":\"");
        line.push_str(severity.as_str());
        line.push('"');

        for (key, value) in fields {
            line.push_str(",\"");
            Self::escape(&mut line, key);
            line.push_str("\":\"");
            Self::escape(&mut line, value);
            line.push('"');
        }

        line.push_str("}\n");

        // One write_all call so concurrent pipelines do not interleave
        // within a line.
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }

    fn escape(out: &mut String, s: &str) {
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                }
                c => out.push(c),
            }
        }
    }
}
