//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// Errors that can occur while converting a trace.
///
/// The trace and report streams are machine-generated by trusted upstream
/// tools, so every deviation from the expected format is unrecoverable:
/// a mismatch signals format drift or corruption that must be surfaced,
/// not skipped over.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// A line failed its expected pattern where one is required
    /// (unrecognized event kind, malformed attribute clause,
    /// malformed tree/graph/perf row).
    #[error("malformed input: {0}")]
    Grammar(String),

    /// ENTER/LEAVE sequencing violation on a single location
    /// (ENTER with an interval already open, LEAVE with none,
    /// dangling ENTER at end of stream).
    #[error("event ordering violation: {0}")]
    Ordering(String),

    /// Cross-record contradiction (attribute mismatch inside an
    /// ENTER/LEAVE pair, conflicting parent GUIDs, duplicate tree
    /// registration of a known region).
    #[error("inconsistent trace data: {0}")]
    Consistency(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvertError {
    /// Grammar error quoting the offending line.
    pub fn bad_line(what: &str, line: &str) -> Self {
        ConvertError::Grammar(format!("{}: {:?}", what, line.trim_end()))
    }
}
