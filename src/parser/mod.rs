//! Trace and report stream parsing.
//!
//! This module handles:
//! - Parsing `otf2-print` event lines into typed records
//! - Scanning the tree/dot/perf side-channel report stream
//! - The Newick call-tree grammar

pub mod event;
pub mod reports;

// Re-export main types
pub use event::{Event, EventKind, EventParser, EventPayload};
pub use reports::{parse_newick, scan_reports, ReportScanner, TreeNode};
