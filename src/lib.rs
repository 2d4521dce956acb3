//! OTF2 Graph Studio
//!
//! Converts the textual reports of an instrumented parallel-program run
//! (call-tree dump, dot graph dump, performance table, and an
//! `otf2-print` trace dump) into one unified JSON graph of code regions,
//! region links, trace events, and matched enter/leave ranges.
//!
//! This crate provides the core implementation for the
//! `otf2-graph` CLI tool.
//!
//! ## Getting Started
//!
//! Most users should install and use the CLI:
//!
//! ```bash
//! cargo install otf2-graph-studio
//! otf2-graph --help
//! ```

pub mod commands;
pub mod graph;
pub mod output;
pub mod parser;
pub mod utils;
