//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod convert;

// Re-export main command functions
pub use convert::{
    convert_streams, execute_convert, validate_args, ConvertArgs, ConvertOptions, ConvertStats,
};
