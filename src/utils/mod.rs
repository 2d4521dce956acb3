//! Utility modules for configuration and error handling.

pub mod config;
pub mod error;

// Re-export commonly used error type for convenience
pub use error::ConvertError;
