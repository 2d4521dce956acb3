//! Output writers for the converted document.

pub mod json;

// Re-export main types
pub use json::JsonWriter;
