//! Streaming JSON document writer.
//!
//! The converted output is one JSON object whose sections are selected by
//! configuration. Events and ranges can be very large, so those sections
//! are streamed item by item as they finalize instead of buffering the
//! whole document; the registry-derived sections (tree, guids, regions,
//! region links) are small and written as materialized values at the end.

use crate::utils::error::ConvertError;
use serde_json::Value;
use std::io::Write;

/// Writer for the single output JSON object.
///
/// Call order: `begin_document`, then any mix of `object_section` and
/// `begin_array_section`/`array_item`/`end_array_section`, then
/// `end_document`. The writer tracks root- and item-level commas.
pub struct JsonWriter<W: Write> {
    out: W,
    wrote_root_key: bool,
    wrote_array_item: bool,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            wrote_root_key: false,
            wrote_array_item: false,
        }
    }

    pub fn begin_document(&mut self) -> Result<(), ConvertError> {
        self.out.write_all(b"{")?;
        Ok(())
    }

    /// Write one root key, comma-separated from any previous section.
    fn root_key(&mut self, name: &str) -> Result<(), ConvertError> {
        if self.wrote_root_key {
            self.out.write_all(b",")?;
        }
        self.wrote_root_key = true;
        write!(self.out, "\n  {}: ", Value::String(name.to_string()))?;
        Ok(())
    }

    /// Write a whole section from a materialized value.
    pub fn object_section(&mut self, name: &str, value: &Value) -> Result<(), ConvertError> {
        self.root_key(name)?;
        serde_json::to_writer(&mut self.out, value)?;
        Ok(())
    }

    /// Open a streamed array section.
    pub fn begin_array_section(&mut self, name: &str) -> Result<(), ConvertError> {
        self.root_key(name)?;
        self.out.write_all(b"[")?;
        self.wrote_array_item = false;
        Ok(())
    }

    /// Append one item to the currently open array section.
    pub fn array_item(&mut self, value: &Value) -> Result<(), ConvertError> {
        if self.wrote_array_item {
            self.out.write_all(b",")?;
        }
        self.wrote_array_item = true;
        self.out.write_all(b"\n    ")?;
        serde_json::to_writer(&mut self.out, value)?;
        Ok(())
    }

    pub fn end_array_section(&mut self) -> Result<(), ConvertError> {
        self.out.write_all(b"\n  ]")?;
        Ok(())
    }

    pub fn end_document(&mut self) -> Result<(), ConvertError> {
        self.out.write_all(b"\n}\n")?;
        self.out.flush()?;
        Ok(())
    }
}
