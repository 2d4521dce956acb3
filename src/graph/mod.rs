//! Region-graph assembly from parsed trace and report data.
//!
//! This module owns the durable state of a conversion:
//! - The region registry (names, edges, attributes, counters)
//! - ENTER/LEAVE pairing into closed ranges
//! - GUID lineage tracking and edge derivation

pub mod guids;
pub mod ranges;
pub mod registry;

// Re-export main types
pub use guids::{GuidRecord, GuidTable};
pub use ranges::{Range, RangeAssembler};
pub use registry::{PerfStats, Region, RegionGraph, RegionSource};
