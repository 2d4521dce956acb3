//! Configuration and constants for the CLI.

/// Current output schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

// Region names may carry embedded structured tokens separated by '$':
// "<display_name>$...$<line>$<char>"
pub const REGION_NAME_DELIMITER: char = '$';

/// Suffix appended to region identifiers by the evaluation wrapper;
/// stripped before trace events are attributed to a region.
pub const EVAL_SUFFIX: &str = "::eval";

/// Parent GUID value that marks a call instance with no parent.
pub const ROOT_GUID: &str = "0";

// Progress reporting intervals (diagnostic channel only, never data output)
pub const EVENT_PROGRESS_INTERVAL: u64 = 100_000;
pub const RANGE_PROGRESS_INTERVAL: u64 = 100_000;

/// External reader that pretty-prints OTF2 archives as text.
pub const TRACE_READER_COMMAND: &str = "otf2-print";
