//! Convert command implementation.
//!
//! The convert command:
//! 1. Drains the side-channel report stream (tree/dot/perf) into the region graph
//! 2. Streams the trace dump once, finalizing one event at a time
//! 3. Feeds each event to the registry, range assembler, and guid table
//! 4. Flushes ranges, derives guid lineage edges
//! 5. Serializes the finished region graph

use crate::graph::{GuidTable, RangeAssembler, RegionGraph};
use crate::output::JsonWriter;
use crate::parser::{scan_reports, Event, EventParser};
use crate::utils::config::{
    EVENT_PROGRESS_INTERVAL, RANGE_PROGRESS_INTERVAL, TRACE_READER_COMMAND,
};
use crate::utils::error::ConvertError;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Instant;

/// Output-selection configuration, mirroring the CLI flags.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Include every discrete trace event in the output.
    pub include_events: bool,
    /// Include the mirrored call tree (separate from the implicit one in regions).
    pub include_tree: bool,
    /// Include the guid table and per-region guid sets.
    pub include_guids: bool,
    /// Combine ENTER/LEAVE pairs into ranges (on by default).
    pub include_ranges: bool,
    /// Emit the `region links` edge array (on by default).
    pub include_links: bool,
    /// Include per-region source-provenance debugging.
    pub debug_sources: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            include_events: false,
            include_tree: false,
            include_guids: false,
            include_ranges: true,
            include_links: true,
            debug_sources: false,
        }
    }
}

/// Arguments for the convert command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone, Default)]
pub struct ConvertArgs {
    /// Side-channel report file (program stdout); None = read stdin
    pub input: Option<PathBuf>,

    /// OTF2 archive to feed through the external trace reader
    pub otf2: Option<PathBuf>,

    /// Pre-printed trace dump text file (alternative to --otf2)
    pub trace_dump: Option<PathBuf>,

    /// Output path for the JSON document; None = stdout
    pub output: Option<PathBuf>,

    /// Output-selection flags
    pub options: ConvertOptions,
}

/// Counters reported after a successful conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertStats {
    pub num_events: u64,
    pub num_ranges: u64,
    pub num_regions: usize,
    pub num_guids: usize,
}

/// Validate convert arguments
///
/// **Public** - can be called before execute_convert for early validation
pub fn validate_args(args: &ConvertArgs) -> Result<()> {
    match (&args.otf2, &args.trace_dump) {
        (None, None) => bail!("one of --otf2 or --trace-dump is required"),
        (Some(_), Some(_)) => bail!("--otf2 and --trace-dump are mutually exclusive"),
        _ => {}
    }

    if let Some(input) = &args.input {
        if !input.is_file() {
            bail!("report input does not exist: {}", input.display());
        }
    }
    if let Some(dump) = &args.trace_dump {
        if !dump.is_file() {
            bail!("trace dump does not exist: {}", dump.display());
        }
    }
    if let Some(archive) = &args.otf2 {
        if !archive.is_file() {
            bail!("OTF2 archive does not exist: {}", archive.display());
        }
    }

    Ok(())
}

/// Execute the convert command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Missing input files or a failed trace-reader spawn
/// * Any grammar/ordering/consistency error in the streams
/// * File write errors
pub fn execute_convert(args: ConvertArgs) -> Result<ConvertStats> {
    let start_time = Instant::now();

    validate_args(&args)?;

    let reports: Box<dyn BufRead> = match &args.input {
        Some(path) => {
            info!("Reading reports from: {}", path.display());
            Box::new(BufReader::new(File::open(path).with_context(|| {
                format!("failed to open report input {}", path.display())
            })?))
        }
        None => {
            info!("Reading reports from stdin");
            Box::new(io::stdin().lock())
        }
    };

    let mut reader_child: Option<Child> = None;
    let trace: Box<dyn BufRead> = match (&args.otf2, &args.trace_dump) {
        (Some(archive), None) => {
            info!(
                "Spawning {} for archive: {}",
                TRACE_READER_COMMAND,
                archive.display()
            );
            let mut child = Command::new(TRACE_READER_COMMAND)
                .arg(archive)
                .stdout(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to spawn {}", TRACE_READER_COMMAND))?;
            let stdout = child
                .stdout
                .take()
                .context("trace reader process has no stdout")?;
            reader_child = Some(child);
            Box::new(BufReader::new(stdout))
        }
        (None, Some(dump)) => {
            info!("Reading trace dump from: {}", dump.display());
            Box::new(BufReader::new(File::open(dump).with_context(|| {
                format!("failed to open trace dump {}", dump.display())
            })?))
        }
        // validate_args rejects the remaining combinations
        _ => unreachable!(),
    };

    let out: Box<dyn Write> = match &args.output {
        Some(path) => {
            info!("Writing JSON to: {}", path.display());
            Box::new(BufWriter::new(File::create(path).with_context(|| {
                format!("failed to create output file {}", path.display())
            })?))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let stats = convert_streams(reports, trace, &args.options, out)
        .context("conversion failed")?;

    if let Some(mut child) = reader_child {
        let status = child.wait().context("failed to wait on trace reader")?;
        if !status.success() {
            bail!("{} exited with {}", TRACE_READER_COMMAND, status);
        }
    }

    info!(
        "Converted {} events, {} ranges, {} regions, {} guids in {:.2}s",
        stats.num_events,
        stats.num_ranges,
        stats.num_regions,
        stats.num_guids,
        start_time.elapsed().as_secs_f64()
    );

    Ok(stats)
}

/// Run the full conversion pipeline over in-memory or file-backed streams.
///
/// **Public** - the testable core of execute_convert. Drains `reports`
/// first (region identities it establishes may be referenced by trace
/// events), then makes a single forward pass over `trace`.
pub fn convert_streams<R: BufRead, T: BufRead, W: Write>(
    reports: R,
    trace: T,
    options: &ConvertOptions,
    out: W,
) -> Result<ConvertStats, ConvertError> {
    let mut writer = JsonWriter::new(out);
    writer.begin_document()?;

    // Phase 1: side-channel reports
    let mut graph = RegionGraph::new();
    let tree = scan_reports(reports, &mut graph)?;
    debug!("report scan registered {} regions", graph.len());
    if options.include_tree {
        if let Some(tree) = &tree {
            writer.object_section("tree", &tree.to_json())?;
        }
    }

    // Phase 2: the trace stream, one finalized event at a time
    let mut parser = EventParser::new();
    let mut assembler = RangeAssembler::new();
    let mut guids = GuidTable::new();
    let mut num_events: u64 = 0;

    if options.include_events {
        writer.begin_array_section("events")?;
    }
    for line in trace.lines() {
        let line = line?;
        if let Some(event) = parser.feed_line(&line)? {
            dispatch_event(
                &event,
                options,
                &mut graph,
                &mut assembler,
                &mut guids,
                &mut writer,
                &mut num_events,
            )?;
        }
    }
    // The last event never sees a next header line
    if let Some(event) = parser.finish() {
        dispatch_event(
            &event,
            options,
            &mut graph,
            &mut assembler,
            &mut guids,
            &mut writer,
            &mut num_events,
        )?;
    }
    if options.include_events {
        writer.end_array_section()?;
    }
    info!("finished processing {} events", num_events);

    // Completed ranges only exist once the stream is exhausted
    let mut num_ranges: u64 = 0;
    if options.include_ranges {
        let ranges = assembler.flush()?;
        writer.begin_array_section("ranges")?;
        for range in &ranges {
            writer.array_item(&range.to_json())?;
            num_ranges += 1;
            if num_ranges % RANGE_PROGRESS_INTERVAL == 0 {
                info!("processed {} ranges", num_ranges);
            }
        }
        writer.end_array_section()?;
        info!("finished processing {} ranges", num_ranges);
    }

    // Instance lineage becomes region edges regardless of guid output
    guids.derive_edges(&mut graph)?;
    if options.include_guids {
        writer.object_section("guids", &guids.to_json())?;
    }

    if options.include_links {
        writer.begin_array_section("region links")?;
        for link in graph.links_json() {
            writer.array_item(&link)?;
        }
        writer.end_array_section()?;
    }

    writer.object_section(
        "regions",
        &graph.to_json(options.debug_sources, options.include_guids),
    )?;
    writer.end_document()?;

    Ok(ConvertStats {
        num_events,
        num_ranges,
        num_regions: graph.len(),
        num_guids: guids.len(),
    })
}

/// Feed one finalized event to every interested component.
fn dispatch_event<W: Write>(
    event: &Event,
    options: &ConvertOptions,
    graph: &mut RegionGraph,
    assembler: &mut RangeAssembler,
    guids: &mut GuidTable,
    writer: &mut JsonWriter<W>,
    num_events: &mut u64,
) -> Result<(), ConvertError> {
    *num_events += 1;
    if *num_events % EVENT_PROGRESS_INTERVAL == 0 {
        info!("processed {} events", num_events);
    }

    if let Some(raw_region) = event.region() {
        let region = graph.record_event(raw_region)?;

        match (event.guid(), event.parent_guid()) {
            (Some(guid), Some(parent)) => {
                if options.include_guids {
                    graph.add_guid(&region, guid);
                }
                guids.observe(guid, parent, &region)?;
            }
            (None, None) => {}
            _ => {
                return Err(ConvertError::Grammar(format!(
                    "{} event at {} on location {} carries only one of GUID / Parent GUID",
                    event.kind.as_str(),
                    event.timestamp,
                    event.location,
                )))
            }
        }

        if options.include_ranges {
            assembler.observe(event);
        }
    }

    if options.include_events {
        writer.array_item(&event.to_json())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_args_requires_a_trace_source() {
        let args = ConvertArgs::default();
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_rejects_both_trace_sources() {
        let args = ConvertArgs {
            otf2: Some(PathBuf::from("a.otf2")),
            trace_dump: Some(PathBuf::from("dump.txt")),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_missing_trace_dump() {
        let args = ConvertArgs {
            trace_dump: Some(PathBuf::from("/definitely/not/here.txt")),
            ..Default::default()
        };
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_existing_trace_dump() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let args = ConvertArgs {
            trace_dump: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_convert_streams_minimal() {
        let trace = "ENTER 0 10 Region: \"r\"\nLEAVE 0 20 Region: \"r\"\n";
        let mut out = Vec::new();
        let stats = convert_streams(
            "".as_bytes(),
            trace.as_bytes(),
            &ConvertOptions::default(),
            &mut out,
        )
        .unwrap();
        assert_eq!(stats.num_events, 2);
        assert_eq!(stats.num_ranges, 1);
        assert_eq!(stats.num_regions, 1);
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["ranges"].as_array().unwrap().len(), 1);
        assert_eq!(doc["regions"]["r"]["eventCount"], 2);
    }
}
