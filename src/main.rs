//! OTF2 Graph Studio CLI
//!
//! Collects stdout reports and OTF2 trace data from an instrumented run
//! and converts them into one unified region-graph JSON document.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use otf2_graph_studio::commands::{execute_convert, ConvertArgs, ConvertOptions};
use otf2_graph_studio::utils::config::SCHEMA_VERSION;

/// OTF2 Graph Studio - unified region-graph JSON from instrumented runs
#[derive(Parser, Debug)]
#[command(name = "otf2-graph")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert trace and report streams into one JSON document
    Convert {
        /// Run stdout (tree/graph/perf reports) as a file; omit to pipe
        /// the run output directly into this tool
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Input OTF2 trace archive (e.g. test_data/OTF2_archive/APEX.otf2)
        #[arg(short = 'O', long)]
        otf2: Option<PathBuf>,

        /// Pre-printed trace dump text (alternative to --otf2)
        #[arg(short = 'T', long)]
        trace_dump: Option<PathBuf>,

        /// Output path for the JSON document; omit for stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Include all discrete trace events (ENTER, LEAVE, MPI_SEND, etc. separate)
        #[arg(short, long)]
        events: bool,

        /// Include the tree (separate from the implicit one in regions)
        #[arg(short, long)]
        tree: bool,

        /// Include GUIDs
        #[arg(short, long)]
        guids: bool,

        /// Suppress trace ranges from output (ENTER and LEAVE combined)
        #[arg(short = 'r', long)]
        omit_ranges: bool,

        /// Suppress the region links from output (separate from the
        /// implicit links in regions)
        #[arg(short = 'l', long)]
        omit_links: bool,

        /// Include debugging information for the source of each region
        #[arg(short = 's', long)]
        debug_sources: bool,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Convert {
            input,
            otf2,
            trace_dump,
            output,
            events,
            tree,
            guids,
            omit_ranges,
            omit_links,
            debug_sources,
        } => {
            let args = ConvertArgs {
                input,
                otf2,
                trace_dump,
                output,
                options: ConvertOptions {
                    include_events: events,
                    include_tree: tree,
                    include_guids: guids,
                    include_ranges: !omit_ranges,
                    include_links: !omit_links,
                    debug_sources,
                },
            };

            execute_convert(args)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}

/// Display schema information
///
/// **Private** - internal command implementation
fn display_schema(show_details: bool) {
    println!("OTF2 Graph Studio Output Schema");
    println!("Current Version: {}", SCHEMA_VERSION);
    println!();

    if show_details {
        println!("Document Structure (every top-level key optional):");
        println!("  tree: object           - Mirrored call tree ({{name, children}})");
        println!("  events: array          - Raw trace events in encounter order");
        println!("  ranges: array          - Matched ENTER/LEAVE intervals");
        println!("    Location: number     - Execution location of the pair");
        println!("    enter/leave: object  - {{Timestamp, Region}} endpoints");
        println!("  guids: object          - Call instance id -> {{regions, parent}}");
        println!("  region links: array    - {{source, target}} graph edges");
        println!("  regions: object        - Region name -> attribute object");
        println!("    name: string         - Display name (first $-segment)");
        println!("    line, char: string   - Source tokens from the raw name");
        println!("    parents, children    - Edge sets (omitted when empty)");
        println!("    eventCount: number   - Trace events attributed to the region");
        println!("    count, time, eval_direct - Performance table scalars");
    } else {
        println!("Use --show for detailed schema information");
    }
}

/// Display version information
///
/// **Private** - internal command implementation
fn display_version() {
    println!("OTF2 Graph Studio v{}", env!("CARGO_PKG_VERSION"));
    println!("Output Schema: v{}", SCHEMA_VERSION);
    println!();
    println!("Unified region-graph JSON conversion for OTF2 execution traces.");
}
