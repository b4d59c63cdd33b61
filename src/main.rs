//! photoroll CLI
//!
//! Copy photos and videos off a camera card into a date-organized
//! archive. Re-runs are idempotent; filename collisions go into
//! per-date roll subdirectories instead of overwriting.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use humansize::{BINARY, format_size};
use indicatif::{ProgressBar, ProgressStyle};

use photoroll::cache::IngestCache;
use photoroll::engine::IngestEngine;
use photoroll::logging;
use photoroll::report::format_report;
use photoroll::types::{FileOutcome, IngestConfig, OutputFormat};

#[derive(Parser)]
#[command(name = "photoroll")]
#[command(about = "Ingest camera photos and videos into a date-organized archive")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy new media from a source directory into the archive
    Ingest {
        /// Source directory to ingest from (e.g. a card mount point)
        source: PathBuf,

        /// Archive root (default: ~/Photos)
        #[arg(long)]
        archive_root: Option<PathBuf>,

        /// Flush the cache after this many copies (0 = only at the end)
        #[arg(long, default_value_t = 25)]
        autosave: u32,

        /// Output format for the run summary
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormatArg,
    },

    /// Show what the ingestion cache knows about a source directory
    Status {
        /// Source directory the cache belongs to
        source: PathBuf,

        /// Archive root (default: ~/Photos)
        #[arg(long)]
        archive_root: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Ingest {
            source,
            archive_root,
            autosave,
            format,
        } => cmd_ingest(source, archive_root, autosave, format.into(), cli.quiet),
        Commands::Status {
            source,
            archive_root,
        } => cmd_status(source, archive_root),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

fn cmd_ingest(
    source: PathBuf,
    archive_root: Option<PathBuf>,
    autosave: u32,
    format: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    let mut config = IngestConfig::new(source, archive_root.unwrap_or_else(default_archive_root));
    config.autosave_interval = autosave;

    let mut engine = IngestEngine::new(config).map_err(|e| e.to_string())?;

    let show_progress = format == OutputFormat::Human && !quiet;
    let report = if show_progress {
        let sp = spinner("Ingesting...");
        let result = engine.ingest_with(|_, outcome| {
            if let FileOutcome::Copied { size, .. } = outcome {
                sp.inc(1);
                sp.set_message(format!("copied {}", format_size(*size, BINARY)));
            }
        });
        sp.finish_and_clear();
        result.map_err(|e| e.to_string())?
    } else {
        engine.ingest().map_err(|e| e.to_string())?
    };

    print!("{}", format_report(&report, format));
    Ok(())
}

fn cmd_status(source: PathBuf, archive_root: Option<PathBuf>) -> Result<(), String> {
    let archive_root = archive_root.unwrap_or_else(default_archive_root);
    let cache = IngestCache::open(&source, &archive_root, 0).map_err(|e| e.to_string())?;

    println!("Cache file: {}", cache.path().display());

    if cache.is_empty() {
        println!("Nothing ingested from this source yet.");
        return Ok(());
    }

    let total_bytes: u64 = cache.iter().map(|(_, entry)| entry.size).sum();
    println!("Recorded files: {}", cache.len());
    println!("Recorded bytes: {}", format_size(total_bytes, BINARY));

    Ok(())
}

// ============================================================================
// HELPERS
// ============================================================================

fn default_archive_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Photos")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {pos} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
