//! RBF CLI
//!
//! Command-line tools for inspecting and repairing RBF logs.
//!
//! # Commands
//!
//! - `inspect` - Display file statistics and header state
//! - `verify` - Verify every frame reachable by a reverse scan
//! - `scan` - List frames newest first
//! - `dump` - Print the contents of one frame
//! - `truncate` - Cut the file back to a frame boundary
//! - `salvage` - Find verified frames behind damaged regions

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RBF command-line log tools.
#[derive(Parser)]
#[command(name = "rbf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the RBF file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display file statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify frame integrity
    Verify {
        /// Only check trailers, skip payload checksums
        #[arg(long)]
        trailers_only: bool,
    },

    /// List frames newest first
    Scan {
        /// Include tombstone frames
        #[arg(short, long)]
        tombstones: bool,

        /// Maximum number of frames to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the contents of one frame
    Dump {
        /// Frame offset
        #[arg(short, long)]
        offset: u64,

        /// Frame length
        #[arg(short, long)]
        length: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Truncate the file to a frame boundary
    Truncate {
        /// Target length in bytes
        #[arg(long, conflicts_with = "to_last_good")]
        to: Option<u64>,

        /// Cut back to the last offset from which a reverse scan is clean
        #[arg(long)]
        to_last_good: bool,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Find verified frames behind damaged regions
    Salvage {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("File path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify { trailers_only } => {
            let path = cli.path.ok_or("File path required for verify")?;
            commands::verify::run(&path, !trailers_only)?;
        }
        Commands::Scan {
            tombstones,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("File path required for scan")?;
            commands::scan::run(&path, tombstones, limit, &format)?;
        }
        Commands::Dump {
            offset,
            length,
            format,
        } => {
            let path = cli.path.ok_or("File path required for dump")?;
            commands::dump::run(&path, offset, length, &format)?;
        }
        Commands::Truncate {
            to,
            to_last_good,
            dry_run,
        } => {
            let path = cli.path.ok_or("File path required for truncate")?;
            let target = match (to, to_last_good) {
                (Some(length), _) => commands::truncate::Target::Length(length),
                (None, true) => commands::truncate::Target::LastGood,
                (None, false) => return Err("Either --to or --to-last-good is required".into()),
            };
            commands::truncate::run(&path, target, dry_run)?;
        }
        Commands::Salvage { format } => {
            let path = cli.path.ok_or("File path required for salvage")?;
            commands::salvage::run(&path, &format)?;
        }
        Commands::Version => {
            println!("RBF CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("RBF Core v{}", rbf_core::VERSION);
        }
    }

    Ok(())
}
