//! Ledger CLI
//!
//! Command-line tools for a ledger database snapshot.
//!
//! # Commands
//!
//! - `inspect` - Display row counts, anchor, lease and journal size
//! - `apply` - Apply a delta payload from a JSON file
//! - `journal` - List journal entries awaiting upload
//! - `grant-lease` - Install a key lease by hand
//! - `add-category` - Insert a category as a local change

mod commands;

use clap::{Parser, Subcommand};
use ledger_core::{DbConfig, LedgerDb};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ledger command-line database tools.
#[derive(Parser)]
#[command(name = "ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database snapshot file
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
    /// Display database statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Apply a delta payload
    Apply {
        /// JSON file holding the payload
        delta: PathBuf,
    },

    /// List pending journal entries
    Journal {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Install a key lease
    GrantLease {
        /// First usable key
        #[arg(long)]
        next: i64,

        /// Exclusive upper bound
        #[arg(long)]
        upper: i64,
    },

    /// Insert a category as a local change
    AddCategory {
        /// Category caption
        caption: String,
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
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("Ledger CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("Snapshot format v{}", ledger_core::FORMAT_VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Database path required")?;
    let db = LedgerDb::open_with_config(DbConfig::new().with_path(&path))?;

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&db, &format)?,
        Commands::Apply { delta } => commands::apply::run(&db, &delta)?,
        Commands::Journal { format } => commands::journal::run(&db, &format)?,
        Commands::GrantLease { next, upper } => commands::lease::run(&db, next, upper)?,
        Commands::AddCategory { caption } => commands::category::run(&db, &caption)?,
        Commands::Version => {}
    }

    Ok(())
}
