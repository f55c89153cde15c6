//! Command-line parsing for the economic indicators dashboard.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the pipeline code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::Period;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "econ", version, about = "Economic indicators ETL + terminal dashboard (FRED-based)")]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, transform and store indicators, then launch the dashboard.
    Run(EtlArgs),
    /// Fetch, transform and store indicators, then print a summary.
    Etl(EtlArgs),
    /// Launch the dashboard over already-stored data (no network access).
    Dash(DashArgs),
    /// Print one stored indicator as a table and an ASCII plot.
    Show(ShowArgs),
    /// List the indicator names present in the store.
    List(StoreArgs),
    /// Export the stored data as a wide CSV (one column per indicator).
    Export(ExportArgs),
}

/// Options shared by commands that run the ETL pipeline.
#[derive(Debug, Args, Clone, Default)]
pub struct EtlArgs {
    /// TOML file with indicator catalog, derived metrics and defaults.
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// First observation date (YYYY-MM-DD). Default: 2000-01-01.
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last observation date (YYYY-MM-DD). Default: today.
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Resampling period.
    #[arg(long, value_enum)]
    pub period: Option<Period>,

    /// SQLite database path. Default: economic_indicators.db.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Store whatever succeeded when some indicators fail to fetch.
    #[arg(long)]
    pub allow_partial: bool,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Attempts per series for transient network failures.
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
}

/// Options for commands that only read the store.
#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// SQLite database path.
    #[arg(long, default_value = crate::config::DEFAULT_DB_PATH)]
    pub db: PathBuf,
}

/// Options for the stored-data dashboard.
#[derive(Debug, Args, Clone, Default)]
pub struct DashArgs {
    /// TOML file whose catalog picks the overview panels (and the db path).
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// SQLite database path. Default: the config's `db_path`, else economic_indicators.db.
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    /// Indicator label as stored (e.g. "GDP" or "GDP_YoY").
    pub indicator: String,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    /// Output CSV path.
    #[arg(short, long, value_name = "CSV")]
    pub out: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,
}
