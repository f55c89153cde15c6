//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - initialises logging
//! - resolves configuration (defaults, TOML file, flags)
//! - runs the ETL pipeline and/or reads the store
//! - prints reports or launches the dashboard

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, DashArgs, EtlArgs, ExportArgs, ShowArgs, StoreArgs};
use crate::config::{AppConfig, Catalog, FileConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `econ` binary.
pub fn run() -> Result<(), AppError> {
    // `econ` with no subcommand (or only flags) behaves like `econ run ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Etl(args) => handle_etl(args),
        Command::Dash(args) => handle_dash(args),
        Command::Show(args) => handle_show(args),
        Command::List(args) => handle_list(args),
        Command::Export(args) => handle_export(args),
    }
}

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `info` (or `debug` with `--verbose`).
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_run(args: EtlArgs) -> Result<(), AppError> {
    let config = config_from_args(&args)?;
    let run = pipeline::run_etl(&config)?;
    eprintln!("{}", crate::report::format_run_summary(&run, &config));
    let overview = catalog_names(&config.catalog);
    crate::tui::run(config.db_path.clone(), run.stored, overview)
}

fn handle_etl(args: EtlArgs) -> Result<(), AppError> {
    let config = config_from_args(&args)?;
    let run = pipeline::run_etl(&config)?;
    println!("{}", crate::report::format_run_summary(&run, &config));
    Ok(())
}

fn handle_dash(args: DashArgs) -> Result<(), AppError> {
    let (db_path, catalog) = dash_target(&args)?;
    let stored = pipeline::load_stored(&db_path)?;
    if stored.rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("No data in '{}'. Run `econ etl` first.", db_path.display()),
        ));
    }
    crate::tui::run(db_path, stored, catalog_names(&catalog))
}

/// Database and catalog for `dash`: `--db` wins, then the config file, then defaults.
fn dash_target(args: &DashArgs) -> Result<(PathBuf, Catalog), AppError> {
    let today = chrono::Local::now().date_naive();
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = AppConfig::from_file_config(file, today)?;
    let db_path = args.db.clone().unwrap_or(config.db_path);
    Ok((db_path, config.catalog))
}

fn catalog_names(catalog: &Catalog) -> Vec<String> {
    catalog.indicators().iter().map(|i| i.name.clone()).collect()
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let stored = pipeline::load_stored(&args.store.db)?;
    let series = crate::present::select_series(&stored.rows, &args.indicator);
    print!("{}", crate::report::format_series_table(&args.indicator, &series));
    if !args.no_plot && !series.is_empty() {
        println!();
        print!(
            "{}",
            crate::plot::render_series_plot(&args.indicator, &series, args.width, args.height)
        );
    }
    Ok(())
}

fn handle_list(args: StoreArgs) -> Result<(), AppError> {
    let store = crate::store::IndicatorStore::open(&args.db)?;
    print!("{}", crate::report::format_indicator_list(&store.indicator_names()?));
    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<(), AppError> {
    let stored = pipeline::load_stored(&args.store.db)?;
    crate::io::export::write_pivot_csv(&args.out, &stored.table)?;
    println!(
        "Wrote {} dates x {} indicators to {}",
        stored.table.dates().len(),
        stored.table.labels().len(),
        args.out.display()
    );
    Ok(())
}

/// Resolve defaults, then the optional TOML file, then CLI flags.
pub fn config_from_args(args: &EtlArgs) -> Result<AppConfig, AppError> {
    let today = chrono::Local::now().date_naive();
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let mut config = AppConfig::from_file_config(file, today)?;

    if let Some(start) = args.start {
        config.start = start;
    }
    if let Some(end) = args.end {
        config.end = end;
    }
    if let Some(period) = args.period {
        config.period = period;
    }
    if let Some(db) = &args.db {
        config.db_path = db.clone();
    }
    if args.allow_partial {
        config.allow_partial = true;
    }
    if let Some(secs) = args.timeout_secs {
        config.fetch.timeout = Duration::from_secs(secs);
    }
    if let Some(n) = args.retries {
        config.fetch.max_attempts = n;
    }

    config.validate()?;
    Ok(config)
}

/// Rewrite argv so `econ` defaults to `econ run`.
///
/// Rules:
/// - `econ`                        -> `econ run`
/// - `econ --start 2010-01-01 ...` -> `econ run --start 2010-01-01 ...`
/// - `econ --help/--version/-h`    -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "run" | "etl" | "dash" | "show" | "list" | "export");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "run flags".
    if arg1.starts_with('-') {
        argv.insert(1, "run".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}
