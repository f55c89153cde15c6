//! Shared ETL pipeline used by both the CLI and the dashboard.
//!
//! FRED fetch -> merge -> resample/fill/derive -> upsert -> reload -> pivot
//!
//! Front-ends only deal with presentation (printing vs widgets).

use std::path::Path;

use tracing::{info, warn};

use crate::config::{ApiKey, AppConfig};
use crate::data::{FetchReport, FredClient, ObservationSource, fetch_all};
use crate::domain::{LongRow, WideFrame};
use crate::error::{AppError, EtlError};
use crate::etl::{TransformConfig, merge, transform};
use crate::present::{PivotTable, pivot};
use crate::store::IndicatorStore;

/// Stored rows plus their pivoted view, as consumed by the display layer.
#[derive(Debug, Clone, Default)]
pub struct StoredData {
    pub rows: Vec<LongRow>,
    pub table: PivotTable,
}

/// All outputs of a single ETL run.
#[derive(Debug, Clone)]
pub struct EtlRun {
    /// Indicators that failed to fetch (only non-empty with `allow_partial`).
    pub failures: Vec<(String, EtlError)>,
    pub frame: WideFrame,
    pub rows_written: usize,
    pub stored: StoredData,
}

/// Fetch from FRED using `FRED_API_KEY`, then run the rest of the pipeline.
pub fn run_etl(config: &AppConfig) -> Result<EtlRun, AppError> {
    let client = FredClient::new(ApiKey::from_env()?, config.fetch)?;
    run_etl_with_source(&client, config)
}

/// Run the pipeline against any observation source.
pub fn run_etl_with_source<S: ObservationSource + ?Sized>(
    source: &S,
    config: &AppConfig,
) -> Result<EtlRun, AppError> {
    info!(
        indicators = config.catalog.len(),
        start = %config.start,
        end = %config.end,
        "collecting data"
    );
    let report = fetch_all(source, &config.catalog, config.start, config.end);
    let FetchReport { series, failures } = check_fetch_report(report, config.allow_partial)?;

    info!("processing data");
    let merged = merge(&series)?;
    let transform_config = TransformConfig {
        period: config.period,
        derived: config.derived.clone(),
    };
    let frame = transform(&merged, &transform_config)?;

    info!(db = %config.db_path.display(), "storing data");
    let rows_written = {
        let mut store = IndicatorStore::open(&config.db_path)?;
        store.save(&frame)?
    };

    let stored = load_stored(&config.db_path)?;
    info!(rows = stored.rows.len(), "data collection and storage complete");

    Ok(EtlRun {
        failures,
        frame,
        rows_written,
        stored,
    })
}

/// Decide whether a run may continue after fetch failures.
///
/// Strict mode aborts on any failure; partial mode continues with what
/// succeeded unless nothing did.
fn check_fetch_report(report: FetchReport, allow_partial: bool) -> Result<FetchReport, AppError> {
    if report.is_complete() {
        return Ok(report);
    }

    let summary = report
        .failures
        .iter()
        .map(|(name, err)| format!("  {name}: {err}"))
        .collect::<Vec<_>>()
        .join("\n");
    let code = report.failures.iter().map(|(_, e)| e.exit_code()).max().unwrap_or(4);

    if report.series.is_empty() {
        return Err(AppError::new(code, format!("Every indicator failed to fetch:\n{summary}")));
    }
    if !allow_partial {
        return Err(AppError::new(
            code,
            format!(
                "{} indicator(s) failed to fetch; nothing was stored (use --allow-partial to continue):\n{summary}",
                report.failures.len()
            ),
        ));
    }

    for (name, err) in &report.failures {
        warn!(indicator = %name, error = %err, "continuing without indicator");
    }
    Ok(report)
}

/// Read back everything stored at `db_path` and pivot it.
pub fn load_stored(db_path: &Path) -> Result<StoredData, AppError> {
    let store = IndicatorStore::open(db_path)?;
    let rows = store.load()?;
    let table = pivot(&rows)?;
    Ok(StoredData { rows, table })
}
