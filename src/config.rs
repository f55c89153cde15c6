//! Run configuration: indicator catalog, derived metrics, date range, storage
//! path and fetch hardening knobs.
//!
//! Values come from (highest precedence first) CLI flags, an optional TOML
//! file, and the built-in defaults below. The API credential is kept apart
//! from everything else and only read by commands that hit the network.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::{DerivedKind, DerivedMetric, Indicator, Period};
use crate::error::AppError;

pub const DEFAULT_DB_PATH: &str = "economic_indicators.db";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

const API_KEY_VAR: &str = "FRED_API_KEY";

/// FRED API credential. `Debug` never prints the secret.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Read `FRED_API_KEY` from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let key = std::env::var(API_KEY_VAR)
            .map_err(|_| AppError::new(2, "Missing FRED_API_KEY in environment (.env)."))?;
        if key.trim().is_empty() {
            return Err(AppError::new(2, "FRED_API_KEY is empty."));
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Immutable display-name → series-code mapping, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    indicators: Vec<Indicator>,
}

impl Catalog {
    pub fn new(indicators: Vec<Indicator>) -> Result<Self, AppError> {
        if indicators.is_empty() {
            return Err(AppError::new(2, "Indicator catalog is empty."));
        }
        let mut names = HashSet::new();
        let mut codes = HashSet::new();
        for ind in &indicators {
            if ind.name.trim().is_empty() || ind.series_id.trim().is_empty() {
                return Err(AppError::new(2, "Indicator names and series ids must be non-empty."));
            }
            if !names.insert(ind.name.as_str()) {
                return Err(AppError::new(2, format!("Duplicate indicator name '{}'.", ind.name)));
            }
            if !codes.insert(ind.series_id.as_str()) {
                return Err(AppError::new(
                    2,
                    format!("Series id '{}' is mapped more than once.", ind.series_id),
                ));
            }
        }
        Ok(Self { indicators })
    }

    /// The four headline US series: output, unemployment, prices, policy rate.
    pub fn fred_default() -> Self {
        Self {
            indicators: vec![
                Indicator::new("GDP", "GDP"),
                Indicator::new("Unemployment Rate", "UNRATE"),
                Indicator::new("Inflation Rate", "CPIAUCSL"),
                Indicator::new("Federal Funds Rate", "FEDFUNDS"),
            ],
        }
    }

    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    pub fn get(&self, name: &str) -> Option<&Indicator> {
        self.indicators.iter().find(|i| i.name == name)
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }
}

pub fn default_derived() -> Vec<DerivedMetric> {
    vec![
        DerivedMetric::new("GDP_YoY", "GDP", DerivedKind::YearOverYear),
        DerivedMetric::new("Inflation_YoY", "Inflation Rate", DerivedKind::YearOverYear),
        DerivedMetric::new(
            "Unemployment_MA3",
            "Unemployment Rate",
            DerivedKind::MovingAverage { window: 3 },
        ),
    ]
}

pub fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Retry/timeout settings for the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
        }
    }
}

/// Shape of the optional TOML config file. Every key is optional.
///
/// ```toml
/// start = "2010-01-01"
/// period = "month"
/// db_path = "macro.db"
///
/// [[indicators]]
/// name = "GDP"
/// series_id = "GDP"
///
/// [[derived]]
/// name = "GDP_YoY"
/// base = "GDP"
/// kind = "year_over_year"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub indicators: Option<Vec<Indicator>>,
    pub derived: Option<Vec<DerivedMetric>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub period: Option<Period>,
    pub db_path: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub allow_partial: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::new(2, format!("Failed to read config '{}': {e}", path.display())))?;
        Self::parse(&raw)
            .map_err(|e| AppError::new(2, format!("Invalid config '{}': {e}", path.display())))
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

/// Fully resolved configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub catalog: Catalog,
    pub derived: Vec<DerivedMetric>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub period: Period,
    pub db_path: PathBuf,
    pub fetch: FetchSettings,
    pub allow_partial: bool,
}

impl AppConfig {
    /// Defaults, with `end` fixed to `today`.
    pub fn defaults(today: NaiveDate) -> Self {
        Self {
            catalog: Catalog::fred_default(),
            derived: default_derived(),
            start: default_start(),
            end: today,
            period: Period::Month,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            fetch: FetchSettings::default(),
            allow_partial: false,
        }
    }

    /// Layer a parsed config file over the defaults.
    pub fn from_file_config(file: FileConfig, today: NaiveDate) -> Result<Self, AppError> {
        let mut cfg = Self::defaults(today);
        if let Some(indicators) = file.indicators {
            cfg.catalog = Catalog::new(indicators)?;
            // Default derived metrics whose base left the catalog are dropped.
            if file.derived.is_none() {
                cfg.derived.retain(|m| cfg.catalog.get(&m.base).is_some());
            }
        }
        if let Some(derived) = file.derived {
            cfg.derived = derived;
        }
        if let Some(start) = file.start {
            cfg.start = start;
        }
        if let Some(end) = file.end {
            cfg.end = end;
        }
        if let Some(period) = file.period {
            cfg.period = period;
        }
        if let Some(db_path) = file.db_path {
            cfg.db_path = db_path;
        }
        if let Some(secs) = file.request_timeout_secs {
            cfg.fetch.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.max_attempts {
            cfg.fetch.max_attempts = n;
        }
        if let Some(ms) = file.retry_base_delay_ms {
            cfg.fetch.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(allow) = file.allow_partial {
            cfg.allow_partial = allow;
        }
        Ok(cfg)
    }

    /// Check cross-field invariants. Called after all overrides are applied.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.start > self.end {
            return Err(AppError::new(
                2,
                format!("Start date {} is after end date {}.", self.start, self.end),
            ));
        }
        if self.fetch.max_attempts == 0 {
            return Err(AppError::new(2, "max_attempts must be at least 1."));
        }
        if self.fetch.timeout.is_zero() {
            return Err(AppError::new(2, "Request timeout must be > 0."));
        }

        let mut labels: HashSet<&str> = self.catalog.indicators().iter().map(|i| i.name.as_str()).collect();
        for m in &self.derived {
            if self.catalog.get(&m.base).is_none() {
                return Err(AppError::new(
                    2,
                    format!("Derived metric '{}' references unknown indicator '{}'.", m.name, m.base),
                ));
            }
            if !labels.insert(m.name.as_str()) {
                return Err(AppError::new(
                    2,
                    format!("Derived metric name '{}' collides with another column.", m.name),
                ));
            }
            match m.kind {
                DerivedKind::PercentChange { periods: 0 } => {
                    return Err(AppError::new(2, format!("'{}': periods must be > 0.", m.name)));
                }
                DerivedKind::MovingAverage { window: 0 } => {
                    return Err(AppError::new(2, format!("'{}': window must be > 0.", m.name)));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
