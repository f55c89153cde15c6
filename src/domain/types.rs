//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - built by the fetch/merge/transform stages
//! - flattened into long rows for storage
//! - rebuilt into display tables by the presenter

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// A display name mapped 1:1 to a provider series code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub series_id: String,
}

impl Indicator {
    pub fn new(name: impl Into<String>, series_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            series_id: series_id.into(),
        }
    }
}

/// One dated observation of a single series. `None` means "missing".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self { date, value }
    }
}

/// Resampling granularity.
///
/// Each period is labelled by its last calendar day (month-end, quarter-end,
/// year-end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Month,
    Quarter,
    Year,
}

impl Period {
    /// Number of periods in one calendar year (the year-over-year lag).
    pub fn periods_per_year(self) -> usize {
        match self {
            Period::Month => 12,
            Period::Quarter => 4,
            Period::Year => 1,
        }
    }

    /// Last day of the period containing `date`.
    pub fn period_end(self, date: NaiveDate) -> NaiveDate {
        let year = date.year();
        match self {
            Period::Month => month_end(year, date.month()),
            Period::Quarter => month_end(year, date.month().div_ceil(3) * 3),
            Period::Year => month_end(year, 12),
        }
    }

    /// Period end immediately following the period ending at `end`.
    pub fn next_end(self, end: NaiveDate) -> Option<NaiveDate> {
        end.succ_opt().map(|d| self.period_end(d))
    }
}

fn month_end(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month >= 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// How a derived column is computed from its base column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedKind {
    /// Percent change against the same period one year earlier.
    YearOverYear,
    /// Percent change against `periods` rows earlier.
    PercentChange { periods: usize },
    /// Trailing mean over `window` rows.
    MovingAverage { window: usize },
}

/// A named column computed from one base indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    pub base: String,
    #[serde(flatten)]
    pub kind: DerivedKind,
}

impl DerivedMetric {
    pub fn new(name: impl Into<String>, base: impl Into<String>, kind: DerivedKind) -> Self {
        Self {
            name: name.into(),
            base: base.into(),
            kind,
        }
    }
}

/// Second level of a column's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Metric {
    /// The indicator's own (resampled, filled) values.
    Level,
    /// A derived metric, carrying its configured name.
    Derived(String),
}

/// Structured column identity: which indicator, and which metric of it.
///
/// The storage label is the indicator name for `Level` columns and the derived
/// metric's own name otherwise. Labels are never split back into parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    pub indicator: String,
    pub metric: Metric,
}

impl ColumnKey {
    pub fn level(indicator: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            metric: Metric::Level,
        }
    }

    pub fn derived(indicator: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            metric: Metric::Derived(name.into()),
        }
    }

    pub fn label(&self) -> &str {
        match &self.metric {
            Metric::Level => &self.indicator,
            Metric::Derived(name) => name,
        }
    }

    pub fn is_level(&self) -> bool {
        self.metric == Metric::Level
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: ColumnKey,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(key: ColumnKey, values: Vec<Option<f64>>) -> Self {
        Self { key, values }
    }

    pub fn label(&self) -> &str {
        self.key.label()
    }
}

/// Date-indexed table with one column per indicator or derived metric.
///
/// # Invariants
/// - `dates` is strictly ascending.
/// - every column holds exactly `dates.len()` values.
/// - column labels are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WideFrame {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl WideFrame {
    /// Build a frame, checking every invariant.
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<Column>) -> Result<Self, EtlError> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EtlError::DataIntegrity(
                "frame dates must be strictly ascending".to_string(),
            ));
        }
        let mut frame = Self {
            dates,
            columns: Vec::with_capacity(columns.len()),
        };
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.label() == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(Column::label).collect()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Value at `(date, label)`, flattening "absent" and "null" to `None`.
    pub fn value(&self, date: NaiveDate, label: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        self.column(label).and_then(|c| c.values[row])
    }

    /// Mutable access to column values; lengths cannot change.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut [Option<f64>]> {
        self.columns.iter_mut().map(|c| c.values.as_mut_slice())
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), EtlError> {
        if column.values.len() != self.dates.len() {
            return Err(EtlError::DataIntegrity(format!(
                "column '{}' has {} values for {} dates",
                column.label(),
                column.values.len(),
                self.dates.len()
            )));
        }
        if self.column(column.label()).is_some() {
            return Err(EtlError::DataIntegrity(format!(
                "duplicate column '{}'",
                column.label()
            )));
        }
        self.columns.push(column);
        Ok(())
    }
}

/// The persisted shape: one value per (date, indicator label).
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub date: NaiveDate,
    pub indicator: String,
    pub value: Option<f64>,
}

impl LongRow {
    pub fn new(date: NaiveDate, indicator: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            date,
            indicator: indicator.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_ends() {
        assert_eq!(Period::Month.period_end(d(2024, 2, 10)), d(2024, 2, 29));
        assert_eq!(Period::Month.period_end(d(2023, 12, 1)), d(2023, 12, 31));
        assert_eq!(Period::Quarter.period_end(d(2023, 5, 1)), d(2023, 6, 30));
        assert_eq!(Period::Quarter.period_end(d(2023, 10, 1)), d(2023, 12, 31));
        assert_eq!(Period::Year.period_end(d(2023, 5, 1)), d(2023, 12, 31));
        assert_eq!(Period::Month.next_end(d(2023, 12, 31)), Some(d(2024, 1, 31)));
        assert_eq!(Period::Quarter.next_end(d(2023, 3, 31)), Some(d(2023, 6, 30)));
    }

    #[test]
    fn column_labels_follow_metric() {
        assert_eq!(ColumnKey::level("GDP").label(), "GDP");
        assert_eq!(ColumnKey::derived("GDP", "GDP_YoY").label(), "GDP_YoY");
        assert!(ColumnKey::level("GDP").is_level());
    }

    #[test]
    fn frame_rejects_duplicate_labels_and_bad_lengths() {
        let dates = vec![d(2021, 1, 31), d(2021, 2, 28)];
        let dup = WideFrame::new(
            dates.clone(),
            vec![
                Column::new(ColumnKey::level("A"), vec![None, None]),
                Column::new(ColumnKey::derived("B", "A"), vec![None, None]),
            ],
        );
        assert!(matches!(dup, Err(EtlError::DataIntegrity(_))));

        let short = WideFrame::new(dates, vec![Column::new(ColumnKey::level("A"), vec![None])]);
        assert!(matches!(short, Err(EtlError::DataIntegrity(_))));

        let unsorted = WideFrame::new(vec![d(2021, 2, 28), d(2021, 1, 31)], vec![]);
        assert!(unsorted.is_err());
    }

    #[test]
    fn derived_metric_reads_from_toml() {
        let m: DerivedMetric = toml::from_str(
            "name = \"Unemployment_MA3\"\nbase = \"Unemployment Rate\"\nkind = \"moving_average\"\nwindow = 3\n",
        )
        .unwrap();
        assert_eq!(m.kind, DerivedKind::MovingAverage { window: 3 });

        let m: DerivedMetric =
            toml::from_str("name = \"GDP_YoY\"\nbase = \"GDP\"\nkind = \"year_over_year\"\n").unwrap();
        assert_eq!(m.kind, DerivedKind::YearOverYear);
    }
}
