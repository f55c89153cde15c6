//! Display-side adapters over stored long rows.
//!
//! Everything here is a pure function of its input rows, so a UI can call it
//! again whenever the selection changes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::domain::LongRow;
use crate::error::EtlError;

/// Wide table rebuilt from long rows: ascending dates, one column per label.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PivotTable {
    dates: Vec<NaiveDate>,
    labels: Vec<String>,
    /// `values[c][r]` is column `c` at date `r`.
    values: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn value(&self, date: NaiveDate, label: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        let col = self.labels.iter().position(|l| l == label)?;
        self.values[col][row]
    }

    /// One column as `(date, value)` pairs, or `None` for an unknown label.
    pub fn column(&self, label: &str) -> Option<Vec<(NaiveDate, Option<f64>)>> {
        let col = self.labels.iter().position(|l| l == label)?;
        Some(self.dates.iter().copied().zip(self.values[col].iter().copied()).collect())
    }
}

/// Rebuild a wide table from long rows.
///
/// Fails with `DataIntegrity` if any (date, indicator) key occurs twice.
pub fn pivot(rows: &[LongRow]) -> Result<PivotTable, EtlError> {
    let mut cells: BTreeMap<(&str, NaiveDate), Option<f64>> = BTreeMap::new();
    for row in rows {
        if cells.insert((row.indicator.as_str(), row.date), row.value).is_some() {
            return Err(EtlError::DataIntegrity(format!(
                "duplicate row for ({}, {})",
                row.date, row.indicator
            )));
        }
    }

    let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect::<BTreeSet<_>>().into_iter().collect();
    let labels = indicator_names(rows);
    let values = labels
        .iter()
        .map(|label| {
            dates
                .iter()
                .map(|d| cells.get(&(label.as_str(), *d)).copied().flatten())
                .collect()
        })
        .collect();

    Ok(PivotTable { dates, labels, values })
}

/// Rows for one indicator, sorted by date. Unknown names give an empty vec.
pub fn select_series(rows: &[LongRow], indicator: &str) -> Vec<(NaiveDate, Option<f64>)> {
    let mut out: Vec<_> = rows
        .iter()
        .filter(|r| r.indicator == indicator)
        .map(|r| (r.date, r.value))
        .collect();
    out.sort_by_key(|(d, _)| *d);
    out
}

/// Distinct indicator labels, sorted.
pub fn indicator_names(rows: &[LongRow]) -> Vec<String> {
    rows.iter()
        .map(|r| r.indicator.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rows() -> Vec<LongRow> {
        vec![
            LongRow::new(d(2021, 2, 28), "GDP", Some(101.0)),
            LongRow::new(d(2021, 1, 31), "UNRATE", Some(6.4)),
            LongRow::new(d(2021, 1, 31), "GDP", Some(100.0)),
            LongRow::new(d(2021, 2, 28), "GDP_YoY", None),
        ]
    }

    #[test]
    fn pivot_builds_sorted_wide_table() {
        let table = pivot(&rows()).unwrap();
        assert_eq!(table.dates(), &[d(2021, 1, 31), d(2021, 2, 28)]);
        assert_eq!(table.labels(), &["GDP", "GDP_YoY", "UNRATE"]);
        assert_eq!(table.value(d(2021, 1, 31), "GDP"), Some(100.0));
        assert_eq!(table.value(d(2021, 2, 28), "UNRATE"), None);
        assert_eq!(
            table.column("GDP").unwrap(),
            vec![(d(2021, 1, 31), Some(100.0)), (d(2021, 2, 28), Some(101.0))]
        );
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn pivot_rejects_duplicate_keys() {
        let mut r = rows();
        r.push(LongRow::new(d(2021, 1, 31), "GDP", Some(99.0)));
        assert!(matches!(pivot(&r), Err(EtlError::DataIntegrity(_))));
    }

    #[test]
    fn select_series_sorts_and_filters() {
        assert_eq!(
            select_series(&rows(), "GDP"),
            vec![(d(2021, 1, 31), Some(100.0)), (d(2021, 2, 28), Some(101.0))]
        );
    }

    #[test]
    fn select_absent_indicator_is_empty() {
        assert!(select_series(&rows(), "Housing Starts").is_empty());
        assert!(select_series(&[], "GDP").is_empty());
    }

    #[test]
    fn names_are_distinct_and_sorted() {
        assert_eq!(indicator_names(&rows()), vec!["GDP", "GDP_YoY", "UNRATE"]);
        assert!(pivot(&[]).unwrap().is_empty());
    }
}
