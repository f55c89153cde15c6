//! SQLite persistence of indicator values in long form.
//!
//! Table layout:
//!
//! ```sql
//! indicators(date TEXT NOT NULL, indicator TEXT NOT NULL, value REAL)
//! UNIQUE INDEX idx_indicators_date_indicator ON indicators(date, indicator)
//! ```
//!
//! Writes are idempotent upserts on `(date, indicator)`: re-running the
//! pipeline overwrites values in place and never duplicates rows, and keys
//! absent from the new frame keep their previous values.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::domain::{LongRow, WideFrame};
use crate::error::EtlError;

const DATE_FORMAT: &str = "%Y-%m-%d";

const TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS indicators (
    date TEXT NOT NULL,
    indicator TEXT NOT NULL,
    value REAL
);
";

// Legacy writers stored `YYYY-MM-DD HH:MM:SS`. A timestamped row whose day
// already has a plain-date row for the same indicator is superseded by it.
const DROP_SUPERSEDED_SQL: &str = "
DELETE FROM indicators
WHERE length(date) > 10
  AND EXISTS (
    SELECT 1 FROM indicators AS plain
    WHERE plain.indicator = indicators.indicator
      AND plain.date = substr(indicators.date, 1, 10)
  )
";

const NORMALIZE_DATES_SQL: &str = "
UPDATE indicators SET date = substr(date, 1, 10) WHERE length(date) > 10
";

const INDEX_SQL: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS idx_indicators_date_indicator
    ON indicators(date, indicator);
";

const UPSERT_SQL: &str = "
INSERT INTO indicators (date, indicator, value) VALUES (?1, ?2, ?3)
ON CONFLICT(date, indicator) DO UPDATE SET value = excluded.value
";

/// Flatten every column of `frame` (derived ones included) into long rows.
///
/// Exactly one row per (date, column label); `None` values are kept as rows.
pub fn to_long_rows(frame: &WideFrame) -> Vec<LongRow> {
    let mut rows = Vec::with_capacity(frame.len() * frame.columns().len());
    for col in frame.columns() {
        for (date, value) in frame.dates().iter().zip(&col.values) {
            rows.push(LongRow::new(*date, col.label(), *value));
        }
    }
    rows
}

/// Exclusive handle on the indicator database. Dropping it closes the file.
pub struct IndicatorStore {
    conn: Connection,
}

impl IndicatorStore {
    /// Open (or create) the database at `path`, creating the table lazily.
    pub fn open(path: &Path) -> Result<Self, EtlError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EtlError::Storage(format!("failed to create '{}': {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened indicator store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, EtlError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Create the schema and upgrade legacy tables in one transaction.
    ///
    /// Timestamped dates are cut to `YYYY-MM-DD` before the unique index is
    /// built, so old and new rows share keys. Rows that still collide after
    /// that fail the open with `Storage`.
    fn init(mut conn: Connection) -> Result<Self, EtlError> {
        let tx = conn.transaction()?;
        tx.execute_batch(TABLE_SQL)?;
        let dropped = tx.execute(DROP_SUPERSEDED_SQL, [])?;
        let normalized = tx.execute(NORMALIZE_DATES_SQL, [])?;
        tx.execute_batch(INDEX_SQL)?;
        tx.commit()?;
        if dropped + normalized > 0 {
            info!(dropped, normalized, "upgraded legacy timestamp dates");
        }
        Ok(Self { conn })
    }

    /// Upsert every (date, column) of `frame` in a single transaction.
    ///
    /// Returns the number of rows written.
    pub fn save(&mut self, frame: &WideFrame) -> Result<usize, EtlError> {
        let rows = to_long_rows(frame);
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for row in &rows {
                stmt.execute(params![
                    row.date.format(DATE_FORMAT).to_string(),
                    row.indicator,
                    row.value
                ])?;
            }
        }
        tx.commit()?;
        info!(rows = rows.len(), columns = frame.columns().len(), "saved indicator rows");
        Ok(rows.len())
    }

    /// Every stored row. Order is unspecified.
    pub fn load(&self) -> Result<Vec<LongRow>, EtlError> {
        let mut stmt = self.conn.prepare("SELECT date, indicator, value FROM indicators")?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(date, indicator, value)| {
                let date = parse_stored_date(&date)?;
                Ok(LongRow::new(date, indicator, value))
            })
            .collect()
    }

    /// Distinct stored indicator labels, sorted.
    pub fn indicator_names(&self) -> Result<Vec<String>, EtlError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT indicator FROM indicators ORDER BY indicator")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn row_count(&self) -> Result<usize, EtlError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM indicators", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }
}

/// Stored dates are ISO `YYYY-MM-DD`; legacy rows may carry a time suffix.
fn parse_stored_date(raw: &str) -> Result<NaiveDate, EtlError> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, DATE_FORMAT)
        .map_err(|e| EtlError::Storage(format!("invalid stored date '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Column, ColumnKey};
    use crate::present::pivot;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_frame() -> WideFrame {
        WideFrame::new(
            vec![d(2021, 1, 31), d(2021, 2, 28), d(2021, 3, 31)],
            vec![
                Column::new(ColumnKey::level("GDP"), vec![Some(100.0), Some(100.0), Some(110.0)]),
                Column::new(ColumnKey::level("Unemployment Rate"), vec![None, Some(6.2), Some(6.0)]),
                Column::new(ColumnKey::derived("GDP", "GDP_YoY"), vec![None, None, None]),
            ],
        )
        .unwrap()
    }

    fn sorted(mut rows: Vec<LongRow>) -> Vec<LongRow> {
        rows.sort_by(|a, b| (a.date, &a.indicator).cmp(&(b.date, &b.indicator)));
        rows
    }

    #[test]
    fn long_rows_cover_every_cell() {
        let frame = sample_frame();
        let rows = to_long_rows(&frame);
        assert_eq!(rows.len(), 9);
        assert!(rows.contains(&LongRow::new(d(2021, 1, 31), "Unemployment Rate", None)));
        assert!(rows.contains(&LongRow::new(d(2021, 3, 31), "GDP", Some(110.0))));
    }

    #[test]
    fn save_is_idempotent() {
        let mut store = IndicatorStore::open_in_memory().unwrap();
        let frame = sample_frame();
        store.save(&frame).unwrap();
        let first = sorted(store.load().unwrap());
        store.save(&frame).unwrap();
        let second = sorted(store.load().unwrap());
        assert_eq!(first, second);
        assert_eq!(store.row_count().unwrap(), 9);
    }

    #[test]
    fn upsert_overwrites_values_and_keeps_history() {
        let mut store = IndicatorStore::open_in_memory().unwrap();
        store.save(&sample_frame()).unwrap();

        let revised = WideFrame::new(
            vec![d(2021, 3, 31), d(2021, 4, 30)],
            vec![Column::new(ColumnKey::level("GDP"), vec![Some(111.0), Some(112.0)])],
        )
        .unwrap();
        store.save(&revised).unwrap();

        let rows = store.load().unwrap();
        assert_eq!(rows.len(), 10);
        let gdp_march: Vec<_> = rows
            .iter()
            .filter(|r| r.indicator == "GDP" && r.date == d(2021, 3, 31))
            .collect();
        assert_eq!(gdp_march.len(), 1);
        assert_eq!(gdp_march[0].value, Some(111.0));
        assert!(rows.iter().any(|r| r.indicator == "GDP" && r.date == d(2021, 1, 31)));
    }

    #[test]
    fn round_trip_through_file_reproduces_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("econ.db");
        let frame = sample_frame();
        {
            let mut store = IndicatorStore::open(&path).unwrap();
            store.save(&frame).unwrap();
        }
        let store = IndicatorStore::open(&path).unwrap();
        let table = pivot(&store.load().unwrap()).unwrap();

        assert_eq!(table.dates(), frame.dates());
        for col in frame.columns() {
            for (date, value) in frame.dates().iter().zip(&col.values) {
                assert_eq!(table.value(*date, col.label()), *value, "{} @ {date}", col.label());
            }
        }
        assert_eq!(
            store.indicator_names().unwrap(),
            vec!["GDP", "GDP_YoY", "Unemployment Rate"]
        );
    }

    #[test]
    fn legacy_table_without_index_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE indicators (date TEXT, indicator TEXT, value REAL);
                 INSERT INTO indicators VALUES ('2021-01-31 00:00:00', 'GDP_value', 1.5);",
            )
            .unwrap();
        }
        let mut store = IndicatorStore::open(&path).unwrap();
        let rows = store.load().unwrap();
        assert_eq!(rows, vec![LongRow::new(d(2021, 1, 31), "GDP_value", Some(1.5))]);
        store.save(&sample_frame()).unwrap();
        store.save(&sample_frame()).unwrap();
        assert_eq!(store.row_count().unwrap(), 10);
    }

    fn legacy_store(path: &Path, date_type: &str, rows: &[(&str, &str, f64)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE indicators (date {date_type}, indicator TEXT, value REAL);"
        ))
        .unwrap();
        for (date, indicator, value) in rows {
            conn.execute(
                "INSERT INTO indicators VALUES (?1, ?2, ?3)",
                params![date, indicator, value],
            )
            .unwrap();
        }
    }

    #[test]
    fn timestamped_legacy_rows_are_overwritten_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("economic_indicators.db");
        legacy_store(&path, "TIMESTAMP", &[("2021-01-31 00:00:00", "GDP_YoY", 0.05)]);

        let revised = WideFrame::new(
            vec![d(2021, 1, 31)],
            vec![Column::new(ColumnKey::derived("GDP", "GDP_YoY"), vec![Some(0.06)])],
        )
        .unwrap();
        {
            let mut store = IndicatorStore::open(&path).unwrap();
            store.save(&revised).unwrap();
        }

        let store = IndicatorStore::open(&path).unwrap();
        let rows = store.load().unwrap();
        assert_eq!(rows, vec![LongRow::new(d(2021, 1, 31), "GDP_YoY", Some(0.06))]);
        let table = pivot(&rows).unwrap();
        assert_eq!(table.value(d(2021, 1, 31), "GDP_YoY"), Some(0.06));
    }

    #[test]
    fn mixed_date_shapes_for_one_day_collapse_to_the_plain_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.db");
        legacy_store(
            &path,
            "TEXT",
            &[
                ("2021-01-31 00:00:00", "GDP", 1.0),
                ("2021-01-31", "GDP", 2.0),
                ("2021-02-28 00:00:00", "GDP", 3.0),
            ],
        );

        let store = IndicatorStore::open(&path).unwrap();
        let rows = sorted(store.load().unwrap());
        assert_eq!(
            rows,
            vec![
                LongRow::new(d(2021, 1, 31), "GDP", Some(2.0)),
                LongRow::new(d(2021, 2, 28), "GDP", Some(3.0)),
            ]
        );
        assert!(pivot(&rows).is_ok());
    }

    #[test]
    fn same_day_timestamps_fail_with_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clash.db");
        legacy_store(
            &path,
            "TEXT",
            &[("2021-01-31 00:00:00", "GDP", 1.0), ("2021-01-31 12:00:00", "GDP", 2.0)],
        );
        let err = IndicatorStore::open(&path).err().unwrap();
        assert!(matches!(err, EtlError::Storage(_)));

        // The failed upgrade is rolled back.
        let conn = Connection::open(&path).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM indicators WHERE length(date) > 10", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn legacy_duplicates_fail_with_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dupes.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE indicators (date TEXT, indicator TEXT, value REAL);
                 INSERT INTO indicators VALUES ('2021-01-31', 'GDP', 1.0);
                 INSERT INTO indicators VALUES ('2021-01-31', 'GDP', 2.0);",
            )
            .unwrap();
        }
        let err = IndicatorStore::open(&path).err().unwrap();
        assert!(matches!(err, EtlError::Storage(_)));
    }

    #[test]
    fn bad_stored_date_is_storage_error() {
        let store = IndicatorStore::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO indicators VALUES ('garbage', 'GDP', 1.0)", [])
            .unwrap();
        assert!(matches!(store.load(), Err(EtlError::Storage(_))));
    }
}
