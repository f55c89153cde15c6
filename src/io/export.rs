//! Export the pivoted indicator table to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts:
//! one row per date, one column per indicator label, empty cells for missing values.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::AppError;
use crate::present::PivotTable;

/// Write `table` to a CSV file at `path`.
pub fn write_pivot_csv(path: &Path, table: &PivotTable) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    write_pivot(&mut out, table)
        .and_then(|()| out.flush())
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display())))
}

fn write_pivot<W: Write>(out: &mut W, table: &PivotTable) -> std::io::Result<()> {
    let header: Vec<String> = std::iter::once("date".to_string())
        .chain(table.labels().iter().map(|l| csv_field(l)))
        .collect();
    writeln!(out, "{}", header.join(","))?;

    for &date in table.dates() {
        let mut fields = vec![date.to_string()];
        for label in table.labels() {
            fields.push(table.value(date, label).map(|v| v.to_string()).unwrap_or_default());
        }
        writeln!(out, "{}", fields.join(","))?;
    }
    Ok(())
}

/// Quote a field if it contains a delimiter, quote, or line break.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
