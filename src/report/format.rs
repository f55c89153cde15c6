//! Formatted terminal output for pipeline runs and stored series.
//!
//! We keep formatting code in one place so:
//! - the pipeline code stays free of printing
//! - output changes are localized (important for snapshot tests)

use chrono::NaiveDate;

use crate::app::pipeline::EtlRun;
use crate::config::AppConfig;

/// Format the run summary (range, columns, per-column coverage, failures).
pub fn format_run_summary(run: &EtlRun, config: &AppConfig) -> String {
    let mut out = String::new();

    out.push_str("=== econ - Economic Indicators ETL ===\n");
    out.push_str(&format!("Range: {} .. {} ({:?})\n", config.start, config.end, config.period));
    out.push_str(&format!("Store: {}\n", config.db_path.display()));

    let (first, last) = match (run.frame.dates().first(), run.frame.dates().last()) {
        (Some(a), Some(b)) => (a.to_string(), b.to_string()),
        _ => ("-".to_string(), "-".to_string()),
    };
    out.push_str(&format!(
        "Periods: n={} | {first} .. {last}\n",
        run.frame.len()
    ));
    out.push_str(&format!(
        "Rows: written={} | stored={}\n",
        run.rows_written,
        run.stored.rows.len()
    ));

    out.push_str("\nColumns:\n");
    out.push_str(&format!("{:<24} {:>8} {:>12} {:>14}", "column", "non-null", "first", "latest"));
    out.push('\n');
    out.push_str(&format!("{:-<24} {:-<8} {:-<12} {:-<14}", "", "", "", ""));
    out.push('\n');
    for col in run.frame.columns() {
        let non_null = col.values.iter().filter(|v| v.is_some()).count();
        let first = run
            .frame
            .dates()
            .iter()
            .zip(&col.values)
            .find(|(_, v)| v.is_some())
            .map(|(d, _)| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let latest = col.values.iter().rev().find_map(|v| *v);
        out.push_str(
            format!(
                "{:<24} {:>8} {:>12} {:>14}",
                truncate(col.label(), 24),
                non_null,
                first,
                fmt_value(latest),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    if !run.failures.is_empty() {
        out.push_str("\nSkipped (fetch failed):\n");
        for (name, err) in &run.failures {
            out.push_str(&format!("- {name}: {err}\n"));
        }
    }

    out
}

/// Format one stored series as a two-column table.
pub fn format_series_table(name: &str, series: &[(NaiveDate, Option<f64>)]) -> String {
    if series.is_empty() {
        return format!("No data for indicator '{name}'.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("{name} (n={})\n", series.len()));
    out.push_str(&format!("{:<12} {:>14}\n", "date", "value"));
    out.push_str(&format!("{:-<12} {:-<14}\n", "", ""));
    for (date, value) in series {
        out.push_str(&format!("{:<12} {:>14}\n", date.to_string(), fmt_value(*value)));
    }
    out
}

/// One indicator label per line.
pub fn format_indicator_list(names: &[String]) -> String {
    if names.is_empty() {
        return "No indicators stored.\n".to_string();
    }
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

pub fn fmt_value(v: Option<f64>) -> String {
    match v {
        Some(v) if v.abs() >= 1e5 => format!("{v:.1}"),
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
