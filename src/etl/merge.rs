//! Outer-join alignment of named series into one wide frame.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::domain::{Column, ColumnKey, Observation, WideFrame};
use crate::error::EtlError;

/// Merge named series on date.
///
/// The resulting index is the sorted union of every input date. Columns keep
/// the input order. Dates missing from a series are `None` in its column; a
/// date repeated within one series keeps its last occurrence.
pub fn merge(series: &[(String, Vec<Observation>)]) -> Result<WideFrame, EtlError> {
    let mut seen = HashSet::new();
    for (name, _) in series {
        if !seen.insert(name.as_str()) {
            return Err(EtlError::DataIntegrity(format!("indicator '{name}' supplied twice")));
        }
    }

    let dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|(_, obs)| obs.iter().map(|o| o.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let columns = series
        .iter()
        .map(|(name, obs)| {
            let by_date: BTreeMap<NaiveDate, Option<f64>> = obs.iter().map(|o| (o.date, o.value)).collect();
            let values = dates.iter().map(|d| by_date.get(d).copied().flatten()).collect();
            Column::new(ColumnKey::level(name.clone()), values)
        })
        .collect();

    WideFrame::new(dates, columns)
}
