//! Resample, forward-fill, and derived metrics.
//!
//! `transform` is a pure function of its input frame and [`TransformConfig`]:
//!
//! 1. resample to one row per period end (last non-null value per period)
//! 2. forward-fill each column independently (no backward fill)
//! 3. append derived columns computed from the filled base columns

use chrono::NaiveDate;
use tracing::warn;

use crate::domain::{Column, ColumnKey, DerivedKind, DerivedMetric, Period, WideFrame};
use crate::error::EtlError;

#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    pub period: Period,
    pub derived: Vec<DerivedMetric>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            period: Period::Month,
            derived: Vec::new(),
        }
    }
}

pub fn transform(frame: &WideFrame, config: &TransformConfig) -> Result<WideFrame, EtlError> {
    let mut out = resample(frame, config.period)?;
    forward_fill(&mut out);
    derive(out, &config.derived, config.period)
}

/// Collapse to one row per period, dated at the period end.
///
/// Every period between the first and last observed one gets a row, even if
/// no column has data there.
pub fn resample(frame: &WideFrame, period: Period) -> Result<WideFrame, EtlError> {
    let ends = period_ends(frame.dates(), period);

    let slot_of: Vec<usize> = frame
        .dates()
        .iter()
        .map(|d| {
            let end = period.period_end(*d);
            ends.binary_search(&end).unwrap_or(0)
        })
        .collect();

    let columns = frame
        .columns()
        .iter()
        .map(|col| {
            let mut values = vec![None; ends.len()];
            for (row, v) in col.values.iter().enumerate() {
                if v.is_some() {
                    values[slot_of[row]] = *v;
                }
            }
            Column::new(col.key.clone(), values)
        })
        .collect();

    WideFrame::new(ends, columns)
}

fn period_ends(dates: &[NaiveDate], period: Period) -> Vec<NaiveDate> {
    let (Some(first), Some(last)) = (dates.first(), dates.last()) else {
        return Vec::new();
    };
    let last = period.period_end(*last);
    let mut out = Vec::new();
    let mut cur = Some(period.period_end(*first));
    while let Some(end) = cur {
        if end > last {
            break;
        }
        out.push(end);
        cur = period.next_end(end);
    }
    out
}

/// Replace each `None` with the nearest earlier value in the same column.
pub fn forward_fill(frame: &mut WideFrame) {
    for values in frame.values_mut() {
        let mut last = None;
        for v in values.iter_mut() {
            match *v {
                Some(x) => last = Some(x),
                None => *v = last,
            }
        }
    }
}

/// Append one column per derived metric whose base column is present.
pub fn derive(mut frame: WideFrame, metrics: &[DerivedMetric], period: Period) -> Result<WideFrame, EtlError> {
    for m in metrics {
        let Some(base) = frame.column(&m.base).filter(|c| c.key.is_level()) else {
            warn!(metric = %m.name, base = %m.base, "base column missing, derived metric skipped");
            continue;
        };
        let values = match m.kind {
            DerivedKind::YearOverYear => pct_change(&base.values, period.periods_per_year()),
            DerivedKind::PercentChange { periods } => pct_change(&base.values, periods),
            DerivedKind::MovingAverage { window } => rolling_mean(&base.values, window),
        };
        frame.push_column(Column::new(ColumnKey::derived(m.base.clone(), m.name.clone()), values))?;
    }
    Ok(frame)
}

/// `(v[t] - v[t-lag]) / v[t-lag]`; `None` when either side is missing or the
/// denominator is zero.
pub fn pct_change(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            if lag == 0 || t < lag {
                return None;
            }
            let (cur, prev) = (values[t]?, values[t - lag]?);
            if prev == 0.0 {
                return None;
            }
            let r = (cur - prev) / prev;
            r.is_finite().then_some(r)
        })
        .collect()
}

/// Trailing mean of `window` values; `None` until the window is full of data.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            if window == 0 || t + 1 < window {
                return None;
            }
            let mut sum = 0.0;
            for v in &values[t + 1 - window..=t] {
                sum += (*v)?;
            }
            Some(sum / window as f64)
        })
        .collect()
}
