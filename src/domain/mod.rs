//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - catalog entries and raw observations (`Indicator`, `Observation`)
//! - the wide, date-indexed table (`WideFrame`, `Column`, `ColumnKey`)
//! - the persisted long shape (`LongRow`)
//! - transform settings (`Period`, `DerivedMetric`)

pub mod types;

pub use types::*;
