//! Reporting utilities: run summaries and stored-series tables.

pub mod format;

pub use format::*;
