//! Input/output helpers.
//!
//! - pivot table exports (CSV) (`export`)

pub mod export;

pub use export::*;
