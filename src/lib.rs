//! `econ-dash` library crate.
//!
//! The binary (`econ`) is a thin wrapper around this library so that:
//!
//! - the ETL stages (fetch, merge, transform, store) are testable without a network
//! - the dashboard and the plain-text reports share one data path
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod etl;
pub mod io;
pub mod plot;
pub mod present;
pub mod report;
pub mod store;
pub mod tui;
