//! Remote data sources.

pub mod fred;

pub use fred::{FetchReport, FredClient, ObservationSource, fetch_all, parse_observations};
