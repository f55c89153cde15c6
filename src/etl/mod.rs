//! In-memory stages of the pipeline: alignment and transformation.

pub mod merge;
pub mod transform;

pub use merge::merge;
pub use transform::{TransformConfig, transform};
