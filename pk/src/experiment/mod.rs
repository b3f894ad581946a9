//! Experiment bucketing

mod bucket;
mod registry;

pub use bucket::{SplitTable, bucket, hash_unit};
pub use registry::{ExperimentError, ExperimentRegistry, ExperimentSplit, StaticRegistry};
