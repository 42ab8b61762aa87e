//! Signal processing: rolling history windows and water-quality scoring

mod classifier;
mod history;

pub use classifier::{QualityClassifier, NO_DATA_ALERT};
pub use history::{fuse_temperatures, HistoryAggregator};
