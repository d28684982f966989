//! Feature extraction and ensemble scoring

mod ensemble;
mod features;
mod single;

pub use ensemble::{tally_votes, EnsembleConfig, EnsemblePredictor};
pub use features::{ChannelStats, FeatureExtractor, MIN_SAMPLES, RATIO_EPSILON, STATISTICS};
pub use single::{reindex, SingleModelPredictor, DEFAULT_HARD_LABEL_CONFIDENCE};

#[cfg(test)]
mod tests;
