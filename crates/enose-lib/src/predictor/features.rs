//! Feature extraction for ensemble inference
//!
//! Turns one sample window into per-channel summary statistics plus
//! cross-sensor ratios. Feature names match the columns stored in trained
//! artifacts (`MQ135_kurt`, `mq2_mq135_ratio`, `MQ7_qcm_ratio`, ...), and
//! every name is always present so re-indexing never meets a hole.

use crate::models::FeatureVector;
use crate::sensor::{Channel, SampleMatrix, NUM_CHANNELS};

/// Minimum number of samples required for a window to be scored
pub const MIN_SAMPLES: usize = 10;

/// Added to ratio denominators; fixed so training and inference agree
pub const RATIO_EPSILON: f64 = 1e-6;

/// Statistic suffixes, in feature order
pub const STATISTICS: [&str; 7] = ["mean", "std", "min", "max", "range", "skew", "kurt"];

/// Numerators of the `<x>_mq135_ratio` features
const MQ135_RATIO_CHANNELS: [Channel; 3] = [Channel::Mq2, Channel::Mq3, Channel::Mq4];

/// Floating-point noise floor for central moments
const MOMENT_EPSILON: f64 = 1e-14;

/// Summary statistics of one channel's column
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub skew: f64,
    pub kurt: f64,
}

impl ChannelStats {
    /// Compute statistics with the sample (n-1) standard deviation and
    /// bias-corrected skewness and excess kurtosis
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let (sum2, sum3, sum4) = values.iter().fold((0.0, 0.0, 0.0), |(s2, s3, s4), v| {
            let d = v - mean;
            let d2 = d * d;
            (s2 + d2, s3 + d2 * d, s4 + d2 * d2)
        });

        Self {
            mean,
            std: sample_std(sum2, n),
            min,
            max,
            skew: skewness(sum2, sum3, n),
            kurt: excess_kurtosis(sum2, sum4, n),
        }
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// Values in `STATISTICS` order
    pub fn values(&self) -> [f64; 7] {
        [
            self.mean,
            self.std,
            self.min,
            self.max,
            self.range(),
            self.skew,
            self.kurt,
        ]
    }
}

fn sample_std(sum2: f64, n: f64) -> f64 {
    if n < 2.0 {
        return 0.0;
    }
    (sum2 / (n - 1.0)).sqrt()
}

fn skewness(sum2: f64, sum3: f64, n: f64) -> f64 {
    if n < 3.0 {
        return 0.0;
    }
    let m2 = zero_out_noise(sum2 / n);
    let m3 = zero_out_noise(sum3 / n);
    if m2 == 0.0 {
        return 0.0;
    }
    let g1 = m3 / m2.powf(1.5);
    g1 * (n * (n - 1.0)).sqrt() / (n - 2.0)
}

fn excess_kurtosis(sum2: f64, sum4: f64, n: f64) -> f64 {
    if n < 4.0 {
        return 0.0;
    }
    let numerator = zero_out_noise(n * (n + 1.0) * (n - 1.0) * sum4);
    let denominator = zero_out_noise((n - 2.0) * (n - 3.0) * sum2 * sum2);
    if denominator == 0.0 {
        return 0.0;
    }
    let adjustment = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    numerator / denominator - adjustment
}

fn zero_out_noise(value: f64) -> f64 {
    if value.abs() < MOMENT_EPSILON {
        0.0
    } else {
        value
    }
}

/// Extracts named features from sample windows
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    channels: Vec<Channel>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    /// Extractor over all eight standard channels
    pub fn new() -> Self {
        Self {
            channels: Channel::ALL.to_vec(),
        }
    }

    /// Extractor over a channel subset; an empty subset means all channels
    pub fn with_channels(channels: &[Channel]) -> Self {
        if channels.is_empty() {
            return Self::new();
        }
        let mut active: Vec<Channel> = Channel::ALL
            .into_iter()
            .filter(|c| channels.contains(c))
            .collect();
        active.dedup();
        Self { channels: active }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Every feature name the extractor emits, in canonical order
    pub fn feature_names() -> Vec<String> {
        let mut names = Vec::with_capacity(NUM_CHANNELS * STATISTICS.len() + 10);
        for channel in Channel::ALL {
            for stat in STATISTICS {
                names.push(stat_name(channel, stat));
            }
        }
        for channel in MQ135_RATIO_CHANNELS {
            names.push(mq135_ratio_name(channel));
        }
        for channel in Channel::ALL.into_iter().filter(|c| *c != Channel::Qcm) {
            names.push(qcm_ratio_name(channel));
        }
        names
    }

    /// Statistics for one channel, zero when inactive or absent
    pub fn channel_stats(&self, matrix: &SampleMatrix, channel: Channel) -> ChannelStats {
        if !self.channels.contains(&channel) {
            return ChannelStats::default();
        }
        matrix
            .channel_values(channel)
            .map(|values| ChannelStats::compute(&values))
            .unwrap_or_default()
    }

    /// Compute the full feature vector for a window
    pub fn extract(&self, matrix: &SampleMatrix) -> FeatureVector {
        let mut features = FeatureVector::new();
        let mut means = [0.0; NUM_CHANNELS];

        for channel in Channel::ALL {
            let stats = self.channel_stats(matrix, channel);
            means[channel.index()] = stats.mean;
            for (stat, value) in STATISTICS.iter().zip(stats.values()) {
                features.insert(stat_name(channel, stat), value);
            }
        }

        let mq135 = means[Channel::Mq135.index()];
        for channel in MQ135_RATIO_CHANNELS {
            features.insert(
                mq135_ratio_name(channel),
                means[channel.index()] / (mq135 + RATIO_EPSILON),
            );
        }

        let qcm = means[Channel::Qcm.index()];
        for channel in Channel::ALL.into_iter().filter(|c| *c != Channel::Qcm) {
            features.insert(
                qcm_ratio_name(channel),
                means[channel.index()] / (qcm + RATIO_EPSILON),
            );
        }

        features
    }
}

fn stat_name(channel: Channel, stat: &str) -> String {
    format!("{}_{}", channel.name(), stat)
}

fn mq135_ratio_name(channel: Channel) -> String {
    format!("{}_mq135_ratio", channel.name().to_lowercase())
}

fn qcm_ratio_name(channel: Channel) -> String {
    format!("{}_qcm_ratio", channel.name())
}
