//! Feature extraction over sensor windows
//!
//! Turns a raw [`Window`] into a fixed-schema [`FeatureVector`]: per-channel
//! rolling mean/std/min/max, first-difference rate-of-change, and the
//! vibration/temperature cross-channel ratio. Extraction is a deterministic
//! pure function of the window contents.
//!
//! Missing channels get a NaN sentinel (never zero, which would bias the
//! models) and are flagged on the vector; out-of-bounds values are clipped
//! and counted.

use crate::config::BoundsConfig;
use crate::error::PipelineError;
use crate::models::{Channel, FeatureVector, Window};
use serde::{Deserialize, Serialize};

/// Current feature schema version. Bump whenever the feature list or its
/// ordering changes; artifacts record the version they were trained against.
pub const SCHEMA_VERSION: u32 = 1;

/// Sentinel for features whose source channel is absent from the window.
pub const MISSING_SENTINEL: f64 = f64::NAN;

/// Per-channel derived statistics, in schema order.
const CHANNEL_STATS: [&str; 5] = ["mean", "std", "min", "max", "rate_of_change"];

/// Ordered, versioned list of feature names shared by training and
/// inference. Identical for all equipment of the same class, so vectors are
/// interchangeable across the models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub names: Vec<String>,
}

impl FeatureSchema {
    /// Build the current schema.
    pub fn current() -> Self {
        let mut names = Vec::new();
        for channel in Channel::ALL {
            for stat in CHANNEL_STATS {
                names.push(format!("{}_{}", channel.name(), stat));
            }
        }
        names.push("vibration_temperature_ratio".to_string());
        Self {
            version: SCHEMA_VERSION,
            names,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of a named feature, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Indices of the per-channel statistics for one channel.
    pub fn channel_indices(&self, channel: Channel) -> ChannelIndices {
        let base = Channel::ALL
            .iter()
            .position(|c| *c == channel)
            .expect("channel is in ALL")
            * CHANNEL_STATS.len();
        ChannelIndices {
            mean: base,
            std: base + 1,
            min: base + 2,
            max: base + 3,
            rate_of_change: base + 4,
        }
    }
}

/// Positions of one channel's statistics within the schema.
#[derive(Debug, Clone, Copy)]
pub struct ChannelIndices {
    pub mean: usize,
    pub std: usize,
    pub min: usize,
    pub max: usize,
    pub rate_of_change: usize,
}

/// Extracts feature vectors from windows of readings.
pub struct FeatureExtractor {
    min_samples: usize,
    bounds: BoundsConfig,
    schema: FeatureSchema,
}

impl FeatureExtractor {
    pub fn new(min_samples: usize, bounds: BoundsConfig) -> Self {
        Self {
            min_samples,
            bounds,
            schema: FeatureSchema::current(),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn has_sufficient_data(&self, window: &Window) -> bool {
        window.len() >= self.min_samples
    }

    /// Extract one feature vector from a window.
    ///
    /// Fails with [`PipelineError::InsufficientData`] below `min_samples`.
    pub fn extract(&self, window: &Window) -> Result<FeatureVector, PipelineError> {
        if window.len() < self.min_samples {
            return Err(PipelineError::InsufficientData {
                got: window.len(),
                need: self.min_samples,
            });
        }

        let mut values = Vec::with_capacity(self.schema.len());
        let mut clipped_samples = 0u32;
        let mut missing_channels = Vec::new();
        let mut channel_means = [MISSING_SENTINEL; Channel::ALL.len()];

        for (ci, channel) in Channel::ALL.into_iter().enumerate() {
            let bounds = self.bounds.for_channel(channel);
            let mut series: Vec<(i64, f64)> = Vec::with_capacity(window.len());
            for reading in &window.readings {
                if let Some(raw) = reading.values.get(channel) {
                    let (value, clipped) = bounds.clip(raw);
                    if clipped {
                        clipped_samples += 1;
                    }
                    series.push((reading.timestamp, value));
                }
            }

            if series.is_empty() {
                missing_channels.push(channel);
                values.extend_from_slice(&[MISSING_SENTINEL; 5]);
                continue;
            }

            let samples: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
            let mean = mean(&samples);
            channel_means[ci] = mean;
            values.push(mean);
            values.push(std_dev(&samples, mean));
            values.push(
                samples
                    .iter()
                    .copied()
                    .fold(f64::INFINITY, f64::min),
            );
            values.push(
                samples
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max),
            );
            values.push(rate_of_change(&series));
        }

        // Cross-channel ratio: vibration mean over temperature mean.
        let vib = channel_means[Channel::ALL
            .iter()
            .position(|c| *c == Channel::Vibration)
            .expect("vibration in ALL")];
        let temp = channel_means[Channel::ALL
            .iter()
            .position(|c| *c == Channel::Temperature)
            .expect("temperature in ALL")];
        let ratio = if vib.is_nan() || temp.is_nan() || temp.abs() < f64::EPSILON {
            MISSING_SENTINEL
        } else {
            vib / temp
        };
        values.push(ratio);

        debug_assert_eq!(values.len(), self.schema.len());

        Ok(FeatureVector {
            equipment_id: window.equipment_id.clone(),
            timestamp: window.latest_timestamp().unwrap_or(0),
            values,
            schema_version: self.schema.version,
            clipped_samples,
            missing_channels,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (Bessel's correction).
fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Mean first-difference rate-of-change, in units per second.
fn rate_of_change(series: &[(i64, f64)]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut count = 0usize;
    for pair in series.windows(2) {
        let dt = (pair[1].0 - pair[0].0) as f64;
        if dt > 0.0 {
            total += (pair[1].1 - pair[0].1) / dt;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
