//! Anomaly model training, calibration and scoring
//!
//! Training builds an isolation forest over a baseline of feature vectors
//! and calibrates the anomaly flag threshold to the expected contamination
//! fraction. Scoring is a pure function of a vector and the active artifact.

use super::forest::IsolationForest;
use crate::config::AnomalyConfig;
use crate::error::PipelineError;
use crate::features::FeatureSchema;
use crate::models::{AnomalyResult, Channel, FeatureVector, TrainingWindow};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Minimum baseline vectors for a meaningful calibration.
pub const MIN_BASELINE_VECTORS: usize = 10;

/// Per-feature baseline statistics, used for channel attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureBaseline {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl FeatureBaseline {
    fn from_vectors(vectors: &[FeatureVector], width: usize) -> Self {
        let mut means = vec![0.0; width];
        let mut counts = vec![0usize; width];
        for vector in vectors {
            for (i, v) in vector.values.iter().enumerate() {
                if v.is_finite() {
                    means[i] += v;
                    counts[i] += 1;
                }
            }
        }
        for i in 0..width {
            means[i] = if counts[i] > 0 {
                means[i] / counts[i] as f64
            } else {
                f64::NAN
            };
        }

        let mut stds = vec![0.0; width];
        for vector in vectors {
            for (i, v) in vector.values.iter().enumerate() {
                if v.is_finite() && means[i].is_finite() {
                    stds[i] += (v - means[i]).powi(2);
                }
            }
        }
        for i in 0..width {
            stds[i] = if counts[i] > 1 {
                (stds[i] / (counts[i] - 1) as f64).sqrt()
            } else {
                0.0
            };
        }

        Self { means, stds }
    }

    /// Absolute z-score of a value against the baseline of feature `i`.
    fn z_score(&self, i: usize, value: f64) -> f64 {
        if !value.is_finite() || !self.means[i].is_finite() || self.stds[i] <= f64::EPSILON {
            return 0.0;
        }
        ((value - self.means[i]) / self.stds[i]).abs()
    }
}

/// Trained anomaly artifact for one equipment class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyModel {
    pub version: String,
    pub equipment_class: String,
    pub trained_at: i64,
    pub training_window: TrainingWindow,
    pub schema_version: u32,
    pub contamination: f64,
    /// Score at or above which an observation is flagged. Calibrated to the
    /// contamination quantile of the baseline, not a fixed constant.
    pub threshold: f64,
    pub unusual_z_threshold: f64,
    pub forest: IsolationForest,
    pub baseline: FeatureBaseline,
}

impl AnomalyModel {
    /// Train a new model over a baseline of normal-operation vectors.
    ///
    /// Idempotent for identical input and seed.
    pub fn train(
        equipment_class: &str,
        version: &str,
        baseline: &[FeatureVector],
        cfg: &AnomalyConfig,
    ) -> Result<Self, PipelineError> {
        if baseline.len() < MIN_BASELINE_VECTORS {
            return Err(PipelineError::InsufficientData {
                got: baseline.len(),
                need: MIN_BASELINE_VECTORS,
            });
        }

        let schema = FeatureSchema::current();
        let data: Vec<Vec<f64>> = baseline.iter().map(|v| v.values.clone()).collect();
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let forest = IsolationForest::fit(&data, cfg.tree_count, cfg.sample_size, &mut rng);

        // Calibrate: the threshold is the (1 - contamination) quantile of
        // baseline scores, so about `contamination` of the baseline flags.
        let mut scores: Vec<f64> = data.iter().map(|row| forest.score(row)).collect();
        scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let cut = ((1.0 - cfg.contamination) * scores.len() as f64).floor() as usize;
        let threshold = scores[cut.min(scores.len() - 1)];

        Ok(Self {
            version: version.to_string(),
            equipment_class: equipment_class.to_string(),
            trained_at: chrono::Utc::now().timestamp(),
            training_window: TrainingWindow::from_vectors(baseline),
            schema_version: schema.version,
            contamination: cfg.contamination,
            threshold,
            unusual_z_threshold: cfg.unusual_z_threshold,
            forest,
            baseline: FeatureBaseline::from_vectors(baseline, schema.len()),
        })
    }

    /// Score one observation. Pure; mutates no shared state.
    pub fn score(&self, vector: &FeatureVector) -> Result<AnomalyResult, PipelineError> {
        if vector.schema_version != self.schema_version {
            return Err(PipelineError::SchemaMismatch {
                vector: vector.schema_version,
                model: self.schema_version,
            });
        }

        let score = self.forest.score(&vector.values);
        let is_anomalous = score >= self.threshold;
        let unusual_channels = if is_anomalous {
            self.attribute_channels(vector)
        } else {
            Vec::new()
        };

        Ok(AnomalyResult {
            equipment_id: vector.equipment_id.clone(),
            timestamp: vector.timestamp,
            score,
            is_anomalous,
            unusual_channels,
        })
    }

    /// Channels whose window mean deviates most from the training baseline.
    /// Falls back to the single worst channel when none crosses the z bound,
    /// so a flagged anomaly always carries at least one attribution.
    fn attribute_channels(&self, vector: &FeatureVector) -> Vec<Channel> {
        let schema = FeatureSchema::current();
        let mut scored: Vec<(Channel, f64)> = Channel::ALL
            .into_iter()
            .filter(|c| !vector.missing_channels.contains(c))
            .map(|channel| {
                let idx = schema.channel_indices(channel);
                (channel, self.baseline.z_score(idx.mean, vector.values[idx.mean]))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let unusual: Vec<Channel> = scored
            .iter()
            .filter(|(_, z)| *z > self.unusual_z_threshold)
            .map(|(c, _)| *c)
            .collect();
        if unusual.is_empty() {
            scored.first().map(|(c, _)| vec![*c]).unwrap_or_default()
        } else {
            unusual
        }
    }
}
