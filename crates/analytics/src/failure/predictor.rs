//! Failure model training and multi-horizon forecasting
//!
//! One bagged forest per configured horizon, trained on time-aligned labels.
//! Remaining useful life is derived by interpolating across horizon
//! probabilities: the estimate is the earliest time at which the (monotone)
//! horizon curve crosses the configured probability level. This keeps RUL
//! consistent with the calibrated probabilities by construction; there is no
//! separate regression head.

use super::forest::{BaggedForest, ForestParams};
use super::labels::{build_labels, positive_count, LabeledExample};
use crate::cancel::CancelToken;
use crate::config::TrainingConfig;
use crate::error::PipelineError;
use crate::features::FeatureSchema;
use crate::models::{
    FailureEvent, FailureForecast, FeatureVector, HorizonProbability, ModelScope, TrainingWindow,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Minimum labeled examples before any failure model trains.
pub const MIN_TRAINING_EXAMPLES: usize = 20;

/// Trained failure artifact for one equipment class (or the fleet fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureModel {
    pub version: String,
    pub equipment_class: String,
    pub scope: ModelScope,
    pub trained_at: i64,
    pub training_window: TrainingWindow,
    pub schema_version: u32,
    /// Ascending; parallel to `forests`.
    pub horizons_secs: Vec<i64>,
    pub forests: Vec<BaggedForest>,
    pub rul_probability_level: f64,
}

impl FailureModel {
    /// Train per-horizon forests over labeled history.
    ///
    /// Fails with [`PipelineError::InsufficientLabels`] when even the longest
    /// horizon has fewer positives than `min_positive_labels`; the lifecycle
    /// manager reacts by training a fleet-scope model instead.
    pub fn train(
        equipment_class: &str,
        version: &str,
        scope: ModelScope,
        vectors: &[FeatureVector],
        events: &[FailureEvent],
        cfg: &TrainingConfig,
        cancel: &CancelToken,
    ) -> Result<Self, PipelineError> {
        let mut horizons = cfg.horizons_secs.clone();
        horizons.sort_unstable();

        let per_horizon: Vec<Vec<LabeledExample>> = horizons
            .iter()
            .map(|&h| build_labels(vectors, events, h, cfg.post_failure_exclusion_secs))
            .collect();

        let examples = per_horizon.first().map(|l| l.len()).unwrap_or(0);
        if examples < MIN_TRAINING_EXAMPLES {
            return Err(PipelineError::InsufficientData {
                got: examples,
                need: MIN_TRAINING_EXAMPLES,
            });
        }

        // The longest horizon sees the most positives; if even it is starved
        // there is no supervised signal for this class.
        let max_positives = per_horizon.iter().map(|l| positive_count(l)).max().unwrap_or(0);
        if max_positives < cfg.min_positive_labels {
            return Err(PipelineError::InsufficientLabels {
                class: equipment_class.to_string(),
                positives: max_positives,
                need: cfg.min_positive_labels,
            });
        }

        let params = ForestParams {
            tree_count: cfg.tree_count,
            max_depth: cfg.max_depth,
            min_leaf: cfg.min_leaf,
        };
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut forests = Vec::with_capacity(horizons.len());
        for labeled in &per_horizon {
            forests.push(BaggedForest::fit(
                labeled,
                params,
                &mut rng,
                cancel,
                equipment_class,
            )?);
        }

        Ok(Self {
            version: version.to_string(),
            equipment_class: equipment_class.to_string(),
            scope,
            trained_at: chrono::Utc::now().timestamp(),
            training_window: TrainingWindow::from_vectors(vectors),
            schema_version: FeatureSchema::current().version,
            horizons_secs: horizons,
            forests,
            rul_probability_level: cfg.rul_probability_level,
        })
    }

    /// Forecast failure probabilities and remaining useful life for one
    /// observation. Pure; mutates no shared state.
    pub fn predict(&self, vector: &FeatureVector) -> Result<FailureForecast, PipelineError> {
        if vector.schema_version != self.schema_version {
            return Err(PipelineError::SchemaMismatch {
                vector: vector.schema_version,
                model: self.schema_version,
            });
        }

        // Failure-within-H is cumulative over H, so the curve is forced
        // monotone with a running max before RUL interpolation.
        let mut probability_by_horizon = Vec::with_capacity(self.horizons_secs.len());
        let mut running = 0.0f64;
        for (i, &horizon_secs) in self.horizons_secs.iter().enumerate() {
            running = running.max(self.forests[i].predict(&vector.values));
            probability_by_horizon.push(HorizonProbability {
                horizon_secs,
                probability: running,
            });
        }

        let remaining_life_secs =
            interpolate_rul(&probability_by_horizon, self.rul_probability_level);

        Ok(FailureForecast {
            equipment_id: vector.equipment_id.clone(),
            timestamp: vector.timestamp,
            probability_by_horizon,
            remaining_life_secs,
            scope: self.scope,
        })
    }
}

/// Earliest time (linear interpolation between horizons, anchored at zero)
/// where the monotone probability curve crosses `level`. `None` when no
/// horizon crosses.
fn interpolate_rul(curve: &[HorizonProbability], level: f64) -> Option<f64> {
    let mut prev = HorizonProbability {
        horizon_secs: 0,
        probability: 0.0,
    };
    for point in curve {
        if point.probability >= level {
            let dp = point.probability - prev.probability;
            if dp <= f64::EPSILON {
                return Some(prev.horizon_secs as f64);
            }
            let frac = (level - prev.probability) / dp;
            return Some(prev.horizon_secs as f64
                + frac * (point.horizon_secs - prev.horizon_secs) as f64);
        }
        prev = *point;
    }
    None
}
