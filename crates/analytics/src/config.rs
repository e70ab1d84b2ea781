//! Pipeline configuration
//!
//! Every threshold the fusion and training paths depend on lives here, with
//! serde defaults and environment overrides (prefix `PIPELINE`). The defaults
//! are demo-calibrated starting points; production values should be tuned
//! against real labeled data.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Physical plausibility bounds for one channel. Values outside are clipped
/// (and counted), never silently dropped.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChannelBounds {
    pub min: f64,
    pub max: f64,
}

impl ChannelBounds {
    pub fn clip(&self, value: f64) -> (f64, bool) {
        if value < self.min {
            (self.min, true)
        } else if value > self.max {
            (self.max, true)
        } else {
            (value, false)
        }
    }
}

/// Per-channel physical bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundsConfig {
    #[serde(default = "default_temperature_bounds")]
    pub temperature: ChannelBounds,
    #[serde(default = "default_pressure_bounds")]
    pub pressure: ChannelBounds,
    #[serde(default = "default_vibration_bounds")]
    pub vibration: ChannelBounds,
    #[serde(default = "default_power_bounds")]
    pub power: ChannelBounds,
}

fn default_temperature_bounds() -> ChannelBounds {
    // Celsius
    ChannelBounds { min: -20.0, max: 150.0 }
}

fn default_pressure_bounds() -> ChannelBounds {
    // PSI
    ChannelBounds { min: 0.0, max: 300.0 }
}

fn default_vibration_bounds() -> ChannelBounds {
    // mm/s
    ChannelBounds { min: 0.0, max: 50.0 }
}

fn default_power_bounds() -> ChannelBounds {
    // kW
    ChannelBounds { min: 0.0, max: 2000.0 }
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature_bounds(),
            pressure: default_pressure_bounds(),
            vibration: default_vibration_bounds(),
            power: default_power_bounds(),
        }
    }
}

impl BoundsConfig {
    pub fn for_channel(&self, channel: crate::models::Channel) -> ChannelBounds {
        use crate::models::Channel;
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Pressure => self.pressure,
            Channel::Vibration => self.vibration,
            Channel::Power => self.power,
        }
    }
}

/// Anomaly scorer training and calibration parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    /// Number of isolation trees in the ensemble.
    #[serde(default = "default_anomaly_tree_count")]
    pub tree_count: usize,
    /// Sub-sample size per tree.
    #[serde(default = "default_anomaly_sample_size")]
    pub sample_size: usize,
    /// Expected fraction of baseline observations that are anomalous; the
    /// flag threshold is calibrated to this quantile at training time.
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    /// Z-score above which a channel is attributed as unusual.
    #[serde(default = "default_unusual_z_threshold")]
    pub unusual_z_threshold: f64,
    /// Allowed deviation between the held-out flagged fraction and the
    /// contamination target during candidate validation.
    #[serde(default = "default_calibration_tolerance")]
    pub calibration_tolerance: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_anomaly_tree_count() -> usize {
    100
}

fn default_anomaly_sample_size() -> usize {
    256
}

fn default_contamination() -> f64 {
    0.05
}

fn default_unusual_z_threshold() -> f64 {
    2.0
}

fn default_calibration_tolerance() -> f64 {
    0.05
}

fn default_seed() -> u64 {
    42
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            tree_count: default_anomaly_tree_count(),
            sample_size: default_anomaly_sample_size(),
            contamination: default_contamination(),
            unusual_z_threshold: default_unusual_z_threshold(),
            calibration_tolerance: default_calibration_tolerance(),
            seed: default_seed(),
        }
    }
}

/// Failure predictor training parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Number of bagged trees per horizon.
    #[serde(default = "default_failure_tree_count")]
    pub tree_count: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Minimum examples in a leaf before a split stops.
    #[serde(default = "default_min_leaf")]
    pub min_leaf: usize,
    /// Prediction horizons in seconds, ascending. Defaults: 24h, 7d, 30d.
    #[serde(default = "default_horizons")]
    pub horizons_secs: Vec<i64>,
    /// Minimum positive labels per class before a per-class model trains;
    /// below this the lifecycle manager falls back to a fleet-scope model.
    #[serde(default = "default_min_positive_labels")]
    pub min_positive_labels: usize,
    /// Vectors recorded within this gap after a failure event are excluded
    /// from training so post-failure behavior never labels pre-failure data.
    #[serde(default = "default_post_failure_exclusion")]
    pub post_failure_exclusion_secs: i64,
    /// Probability level whose horizon crossing defines the remaining useful
    /// life estimate.
    #[serde(default = "default_rul_probability_level")]
    pub rul_probability_level: f64,
    /// Minimum recall on the held-out slice for a candidate to publish.
    #[serde(default = "default_recall_floor")]
    pub recall_floor: f64,
    /// Fraction of labeled examples held out for validation.
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_failure_tree_count() -> usize {
    50
}

fn default_max_depth() -> usize {
    8
}

fn default_min_leaf() -> usize {
    5
}

fn default_horizons() -> Vec<i64> {
    vec![24 * 3600, 7 * 24 * 3600, 30 * 24 * 3600]
}

fn default_min_positive_labels() -> usize {
    5
}

fn default_post_failure_exclusion() -> i64 {
    24 * 3600
}

fn default_rul_probability_level() -> f64 {
    0.5
}

fn default_recall_floor() -> f64 {
    0.6
}

fn default_holdout_fraction() -> f64 {
    0.2
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            tree_count: default_failure_tree_count(),
            max_depth: default_max_depth(),
            min_leaf: default_min_leaf(),
            horizons_secs: default_horizons(),
            min_positive_labels: default_min_positive_labels(),
            post_failure_exclusion_secs: default_post_failure_exclusion(),
            rul_probability_level: default_rul_probability_level(),
            recall_floor: default_recall_floor(),
            holdout_fraction: default_holdout_fraction(),
            seed: default_seed(),
        }
    }
}

/// Alert fusion thresholds and suppression windows.
#[derive(Debug, Clone, Deserialize)]
pub struct FusionConfig {
    /// Failure probability at the shortest horizon at or above which an
    /// alert is critical.
    #[serde(default = "default_critical_probability")]
    pub critical_probability: f64,
    /// Failure probability at the longest horizon at or above which a
    /// flagged anomaly escalates to warning.
    #[serde(default = "default_warning_probability")]
    pub warning_probability: f64,
    /// Remaining useful life below which an alert is critical.
    #[serde(default = "default_critical_rul")]
    pub critical_rul_secs: f64,
    /// Minimum time between duplicate alerts for the same equipment and
    /// reason-code combination.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: i64,
    /// Sustained quiet period after which an active alert resolves.
    #[serde(default = "default_clear_window")]
    pub clear_window_secs: i64,
}

fn default_critical_probability() -> f64 {
    0.7
}

fn default_warning_probability() -> f64 {
    0.4
}

fn default_critical_rul() -> f64 {
    7.0 * 24.0 * 3600.0
}

fn default_cooldown() -> i64 {
    15 * 60
}

fn default_clear_window() -> i64 {
    3600
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            critical_probability: default_critical_probability(),
            warning_probability: default_warning_probability(),
            critical_rul_secs: default_critical_rul(),
            cooldown_secs: default_cooldown(),
            clear_window_secs: default_clear_window(),
        }
    }
}

/// Retraining triggers and artifact retention.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// New samples accumulated per class before a retrain is due.
    #[serde(default = "default_retrain_sample_threshold")]
    pub retrain_sample_threshold: u64,
    /// Scheduled retrain interval.
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval_secs: i64,
    /// False-positive alert rate above which drift retraining triggers.
    #[serde(default = "default_fp_rate_threshold")]
    pub fp_rate_threshold: f64,
    /// Minimum alert outcomes observed before the drift rate is meaningful.
    #[serde(default = "default_fp_min_outcomes")]
    pub fp_min_outcomes: usize,
    /// Prior artifact versions kept per class for rollback.
    #[serde(default = "default_versions_to_keep")]
    pub versions_to_keep: usize,
}

fn default_retrain_sample_threshold() -> u64 {
    500
}

fn default_retrain_interval() -> i64 {
    24 * 3600
}

fn default_fp_rate_threshold() -> f64 {
    0.5
}

fn default_fp_min_outcomes() -> usize {
    20
}

fn default_versions_to_keep() -> usize {
    5
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retrain_sample_threshold: default_retrain_sample_threshold(),
            retrain_interval_secs: default_retrain_interval(),
            fp_rate_threshold: default_fp_rate_threshold(),
            fp_min_outcomes: default_fp_min_outcomes(),
            versions_to_keep: default_versions_to_keep(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Minimum readings in a window before feature extraction succeeds.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default)]
    pub bounds: BoundsConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Seconds between evaluation ticks in the engine loop.
    #[serde(default = "default_evaluation_tick")]
    pub evaluation_tick_secs: u64,
}

fn default_min_samples() -> usize {
    10
}

fn default_evaluation_tick() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            bounds: BoundsConfig::default(),
            anomaly: AnomalyConfig::default(),
            training: TrainingConfig::default(),
            fusion: FusionConfig::default(),
            lifecycle: LifecycleConfig::default(),
            evaluation_tick_secs: default_evaluation_tick(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the environment (`PIPELINE_*` variables),
    /// falling back to defaults for anything unset.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PIPELINE").separator("__"))
            .build()?;

        config
            .try_deserialize()
            .context("failed to deserialize pipeline configuration")
    }
}
