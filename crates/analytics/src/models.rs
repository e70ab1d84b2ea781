//! Core data models for the analytics pipeline

use serde::{Deserialize, Serialize};

/// Sensor channels recorded for every piece of equipment.
///
/// The channel set is fixed; feature schemas and model artifacts are built
/// against this ordering and must never observe a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    Pressure,
    Vibration,
    Power,
}

impl Channel {
    /// All channels in canonical order.
    pub const ALL: [Channel; 4] = [
        Channel::Temperature,
        Channel::Pressure,
        Channel::Vibration,
        Channel::Power,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Pressure => "pressure",
            Channel::Vibration => "vibration",
            Channel::Power => "power",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-channel values for a single reading.
///
/// A missing channel is `None`, never a zero fill; downstream feature
/// extraction substitutes a documented sentinel instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelValues {
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub vibration: Option<f64>,
    pub power: Option<f64>,
}

impl ChannelValues {
    pub fn get(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Pressure => self.pressure,
            Channel::Vibration => self.vibration,
            Channel::Power => self.power,
        }
    }

    pub fn set(&mut self, channel: Channel, value: Option<f64>) {
        match channel {
            Channel::Temperature => self.temperature = value,
            Channel::Pressure => self.pressure = value,
            Channel::Vibration => self.vibration = value,
            Channel::Power => self.power = value,
        }
    }
}

/// One multi-channel sensor reading. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub equipment_id: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    pub values: ChannelValues,
}

/// A contiguous, equipment-scoped, timestamp-ordered slice of readings.
///
/// Produced on demand by the ingestion boundary; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub equipment_id: String,
    pub readings: Vec<Reading>,
}

impl Window {
    pub fn new(equipment_id: impl Into<String>, mut readings: Vec<Reading>) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        Self {
            equipment_id: equipment_id.into(),
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Timestamp of the most recent reading, if any.
    pub fn latest_timestamp(&self) -> Option<i64> {
        self.readings.last().map(|r| r.timestamp)
    }
}

/// Fixed-schema numeric summary of a window.
///
/// `values` are positionally bound to the [`crate::features::FeatureSchema`]
/// identified by `schema_version`; training and inference share the schema so
/// a feature-order mismatch is a hard version error, not a silent skew.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub equipment_id: String,
    pub timestamp: i64,
    pub values: Vec<f64>,
    pub schema_version: u32,
    /// Raw values found outside physical bounds and clipped.
    pub clipped_samples: u32,
    /// Channels absent from the window; their dependent features hold the
    /// NaN sentinel.
    pub missing_channels: Vec<Channel>,
}

/// Output of the anomaly scorer for one observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub equipment_id: String,
    pub timestamp: i64,
    /// Normalized to [0, 1]; higher means more anomalous.
    pub score: f64,
    /// Derived from the calibrated per-artifact threshold.
    pub is_anomalous: bool,
    /// Channels whose window statistics deviate most from the training
    /// baseline, used for reason-code attribution.
    pub unusual_channels: Vec<Channel>,
}

/// Failure probability at one prediction horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonProbability {
    pub horizon_secs: i64,
    pub probability: f64,
}

/// Which population a model was trained over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelScope {
    /// Trained on labeled examples of a single equipment class.
    EquipmentClass,
    /// Cross-class fallback used when a class lacks positive labels.
    Fleet,
}

/// Output of the failure predictor for one observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureForecast {
    pub equipment_id: String,
    pub timestamp: i64,
    /// Sorted ascending by horizon.
    pub probability_by_horizon: Vec<HorizonProbability>,
    /// Estimated remaining useful life in seconds; `None` when no configured
    /// horizon crosses the RUL probability level.
    pub remaining_life_secs: Option<f64>,
    pub scope: ModelScope,
}

impl FailureForecast {
    /// Probability at the shortest configured horizon.
    pub fn shortest_horizon(&self) -> Option<HorizonProbability> {
        self.probability_by_horizon.first().copied()
    }

    /// Probability at the longest configured horizon.
    pub fn longest_horizon(&self) -> Option<HorizonProbability> {
        self.probability_by_horizon.last().copied()
    }
}

/// Historical ground-truth failure event supplied by the label source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub equipment_id: String,
    pub timestamp: i64,
    pub failure_mode: String,
}

/// Equipment identity as seen by the evaluation engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquipmentRef {
    pub equipment_id: String,
    pub equipment_class: String,
}

/// The two model kinds governed by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Anomaly,
    Failure,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Anomaly => write!(f, "anomaly"),
            ModelKind::Failure => write!(f, "failure"),
        }
    }
}

/// Time span of the data a model was trained over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: i64,
    pub end: i64,
}

impl TrainingWindow {
    /// Derive the span from a set of feature vectors.
    pub fn from_vectors(vectors: &[FeatureVector]) -> Self {
        let start = vectors.iter().map(|v| v.timestamp).min().unwrap_or(0);
        let end = vectors.iter().map(|v| v.timestamp).max().unwrap_or(0);
        Self { start, end }
    }
}
