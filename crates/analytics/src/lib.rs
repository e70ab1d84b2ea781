//! Predictive-maintenance analytics pipeline
//!
//! This crate provides the core functionality for:
//! - Feature extraction from multi-channel sensor windows
//! - Isolation-forest anomaly scoring with calibrated thresholds
//! - Multi-horizon failure prediction and remaining-useful-life estimation
//! - Alert synthesis with deduplication, suppression and resolution
//! - Model lifecycle management with validated publication and rollback

pub mod alerts;
pub mod anomaly;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod failure;
pub mod features;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod sources;

pub use alerts::{Alert, AlertEvent, AlertSeverity, AlertState, AlertSynthesizer};
pub use config::PipelineConfig;
pub use engine::{EvaluationEngine, EvaluationOutcome};
pub use error::PipelineError;
pub use features::{FeatureExtractor, FeatureSchema};
pub use lifecycle::{ArtifactRegistry, LifecycleManager};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
