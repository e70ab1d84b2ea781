//! Observability infrastructure for the analytics pipeline
//!
//! Provides:
//! - Prometheus metrics (evaluation latency, alerts by severity, training runs)
//! - Structured JSON logging with tracing

use crate::alerts::Alert;
use crate::models::{AnomalyResult, Channel, FailureForecast, ModelKind};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_gauge, register_int_gauge_vec, GaugeVec,
    Histogram, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Default histogram buckets for evaluation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct PipelineMetricsInner {
    evaluation_latency_seconds: Histogram,
    equipment_monitored: IntGauge,
    anomalies_detected: IntGauge,
    alerts_emitted: IntGaugeVec,
    alerts_active: IntGauge,
    evaluations_unscored: IntGauge,
    evaluation_errors: IntGauge,
    training_runs: IntGauge,
    validation_failures: IntGauge,
    model_version_info: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            evaluation_latency_seconds: register_histogram!(
                "pipeline_evaluation_latency_seconds",
                "Time spent evaluating one piece of equipment end to end",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            equipment_monitored: register_int_gauge!(
                "pipeline_equipment_monitored",
                "Number of equipment units currently being evaluated"
            )
            .expect("Failed to register equipment_monitored"),

            anomalies_detected: register_int_gauge!(
                "pipeline_anomalies_detected_total",
                "Total number of observations flagged anomalous"
            )
            .expect("Failed to register anomalies_detected"),

            alerts_emitted: register_int_gauge_vec!(
                "pipeline_alerts_emitted_total",
                "Total number of alerts created, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_emitted"),

            alerts_active: register_int_gauge!(
                "pipeline_alerts_active",
                "Number of currently active alerts"
            )
            .expect("Failed to register alerts_active"),

            evaluations_unscored: register_int_gauge!(
                "pipeline_evaluations_unscored_total",
                "Evaluations that produced an explicit unscored outcome"
            )
            .expect("Failed to register evaluations_unscored"),

            evaluation_errors: register_int_gauge!(
                "pipeline_evaluation_errors_total",
                "Total number of per-equipment evaluation errors"
            )
            .expect("Failed to register evaluation_errors"),

            training_runs: register_int_gauge!(
                "pipeline_training_runs_total",
                "Total number of model training runs"
            )
            .expect("Failed to register training_runs"),

            validation_failures: register_int_gauge!(
                "pipeline_validation_failures_total",
                "Candidate artifacts rejected by held-out validation"
            )
            .expect("Failed to register validation_failures"),

            model_version_info: register_gauge_vec!(
                "pipeline_model_version_info",
                "Information about the currently active model artifacts",
                &["kind", "equipment_class", "version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    // This is just a marker - we use the global instance
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record an evaluation latency observation
    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    /// Update equipment monitored count
    pub fn set_equipment_monitored(&self, count: i64) {
        self.inner().equipment_monitored.set(count);
    }

    /// Increment anomalies detected counter
    pub fn inc_anomalies_detected(&self) {
        self.inner().anomalies_detected.inc();
    }

    /// Increment the alert counter for a severity
    pub fn inc_alerts_emitted(&self, severity: &str) {
        self.inner().alerts_emitted.with_label_values(&[severity]).inc();
    }

    /// Update the active alert gauge
    pub fn set_alerts_active(&self, count: i64) {
        self.inner().alerts_active.set(count);
    }

    /// Increment the unscored evaluation counter
    pub fn inc_evaluations_unscored(&self) {
        self.inner().evaluations_unscored.inc();
    }

    /// Increment the evaluation error counter
    pub fn inc_evaluation_errors(&self) {
        self.inner().evaluation_errors.inc();
    }

    /// Increment the training run counter
    pub fn inc_training_runs(&self) {
        self.inner().training_runs.inc();
    }

    /// Increment the validation failure counter
    pub fn inc_validation_failures(&self) {
        self.inner().validation_failures.inc();
    }

    /// Update model version info for one kind and class
    pub fn set_model_version(&self, kind: &str, equipment_class: &str, version: &str) {
        self.inner()
            .model_version_info
            .with_label_values(&[kind, equipment_class, version])
            .set(1.0);
    }
}

/// Structured logger for pipeline events
///
/// Provides consistent JSON-formatted logging for scoring, alerting and
/// lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    pipeline_name: String,
}

impl StructuredLogger {
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
        }
    }

    /// Log a flagged anomaly
    pub fn log_anomaly(&self, result: &AnomalyResult, equipment_class: &str) {
        let channels: Vec<&str> = result.unusual_channels.iter().map(Channel::name).collect();
        info!(
            event = "anomaly_detected",
            pipeline = %self.pipeline_name,
            equipment_id = %result.equipment_id,
            equipment_class = %equipment_class,
            score = result.score,
            unusual_channels = ?channels,
            "Anomalous observation"
        );
    }

    /// Log a failure forecast
    pub fn log_forecast(&self, forecast: &FailureForecast, equipment_class: &str) {
        let shortest = forecast.shortest_horizon().map(|h| h.probability).unwrap_or(0.0);
        let longest = forecast.longest_horizon().map(|h| h.probability).unwrap_or(0.0);
        debug!(
            event = "failure_forecast",
            pipeline = %self.pipeline_name,
            equipment_id = %forecast.equipment_id,
            equipment_class = %equipment_class,
            shortest_horizon_probability = shortest,
            longest_horizon_probability = longest,
            remaining_life_secs = ?forecast.remaining_life_secs,
            scope = ?forecast.scope,
            "Generated failure forecast"
        );
    }

    /// Log alert creation
    pub fn log_alert(&self, alert: &Alert) {
        let reasons: Vec<&String> = alert.reason_codes.iter().collect();
        warn!(
            event = "alert_created",
            pipeline = %self.pipeline_name,
            alert_id = alert.alert_id,
            equipment_id = %alert.equipment_id,
            equipment_class = %alert.equipment_class,
            severity = ?alert.severity,
            reason_codes = ?reasons,
            recommended_action = %alert.recommended_action,
            "Alert created"
        );
    }

    /// Log alert resolution
    pub fn log_alert_resolved(&self, alert_id: u64, equipment_id: &str) {
        info!(
            event = "alert_resolved",
            pipeline = %self.pipeline_name,
            alert_id = alert_id,
            equipment_id = %equipment_id,
            "Alert resolved after sustained quiet period"
        );
    }

    /// Log an explicit unscored evaluation
    pub fn log_unscored(&self, equipment_id: &str, equipment_class: &str, reason: &str) {
        debug!(
            event = "evaluation_unscored",
            pipeline = %self.pipeline_name,
            equipment_id = %equipment_id,
            equipment_class = %equipment_class,
            reason = %reason,
            "Evaluation skipped without a score"
        );
    }

    /// Log a model training run
    pub fn log_training(&self, kind: ModelKind, equipment_class: &str, version: &str, trigger: &str) {
        info!(
            event = "model_trained",
            pipeline = %self.pipeline_name,
            kind = %kind,
            equipment_class = %equipment_class,
            version = %version,
            trigger = %trigger,
            "Trained and published model artifact"
        );
    }

    /// Log a rejected candidate
    pub fn log_validation_failure(&self, kind: ModelKind, equipment_class: &str, detail: &str) {
        warn!(
            event = "validation_regression",
            pipeline = %self.pipeline_name,
            kind = %kind,
            equipment_class = %equipment_class,
            detail = %detail,
            "Candidate artifact rejected; keeping active artifact"
        );
    }

    /// Log pipeline startup
    pub fn log_startup(&self, version: &str, equipment_count: usize) {
        info!(
            event = "pipeline_started",
            pipeline = %self.pipeline_name,
            version = %version,
            equipment_count = equipment_count,
            "Analytics pipeline started"
        );
    }

    /// Log pipeline shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "pipeline_shutdown",
            pipeline = %self.pipeline_name,
            reason = %reason,
            "Analytics pipeline shutting down"
        );
    }
}
