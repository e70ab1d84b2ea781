//! Periodic evaluation loop
//!
//! Pulls the latest window per equipment, extracts features, scores against
//! snapshots of the active artifacts, fuses the results into alerts and
//! forwards alert events over a channel. One equipment's failure never
//! blocks the others; per-equipment errors are logged, counted and skipped.

use crate::alerts::{AlertEvent, AlertSynthesizer};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::FeatureExtractor;
use crate::lifecycle::{ArtifactRegistry, LifecycleManager};
use crate::models::{AnomalyResult, EquipmentRef, FailureForecast, ModelKind};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::sources::WindowSource;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::warn;

/// Outcome of evaluating one piece of equipment.
///
/// A missing artifact produces an explicit `Unscored` outcome, never a
/// fabricated zero score.
#[derive(Debug)]
pub enum EvaluationOutcome {
    Scored {
        anomaly: Option<AnomalyResult>,
        forecast: Option<FailureForecast>,
        alert_events: usize,
    },
    Unscored {
        reason: String,
    },
}

pub struct EvaluationEngine {
    config: PipelineConfig,
    extractor: FeatureExtractor,
    registry: Arc<ArtifactRegistry>,
    lifecycle: Arc<LifecycleManager>,
    windows: Arc<dyn WindowSource>,
    synthesizer: AlertSynthesizer,
    alert_tx: mpsc::Sender<AlertEvent>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
    // Newest reading timestamp seen per equipment. Overlapping windows only
    // count readings past this mark toward the retrain sample volume.
    last_seen: HashMap<String, i64>,
}

impl EvaluationEngine {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<ArtifactRegistry>,
        lifecycle: Arc<LifecycleManager>,
        windows: Arc<dyn WindowSource>,
        synthesizer: AlertSynthesizer,
        logger: StructuredLogger,
    ) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let extractor = FeatureExtractor::new(config.min_samples, config.bounds.clone());
        let engine = Self {
            config,
            extractor,
            registry,
            lifecycle,
            windows,
            synthesizer,
            alert_tx: tx,
            metrics: PipelineMetrics::new(),
            logger,
            last_seen: HashMap::new(),
        };
        (engine, rx)
    }

    /// Run the evaluation loop until shutdown.
    pub async fn run(mut self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let equipment_count = self
            .windows
            .equipment()
            .await
            .map(|list| list.len())
            .unwrap_or(0);
        self.logger
            .log_startup(env!("CARGO_PKG_VERSION"), equipment_count);

        let mut ticker = interval(Duration::from_secs(self.config.evaluation_tick_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = chrono::Utc::now().timestamp();
                    self.run_tick(now).await;
                }
                _ = shutdown.recv() => {
                    self.logger.log_shutdown("shutdown signal received");
                    break;
                }
            }
        }
    }

    /// Evaluate every known equipment unit once, then resolve quiet alerts
    /// and fire any due retraining.
    pub async fn run_tick(&mut self, now: i64) {
        let equipment = match self.windows.equipment().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Failed to list equipment");
                return;
            }
        };
        self.metrics.set_equipment_monitored(equipment.len() as i64);

        let mut classes: HashSet<String> = HashSet::new();
        for unit in &equipment {
            classes.insert(unit.equipment_class.clone());
            if let Err(e) = self.evaluate_equipment(unit, now).await {
                self.metrics.inc_evaluation_errors();
                warn!(
                    equipment_id = %unit.equipment_id,
                    error = %e,
                    "Equipment evaluation failed"
                );
            }
        }

        for event in self.synthesizer.tick(now) {
            if let AlertEvent::Resolved { alert_id, ref equipment_id, .. } = event {
                self.logger.log_alert_resolved(alert_id, equipment_id);
            }
            let _ = self.alert_tx.send(event).await;
        }
        self.metrics
            .set_alerts_active(self.synthesizer.active_alerts().len() as i64);

        for class in classes {
            if let Err(e) = self.lifecycle.maybe_retrain(&class, now).await {
                warn!(
                    equipment_class = %class,
                    error = %e,
                    "Retraining pass failed"
                );
            }
        }
    }

    /// Evaluate one piece of equipment. Pure scoring against artifact
    /// snapshots; the snapshots are taken once so a concurrent publish is
    /// observed entirely or not at all.
    pub async fn evaluate_equipment(
        &mut self,
        equipment: &EquipmentRef,
        now: i64,
    ) -> Result<EvaluationOutcome> {
        let start = Instant::now();
        let class = equipment.equipment_class.as_str();

        let window = self
            .windows
            .latest_window(equipment)
            .await
            .with_context(|| format!("failed to read window for {}", equipment.equipment_id))?;

        // Windows overlap between ticks; only readings newer than the last
        // seen timestamp count as fresh samples for the retrain trigger.
        let fresh = match self.last_seen.get(&equipment.equipment_id) {
            Some(&mark) => window.readings.iter().filter(|r| r.timestamp > mark).count(),
            None => window.len(),
        };
        if let Some(newest) = window.readings.iter().map(|r| r.timestamp).max() {
            self.last_seen
                .insert(equipment.equipment_id.clone(), newest);
        }
        if fresh > 0 {
            self.lifecycle.record_samples(class, fresh as u64);
        }

        let vector = match self.extractor.extract(&window) {
            Ok(v) => v,
            Err(e) if e.is_retryable() => {
                let reason = e.to_string();
                self.metrics.inc_evaluations_unscored();
                self.logger
                    .log_unscored(&equipment.equipment_id, class, &reason);
                return Ok(EvaluationOutcome::Unscored { reason });
            }
            Err(e) => return Err(e.into()),
        };

        let anomaly_model = self.registry.anomaly_snapshot(class);
        let failure_model = self.registry.failure_snapshot(class);
        if anomaly_model.is_none() && failure_model.is_none() {
            let reason = PipelineError::ArtifactUnavailable {
                kind: ModelKind::Anomaly,
                class: class.to_string(),
            }
            .to_string();
            self.metrics.inc_evaluations_unscored();
            self.logger
                .log_unscored(&equipment.equipment_id, class, &reason);
            return Ok(EvaluationOutcome::Unscored { reason });
        }

        let anomaly = match anomaly_model {
            Some(model) => {
                let result = model.score(&vector)?;
                if result.is_anomalous {
                    self.metrics.inc_anomalies_detected();
                    self.logger.log_anomaly(&result, class);
                }
                Some(result)
            }
            None => None,
        };

        let forecast = match failure_model {
            Some(model) => {
                let forecast = model.predict(&vector)?;
                self.logger.log_forecast(&forecast, class);
                Some(forecast)
            }
            None => None,
        };

        let events = self
            .synthesizer
            .fuse(class, anomaly.as_ref(), forecast.as_ref(), now);
        let alert_events = events.len();
        for event in events {
            if let AlertEvent::Created { ref alert } = event {
                self.metrics
                    .inc_alerts_emitted(&alert.severity.to_string());
                self.logger.log_alert(alert);
            }
            let _ = self.alert_tx.send(event).await;
        }

        self.metrics
            .observe_evaluation_latency(start.elapsed().as_secs_f64());

        Ok(EvaluationOutcome::Scored {
            anomaly,
            forecast,
            alert_events,
        })
    }
}
