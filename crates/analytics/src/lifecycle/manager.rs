//! Model lifecycle management
//!
//! Tracks per-class training activity, decides when a retrain is due, builds
//! candidate artifacts out-of-band, and gates publication on held-out
//! validation. A failed candidate never replaces the active artifact; a bad
//! published artifact can be rolled back to the prior version.

use super::registry::{ArtifactRegistry, FLEET_CLASS};
use crate::anomaly::AnomalyModel;
use crate::cancel::CancelToken;
use crate::config::{AnomalyConfig, LifecycleConfig, TrainingConfig};
use crate::error::PipelineError;
use crate::failure::{build_labels, FailureModel};
use crate::features::FeatureExtractor;
use crate::models::{FailureEvent, FeatureVector, ModelKind, ModelScope};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::sources::{ArtifactStore, FailureEventSource, StoredArtifact, WindowSource};
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a retrain was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrainTrigger {
    /// Enough new samples accumulated since the last training run.
    SampleVolume,
    /// The scheduled retrain interval elapsed.
    Schedule,
    /// The false-positive alert rate crossed the drift bound.
    Drift,
}

impl std::fmt::Display for RetrainTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrainTrigger::SampleVolume => write!(f, "sample_volume"),
            RetrainTrigger::Schedule => write!(f, "schedule"),
            RetrainTrigger::Drift => write!(f, "drift"),
        }
    }
}

/// Per-class training bookkeeping.
#[derive(Debug, Default)]
struct ClassActivity {
    samples_since_train: u64,
    last_trained_at: Option<i64>,
    alert_outcomes: usize,
    false_positives: usize,
}

pub struct LifecycleManager {
    lifecycle_cfg: LifecycleConfig,
    anomaly_cfg: AnomalyConfig,
    training_cfg: TrainingConfig,
    registry: Arc<ArtifactRegistry>,
    store: Arc<dyn ArtifactStore>,
    windows: Arc<dyn WindowSource>,
    events: Arc<dyn FailureEventSource>,
    extractor: FeatureExtractor,
    activity: DashMap<String, ClassActivity>,
    cancels: DashMap<String, CancelToken>,
    version_counter: AtomicU64,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle_cfg: LifecycleConfig,
        anomaly_cfg: AnomalyConfig,
        training_cfg: TrainingConfig,
        registry: Arc<ArtifactRegistry>,
        store: Arc<dyn ArtifactStore>,
        windows: Arc<dyn WindowSource>,
        events: Arc<dyn FailureEventSource>,
        extractor: FeatureExtractor,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            lifecycle_cfg,
            anomaly_cfg,
            training_cfg,
            registry,
            store,
            windows,
            events,
            extractor,
            activity: DashMap::new(),
            cancels: DashMap::new(),
            version_counter: AtomicU64::new(1),
            metrics: PipelineMetrics::new(),
            logger,
        }
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    /// Record new samples seen for a class since the last training run.
    pub fn record_samples(&self, equipment_class: &str, count: u64) {
        self.activity
            .entry(equipment_class.to_string())
            .or_default()
            .samples_since_train += count;
    }

    /// Record operator feedback on an emitted alert. False-positive rate is
    /// the drift signal that forces early retraining.
    pub fn record_alert_outcome(&self, equipment_class: &str, false_positive: bool) {
        let mut activity = self.activity.entry(equipment_class.to_string()).or_default();
        activity.alert_outcomes += 1;
        if false_positive {
            activity.false_positives += 1;
        }
    }

    /// Whether a retrain is due for this class, and why.
    pub fn retrain_due(&self, equipment_class: &str, now: i64) -> Option<RetrainTrigger> {
        let activity = self.activity.get(equipment_class)?;

        if activity.alert_outcomes >= self.lifecycle_cfg.fp_min_outcomes {
            let fp_rate = activity.false_positives as f64 / activity.alert_outcomes as f64;
            if fp_rate > self.lifecycle_cfg.fp_rate_threshold {
                return Some(RetrainTrigger::Drift);
            }
        }

        if activity.samples_since_train >= self.lifecycle_cfg.retrain_sample_threshold {
            return Some(RetrainTrigger::SampleVolume);
        }

        match activity.last_trained_at {
            Some(trained_at) if now - trained_at >= self.lifecycle_cfg.retrain_interval_secs => {
                Some(RetrainTrigger::Schedule)
            }
            _ => None,
        }
    }

    /// Request cooperative cancellation of any in-flight training for a
    /// class. The partial candidate is discarded; the active artifact is
    /// untouched.
    pub fn cancel_training(&self, equipment_class: &str) {
        if let Some(token) = self.cancels.get(equipment_class) {
            token.cancel();
        }
    }

    /// Roll both model kinds of a class back to their prior versions.
    pub fn rollback(&self, kind: ModelKind, equipment_class: &str) -> bool {
        match kind {
            ModelKind::Anomaly => self.registry.rollback_anomaly(equipment_class).is_some(),
            ModelKind::Failure => self.registry.rollback_failure(equipment_class).is_some(),
        }
    }

    /// Restore persisted artifacts for the given classes at startup.
    pub async fn load_persisted(&self, equipment_classes: &[String]) -> Result<usize> {
        let mut loaded = 0;
        for class in equipment_classes {
            if let Some(stored) = self
                .store
                .get(ModelKind::Anomaly, class)
                .await
                .with_context(|| format!("failed to read anomaly artifact for {}", class))?
            {
                let model: AnomalyModel = stored.open()?;
                self.registry.publish_anomaly(class, Arc::new(model));
                loaded += 1;
            }
            if let Some(stored) = self
                .store
                .get(ModelKind::Failure, class)
                .await
                .with_context(|| format!("failed to read failure artifact for {}", class))?
            {
                let model: FailureModel = stored.open()?;
                self.registry.publish_failure(class, Arc::new(model));
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Retrain both model kinds for a class if a trigger fired.
    pub async fn maybe_retrain(&self, equipment_class: &str, now: i64) -> Result<()> {
        let Some(trigger) = self.retrain_due(equipment_class, now) else {
            return Ok(());
        };

        info!(
            event = "retrain_triggered",
            equipment_class = %equipment_class,
            trigger = %trigger,
            "Retraining models"
        );

        let vectors = self.class_vectors(equipment_class).await?;
        let events = self
            .events
            .events(equipment_class)
            .await
            .with_context(|| format!("failed to read failure events for {}", equipment_class))?;

        let mut published = false;
        match self.train_anomaly(equipment_class, &vectors).await {
            Ok(model) => {
                self.logger.log_training(
                    ModelKind::Anomaly,
                    equipment_class,
                    &model.version,
                    &trigger.to_string(),
                );
                published = true;
            }
            Err(e) => warn!(
                event = "training_failed",
                kind = "anomaly",
                equipment_class = %equipment_class,
                error = %e,
                "Anomaly training failed; keeping active artifact"
            ),
        }
        match self.train_failure(equipment_class, &vectors, &events).await {
            Ok(model) => {
                self.logger.log_training(
                    ModelKind::Failure,
                    &model.equipment_class,
                    &model.version,
                    &trigger.to_string(),
                );
                published = true;
            }
            Err(e) => warn!(
                event = "training_failed",
                kind = "failure",
                equipment_class = %equipment_class,
                error = %e,
                "Failure training failed; keeping active artifact"
            ),
        }

        // Nothing landed: keep the trigger armed so the next tick retries
        // instead of waiting for a whole new threshold to accumulate.
        if published {
            if let Some(mut activity) = self.activity.get_mut(equipment_class) {
                activity.samples_since_train = 0;
                activity.alert_outcomes = 0;
                activity.false_positives = 0;
                activity.last_trained_at = Some(now);
            }
        }

        Ok(())
    }

    /// Train, validate and publish an anomaly candidate for a class.
    ///
    /// Validation checks calibration on a time-ordered held-out tail: the
    /// flagged fraction must stay within `calibration_tolerance` of the
    /// contamination target, otherwise the candidate is rejected and the
    /// active artifact stays published.
    pub async fn train_anomaly(
        &self,
        equipment_class: &str,
        vectors: &[FeatureVector],
    ) -> Result<Arc<AnomalyModel>, PipelineError> {
        let (train, holdout) = self.split_holdout(vectors);
        let version = self.next_version(ModelKind::Anomaly, equipment_class);
        let candidate = {
            let class = equipment_class.to_string();
            let version = version.clone();
            let train = train.to_vec();
            let cfg = self.anomaly_cfg.clone();
            tokio::task::spawn_blocking(move || AnomalyModel::train(&class, &version, &train, &cfg))
                .await
                .map_err(|e| PipelineError::TrainingAborted {
                    class: equipment_class.to_string(),
                    detail: e.to_string(),
                })??
        };

        if !holdout.is_empty() {
            let flagged = holdout
                .iter()
                .filter_map(|v| candidate.score(v).ok())
                .filter(|r| r.is_anomalous)
                .count();
            let fraction = flagged as f64 / holdout.len() as f64;
            let deviation = (fraction - self.anomaly_cfg.contamination).abs();
            if deviation > self.anomaly_cfg.calibration_tolerance {
                let detail = format!(
                    "held-out flagged fraction {:.3} deviates {:.3} from contamination {:.3}",
                    fraction, deviation, self.anomaly_cfg.contamination
                );
                self.metrics.inc_validation_failures();
                self.logger
                    .log_validation_failure(ModelKind::Anomaly, equipment_class, &detail);
                return Err(PipelineError::ValidationRegression {
                    kind: ModelKind::Anomaly,
                    class: equipment_class.to_string(),
                    detail,
                });
            }
        }

        let model = Arc::new(candidate);
        self.registry.publish_anomaly(equipment_class, Arc::clone(&model));
        self.metrics.inc_training_runs();
        self.metrics
            .set_model_version("anomaly", equipment_class, &version);
        self.persist(ModelKind::Anomaly, equipment_class, &version, model.as_ref())
            .await;
        Ok(model)
    }

    /// Train, validate and publish a failure candidate for a class.
    ///
    /// A class without enough positive labels falls back to a fleet-scope
    /// model trained across all classes, published under the fleet key so
    /// predictions for the starved class never refuse outright.
    pub async fn train_failure(
        &self,
        equipment_class: &str,
        vectors: &[FeatureVector],
        events: &[FailureEvent],
    ) -> Result<Arc<FailureModel>, PipelineError> {
        match self
            .train_failure_scoped(equipment_class, ModelScope::EquipmentClass, vectors, events)
            .await
        {
            Err(PipelineError::InsufficientLabels { class, positives, need }) => {
                info!(
                    event = "fleet_fallback",
                    equipment_class = %class,
                    positives = positives,
                    need = need,
                    "Too few positive labels for a per-class model; training fleet model"
                );
                let fleet_vectors = self.fleet_vectors().await.map_err(|e| {
                    PipelineError::InsufficientLabels {
                        class: format!("{} (fleet history unavailable: {})", class, e),
                        positives,
                        need,
                    }
                })?;
                let fleet_events = self.events.events("").await.map_err(|e| {
                    PipelineError::InsufficientLabels {
                        class: format!("{} (fleet events unavailable: {})", class, e),
                        positives,
                        need,
                    }
                })?;
                self.train_failure_scoped(
                    FLEET_CLASS,
                    ModelScope::Fleet,
                    &fleet_vectors,
                    &fleet_events,
                )
                .await
            }
            other => other,
        }
    }

    async fn train_failure_scoped(
        &self,
        equipment_class: &str,
        scope: ModelScope,
        vectors: &[FeatureVector],
        events: &[FailureEvent],
    ) -> Result<Arc<FailureModel>, PipelineError> {
        let token = CancelToken::new();
        self.cancels
            .insert(equipment_class.to_string(), token.clone());

        let (train, holdout) = self.split_holdout(vectors);
        let version = self.next_version(ModelKind::Failure, equipment_class);
        let result = {
            let class = equipment_class.to_string();
            let version = version.clone();
            let train = train.to_vec();
            let events = events.to_vec();
            let cfg = self.training_cfg.clone();
            let token = token.clone();
            tokio::task::spawn_blocking(move || {
                FailureModel::train(&class, &version, scope, &train, &events, &cfg, &token)
            })
            .await
            .map_err(|e| PipelineError::TrainingAborted {
                class: equipment_class.to_string(),
                detail: e.to_string(),
            })
        };
        self.cancels.remove(equipment_class);
        let candidate = result??;

        self.validate_failure_candidate(&candidate, holdout, events)?;

        let model = Arc::new(candidate);
        self.registry.publish_failure(equipment_class, Arc::clone(&model));
        self.metrics.inc_training_runs();
        self.metrics
            .set_model_version("failure", equipment_class, &version);
        self.persist(ModelKind::Failure, equipment_class, &version, model.as_ref())
            .await;
        Ok(model)
    }

    /// Recall check on the held-out tail at the longest horizon. Skipped
    /// when the holdout contains no positive labels to recall.
    fn validate_failure_candidate(
        &self,
        candidate: &FailureModel,
        holdout: &[FeatureVector],
        events: &[FailureEvent],
    ) -> Result<(), PipelineError> {
        let Some(&longest) = candidate.horizons_secs.last() else {
            return Ok(());
        };
        let labeled = build_labels(
            holdout,
            events,
            longest,
            self.training_cfg.post_failure_exclusion_secs,
        );
        let positives: Vec<_> = labeled.iter().filter(|l| l.positive).collect();
        if positives.is_empty() {
            debug!(
                equipment_class = %candidate.equipment_class,
                "No positive labels in holdout; skipping recall validation"
            );
            return Ok(());
        }

        let recalled = positives
            .iter()
            .filter(|l| {
                candidate.forests.last().map(|f| f.predict(&l.values)).unwrap_or(0.0)
                    >= candidate.rul_probability_level
            })
            .count();
        let recall = recalled as f64 / positives.len() as f64;
        if recall < self.training_cfg.recall_floor {
            let detail = format!(
                "held-out recall {:.3} below floor {:.3} ({} positives)",
                recall,
                self.training_cfg.recall_floor,
                positives.len()
            );
            self.metrics.inc_validation_failures();
            self.logger.log_validation_failure(
                ModelKind::Failure,
                &candidate.equipment_class,
                &detail,
            );
            return Err(PipelineError::ValidationRegression {
                kind: ModelKind::Failure,
                class: candidate.equipment_class.clone(),
                detail,
            });
        }
        Ok(())
    }

    /// Time-ordered split: the holdout is the most recent tail so validation
    /// sees data the candidate never trained on.
    fn split_holdout<'a>(
        &self,
        vectors: &'a [FeatureVector],
    ) -> (&'a [FeatureVector], &'a [FeatureVector]) {
        let holdout_len =
            (vectors.len() as f64 * self.training_cfg.holdout_fraction).round() as usize;
        let cut = vectors.len().saturating_sub(holdout_len);
        vectors.split_at(cut)
    }

    fn next_version(&self, kind: ModelKind, equipment_class: &str) -> String {
        let n = self.version_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-v{}", kind, equipment_class, n)
    }

    /// Persist a published artifact. Persistence failure is logged, not
    /// propagated: the registry swap already happened and inference must
    /// continue on the new artifact.
    async fn persist<T: serde::Serialize>(
        &self,
        kind: ModelKind,
        equipment_class: &str,
        version: &str,
        model: &T,
    ) {
        let sealed = match StoredArtifact::seal(kind, equipment_class, version, model) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    event = "artifact_persist_failed",
                    kind = %kind,
                    equipment_class = %equipment_class,
                    error = %e,
                    "Failed to seal artifact"
                );
                return;
            }
        };
        if let Err(e) = self.store.put(sealed).await {
            warn!(
                event = "artifact_persist_failed",
                kind = %kind,
                equipment_class = %equipment_class,
                error = %e,
                "Failed to persist artifact"
            );
        }
    }

    async fn class_vectors(&self, equipment_class: &str) -> Result<Vec<FeatureVector>> {
        let windows = self
            .windows
            .history(equipment_class)
            .await
            .with_context(|| format!("failed to read history for {}", equipment_class))?;
        let mut vectors: Vec<FeatureVector> = windows
            .iter()
            .filter_map(|w| self.extractor.extract(w).ok())
            .collect();
        vectors.sort_by_key(|v| v.timestamp);
        Ok(vectors)
    }

    async fn fleet_vectors(&self) -> Result<Vec<FeatureVector>> {
        let windows = self
            .windows
            .history("")
            .await
            .context("failed to read fleet history")?;
        let mut vectors: Vec<FeatureVector> = windows
            .iter()
            .filter_map(|w| self.extractor.extract(w).ok())
            .collect();
        vectors.sort_by_key(|v| v.timestamp);
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundsConfig;
    use crate::models::{ChannelValues, EquipmentRef, Reading, Window};
    use crate::sources::MemoryArtifactStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StaticWindows {
        by_class: HashMap<String, Vec<Window>>,
    }

    #[async_trait]
    impl WindowSource for StaticWindows {
        async fn equipment(&self) -> Result<Vec<EquipmentRef>> {
            Ok(vec![])
        }

        async fn latest_window(&self, equipment: &EquipmentRef) -> Result<Window> {
            Ok(Window::new(equipment.equipment_id.clone(), vec![]))
        }

        async fn history(&self, equipment_class: &str) -> Result<Vec<Window>> {
            if equipment_class.is_empty() {
                return Ok(self.by_class.values().flatten().cloned().collect());
            }
            Ok(self
                .by_class
                .get(equipment_class)
                .cloned()
                .unwrap_or_default())
        }
    }

    struct StaticEvents {
        by_class: HashMap<String, Vec<FailureEvent>>,
    }

    #[async_trait]
    impl FailureEventSource for StaticEvents {
        async fn events(&self, equipment_class: &str) -> Result<Vec<FailureEvent>> {
            if equipment_class.is_empty() {
                return Ok(self.by_class.values().flatten().cloned().collect());
            }
            Ok(self
                .by_class
                .get(equipment_class)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn window(equipment_id: &str, start: i64, vibration: f64) -> Window {
        let readings = (0..12)
            .map(|j| Reading {
                equipment_id: equipment_id.to_string(),
                timestamp: start + j as i64 * 60,
                values: ChannelValues {
                    temperature: Some(60.0 + (j % 3) as f64 * 0.5),
                    pressure: Some(100.0 + (j % 2) as f64),
                    vibration: Some(vibration + (j % 4) as f64 * 0.02),
                    power: Some(300.0),
                },
            })
            .collect();
        Window::new(equipment_id, readings)
    }

    fn healthy_vectors(count: usize) -> Vec<FeatureVector> {
        let extractor = FeatureExtractor::new(10, BoundsConfig::default());
        (0..count)
            .map(|i| {
                extractor
                    .extract(&window("eq-1", 1000 + i as i64 * 800, 0.5))
                    .unwrap()
            })
            .collect()
    }

    fn manager(
        windows: StaticWindows,
        events: StaticEvents,
        lifecycle_cfg: LifecycleConfig,
    ) -> LifecycleManager {
        LifecycleManager::new(
            lifecycle_cfg,
            AnomalyConfig::default(),
            TrainingConfig::default(),
            Arc::new(ArtifactRegistry::new(5)),
            Arc::new(MemoryArtifactStore::new()),
            Arc::new(windows),
            Arc::new(events),
            FeatureExtractor::new(10, BoundsConfig::default()),
            StructuredLogger::new("test"),
        )
    }

    fn counter_value(name: &str) -> f64 {
        prometheus::gather()
            .iter()
            .find(|mf| mf.get_name() == name)
            .and_then(|mf| mf.get_metric().first().map(|m| m.get_gauge().get_value()))
            .unwrap_or(0.0)
    }

    fn model_version_exported(kind: &str, equipment_class: &str, version: &str) -> bool {
        prometheus::gather()
            .iter()
            .filter(|mf| mf.get_name() == "pipeline_model_version_info")
            .flat_map(|mf| mf.get_metric())
            .any(|m| {
                let mut kind_ok = false;
                let mut class_ok = false;
                let mut version_ok = false;
                for label in m.get_label() {
                    match label.get_name() {
                        "kind" => kind_ok = label.get_value() == kind,
                        "equipment_class" => class_ok = label.get_value() == equipment_class,
                        "version" => version_ok = label.get_value() == version,
                        _ => {}
                    }
                }
                kind_ok && class_ok && version_ok
            })
    }

    fn empty_sources() -> (StaticWindows, StaticEvents) {
        (
            StaticWindows {
                by_class: HashMap::new(),
            },
            StaticEvents {
                by_class: HashMap::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_train_anomaly_publishes_and_persists() {
        let (windows, events) = empty_sources();
        let mgr = manager(windows, events, LifecycleConfig::default());
        let vectors = healthy_vectors(120);

        let runs_before = counter_value("pipeline_training_runs_total");
        let model = mgr.train_anomaly("pump", &vectors).await.unwrap();
        assert_eq!(model.equipment_class, "pump");
        assert!(counter_value("pipeline_training_runs_total") >= runs_before + 1.0);
        assert!(model_version_exported("anomaly", "pump", &model.version));

        let snapshot = mgr.registry().anomaly_snapshot("pump").unwrap();
        assert_eq!(snapshot.version, model.version);

        let stored = mgr
            .store
            .get(ModelKind::Anomaly, "pump")
            .await
            .unwrap()
            .unwrap();
        let reloaded: AnomalyModel = stored.open().unwrap();
        assert_eq!(reloaded.threshold, model.threshold);
    }

    #[tokio::test]
    async fn test_validation_regression_keeps_old_artifact() {
        let (windows, events) = empty_sources();
        let mut mgr = manager(windows, events, LifecycleConfig::default());
        let vectors = healthy_vectors(120);

        let v1 = mgr.train_anomaly("pump", &vectors).await.unwrap();

        // Impossible tolerance: any held-out deviation rejects the candidate.
        mgr.anomaly_cfg.calibration_tolerance = -1.0;
        let failures_before = counter_value("pipeline_validation_failures_total");
        let err = mgr.train_anomaly("pump", &vectors).await;
        assert!(matches!(
            err,
            Err(PipelineError::ValidationRegression {
                kind: ModelKind::Anomaly,
                ..
            })
        ));
        assert!(
            counter_value("pipeline_validation_failures_total") >= failures_before + 1.0
        );

        let active = mgr.registry().anomaly_snapshot("pump").unwrap();
        assert_eq!(active.version, v1.version);
    }

    #[tokio::test]
    async fn test_fleet_fallback_on_starved_class() {
        // "pump" has history but no failure events; the fleet has plenty.
        let extractor = FeatureExtractor::new(10, BoundsConfig::default());
        let mut pump_windows = Vec::new();
        for i in 0..40 {
            pump_windows.push(window("pump-1", 1000 + i * 2000, 0.5));
        }

        let mut fan_windows = Vec::new();
        let mut fan_events = Vec::new();
        for m in 0..4 {
            let id = format!("fan-{}", m);
            for i in 0..30 {
                let vibration = 0.5 + i as f64 * 0.3;
                fan_windows.push(window(&id, 1000 + i * 2000, vibration));
            }
            fan_events.push(FailureEvent {
                equipment_id: id,
                timestamp: 1000 + 30 * 2000 + 3600,
                failure_mode: "bearing_wear".to_string(),
            });
        }

        let windows = StaticWindows {
            by_class: [
                ("pump".to_string(), pump_windows.clone()),
                ("fan".to_string(), fan_windows),
            ]
            .into_iter()
            .collect(),
        };
        let events = StaticEvents {
            by_class: [("fan".to_string(), fan_events)].into_iter().collect(),
        };
        let mgr = manager(windows, events, LifecycleConfig::default());

        let mut pump_vectors: Vec<FeatureVector> = pump_windows
            .iter()
            .map(|w| extractor.extract(w).unwrap())
            .collect();
        pump_vectors.sort_by_key(|v| v.timestamp);

        let model = mgr.train_failure("pump", &pump_vectors, &[]).await.unwrap();
        assert_eq!(model.scope, ModelScope::Fleet);

        // The fleet model backs the pump class through snapshot fallback.
        let snapshot = mgr.registry().failure_snapshot("pump").unwrap();
        assert_eq!(snapshot.version, model.version);
    }

    #[test]
    fn test_retrain_triggers() {
        let (windows, events) = empty_sources();
        let cfg = LifecycleConfig {
            retrain_sample_threshold: 100,
            retrain_interval_secs: 3600,
            fp_rate_threshold: 0.5,
            fp_min_outcomes: 4,
            versions_to_keep: 5,
        };
        let mgr = manager(windows, events, cfg);

        assert!(mgr.retrain_due("pump", 0).is_none());

        mgr.record_samples("pump", 50);
        assert!(mgr.retrain_due("pump", 0).is_none());
        mgr.record_samples("pump", 60);
        assert_eq!(
            mgr.retrain_due("pump", 0),
            Some(RetrainTrigger::SampleVolume)
        );

        // Drift outranks sample volume.
        for _ in 0..3 {
            mgr.record_alert_outcome("pump", true);
        }
        mgr.record_alert_outcome("pump", false);
        assert_eq!(mgr.retrain_due("pump", 0), Some(RetrainTrigger::Drift));
    }

    #[test]
    fn test_schedule_trigger_after_interval() {
        let (windows, events) = empty_sources();
        let cfg = LifecycleConfig {
            retrain_interval_secs: 3600,
            ..LifecycleConfig::default()
        };
        let mgr = manager(windows, events, cfg);

        mgr.activity.entry("pump".to_string()).or_default().last_trained_at = Some(1000);
        assert!(mgr.retrain_due("pump", 2000).is_none());
        assert_eq!(
            mgr.retrain_due("pump", 1000 + 3600),
            Some(RetrainTrigger::Schedule)
        );
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_trigger_armed() {
        // No history at all: both trainings fail and nothing publishes.
        let (windows, events) = empty_sources();
        let cfg = LifecycleConfig {
            retrain_sample_threshold: 10,
            ..LifecycleConfig::default()
        };
        let mgr = manager(windows, events, cfg);

        mgr.record_samples("pump", 10);
        assert_eq!(
            mgr.retrain_due("pump", 0),
            Some(RetrainTrigger::SampleVolume)
        );

        mgr.maybe_retrain("pump", 0).await.unwrap();

        // The counters stay intact so the next tick retries immediately.
        assert_eq!(
            mgr.retrain_due("pump", 0),
            Some(RetrainTrigger::SampleVolume)
        );
    }

    #[tokio::test]
    async fn test_cancelled_training_discards_candidate() {
        let (windows, events) = empty_sources();
        let mgr = manager(windows, events, LifecycleConfig::default());

        // Pre-cancelled token: the first tree iteration observes it.
        let token = CancelToken::new();
        token.cancel();
        mgr.cancels.insert("pump".to_string(), token.clone());

        let extractor = FeatureExtractor::new(10, BoundsConfig::default());
        let mut vectors = Vec::new();
        let mut failure_events = Vec::new();
        for m in 0..4 {
            let id = format!("pump-{}", m);
            for i in 0..30 {
                vectors.push(
                    extractor
                        .extract(&window(&id, 1000 + i * 2000, 0.5 + i as f64 * 0.3))
                        .unwrap(),
                );
            }
            failure_events.push(FailureEvent {
                equipment_id: id,
                timestamp: 1000 + 30 * 2000 + 3600,
                failure_mode: "bearing_wear".to_string(),
            });
        }
        vectors.sort_by_key(|v| v.timestamp);

        let result = FailureModel::train(
            "pump",
            "v1",
            ModelScope::EquipmentClass,
            &vectors,
            &failure_events,
            &mgr.training_cfg,
            &token,
        );
        assert!(matches!(
            result,
            Err(PipelineError::TrainingCancelled { .. })
        ));
        assert!(mgr.registry().failure_snapshot("pump").is_none());
    }
}
