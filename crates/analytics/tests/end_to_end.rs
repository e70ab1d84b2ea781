//! End-to-end pipeline scenarios: a degrading machine raises a critical
//! alert with channel attribution, healthy machines stay quiet, duplicate
//! signals collapse into one alert, and artifact swaps stay atomic under
//! concurrent inference.

use analytics::alerts::{ActionTable, AlertEvent, AlertSeverity, AlertSynthesizer};
use analytics::anomaly::AnomalyModel;
use analytics::cancel::CancelToken;
use analytics::config::{AnomalyConfig, BoundsConfig, PipelineConfig, TrainingConfig};
use analytics::engine::{EvaluationEngine, EvaluationOutcome};
use analytics::failure::FailureModel;
use analytics::lifecycle::{ArtifactRegistry, LifecycleManager};
use analytics::models::{
    ChannelValues, EquipmentRef, FailureEvent, FeatureVector, ModelScope, Reading, Window,
};
use analytics::sources::{FailureEventSource, MemoryArtifactStore, WindowSource};
use analytics::{FeatureExtractor, StructuredLogger};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
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

fn extract(w: &Window) -> FeatureVector {
    FeatureExtractor::new(10, BoundsConfig::default())
        .extract(w)
        .unwrap()
}

fn trained_anomaly_model(version: &str) -> AnomalyModel {
    let baseline: Vec<FeatureVector> = (0..120)
        .map(|i| extract(&window("pump-1", 1000 + i as i64 * 800, 0.5)))
        .collect();
    AnomalyModel::train("pump", version, &baseline, &AnomalyConfig::default()).unwrap()
}

fn trained_failure_model(version: &str) -> FailureModel {
    let mut vectors = Vec::new();
    let mut events = Vec::new();
    for m in 0..4 {
        let id = format!("pump-{}", m);
        for i in 0..30 {
            vectors.push(extract(&window(&id, 1000 + i * 2000, 0.5 + i as f64 * 0.3)));
        }
        events.push(FailureEvent {
            equipment_id: id,
            timestamp: 1000 + 30 * 2000 + 3600,
            failure_mode: "bearing_wear".to_string(),
        });
    }
    for m in 0..2 {
        let id = format!("pump-healthy-{}", m);
        for i in 0..30 {
            vectors.push(extract(&window(&id, 1000 + i * 2000, 0.5)));
        }
    }
    vectors.sort_by_key(|v| v.timestamp);

    FailureModel::train(
        "pump",
        version,
        ModelScope::EquipmentClass,
        &vectors,
        &events,
        &TrainingConfig::default(),
        &CancelToken::new(),
    )
    .unwrap()
}

/// Window source whose vibration level can be changed between ticks.
struct AdjustableSource {
    equipment: EquipmentRef,
    // Vibration in hundredths, so the level is atomically adjustable.
    vibration_centi: AtomicI64,
}

impl AdjustableSource {
    fn new(equipment: EquipmentRef, vibration: f64) -> Self {
        Self {
            equipment,
            vibration_centi: AtomicI64::new((vibration * 100.0) as i64),
        }
    }

    fn set_vibration(&self, vibration: f64) {
        self.vibration_centi
            .store((vibration * 100.0) as i64, Ordering::SeqCst);
    }
}

#[async_trait]
impl WindowSource for AdjustableSource {
    async fn equipment(&self) -> Result<Vec<EquipmentRef>> {
        Ok(vec![self.equipment.clone()])
    }

    async fn latest_window(&self, equipment: &EquipmentRef) -> Result<Window> {
        let vibration = self.vibration_centi.load(Ordering::SeqCst) as f64 / 100.0;
        Ok(window(&equipment.equipment_id, 100_000, vibration))
    }

    async fn history(&self, _equipment_class: &str) -> Result<Vec<Window>> {
        Ok(vec![])
    }
}

struct NoEvents;

#[async_trait]
impl FailureEventSource for NoEvents {
    async fn events(&self, _equipment_class: &str) -> Result<Vec<FailureEvent>> {
        Ok(vec![])
    }
}

fn pump() -> EquipmentRef {
    EquipmentRef {
        equipment_id: "pump-9".to_string(),
        equipment_class: "pump".to_string(),
    }
}

fn build_engine(
    source: Arc<AdjustableSource>,
    registry: Arc<ArtifactRegistry>,
) -> (EvaluationEngine, mpsc::Receiver<AlertEvent>) {
    let lifecycle = Arc::new(LifecycleManager::new(
        Default::default(),
        AnomalyConfig::default(),
        TrainingConfig::default(),
        Arc::clone(&registry),
        Arc::new(MemoryArtifactStore::new()),
        Arc::clone(&source) as Arc<dyn WindowSource>,
        Arc::new(NoEvents),
        FeatureExtractor::new(10, BoundsConfig::default()),
        StructuredLogger::new("e2e-test"),
    ));
    EvaluationEngine::new(
        PipelineConfig::default(),
        registry,
        lifecycle,
        source,
        AlertSynthesizer::new(Default::default(), ActionTable::with_defaults()),
        StructuredLogger::new("e2e-test"),
    )
}

fn stocked_registry() -> Arc<ArtifactRegistry> {
    let registry = Arc::new(ArtifactRegistry::new(5));
    registry.publish_anomaly("pump", Arc::new(trained_anomaly_model("anomaly-v1")));
    registry.publish_failure("pump", Arc::new(trained_failure_model("failure-v1")));
    registry
}

#[tokio::test]
async fn rising_vibration_produces_critical_alert_with_attribution() {
    init_tracing();
    let source = Arc::new(AdjustableSource::new(pump(), 10.0));
    let (mut engine, mut rx) = build_engine(Arc::clone(&source), stocked_registry());

    let outcome = engine.evaluate_equipment(&pump(), 101_000).await.unwrap();
    match outcome {
        EvaluationOutcome::Scored { anomaly, .. } => {
            assert!(anomaly.unwrap().is_anomalous)
        }
        other => panic!("expected scored outcome, got {:?}", other),
    }

    let event = rx.recv().await.unwrap();
    let AlertEvent::Created { alert } = event else {
        panic!("expected alert creation, got {:?}", event);
    };
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert!(alert.reason_codes.contains("vibration_anomaly"));
    assert!(alert.reason_codes.contains("imminent_failure"));
    assert!(!alert.recommended_action.is_empty());
}

#[tokio::test]
async fn healthy_equipment_stays_quiet() {
    init_tracing();
    let source = Arc::new(AdjustableSource::new(pump(), 0.5));
    let (mut engine, mut rx) = build_engine(Arc::clone(&source), stocked_registry());

    let outcome = engine.evaluate_equipment(&pump(), 101_000).await.unwrap();
    match outcome {
        EvaluationOutcome::Scored { alert_events, .. } => assert_eq!(alert_events, 0),
        other => panic!("expected scored outcome, got {:?}", other),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn duplicate_signal_refreshes_and_resolves_once() {
    init_tracing();
    let source = Arc::new(AdjustableSource::new(pump(), 10.0));
    let (mut engine, mut rx) = build_engine(Arc::clone(&source), stocked_registry());

    engine.run_tick(101_000).await;
    let first = rx.recv().await.unwrap();
    assert!(matches!(first, AlertEvent::Created { .. }));

    // Same condition inside the cool-down: the alert absorbs it.
    engine.run_tick(101_300).await;
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, AlertEvent::Refreshed { .. }));

    // Vibration returns to normal; after a sustained quiet period the alert
    // resolves exactly once.
    source.set_vibration(0.5);
    engine.run_tick(101_300 + 3600).await;
    let third = rx.recv().await.unwrap();
    assert!(matches!(third, AlertEvent::Resolved { .. }));

    engine.run_tick(101_300 + 7200).await;
    assert!(rx.try_recv().is_err());
}

#[test]
fn artifact_swap_is_atomic_under_concurrent_inference() {
    init_tracing();
    let registry = Arc::new(ArtifactRegistry::new(5));
    let v1 = Arc::new(trained_anomaly_model("anomaly-v1"));
    let v2 = Arc::new(trained_anomaly_model("anomaly-v2"));
    registry.publish_anomaly("pump", Arc::clone(&v1));

    let probe = extract(&window("pump-9", 100_000, 10.0));

    let mut readers = Vec::new();
    for _ in 0..4 {
        let registry = Arc::clone(&registry);
        let probe = probe.clone();
        readers.push(std::thread::spawn(move || {
            for _ in 0..500 {
                // One snapshot per inference: the model seen here is
                // immutable for the whole call.
                let model = registry.anomaly_snapshot("pump").expect("artifact present");
                assert!(
                    model.version == "anomaly-v1" || model.version == "anomaly-v2",
                    "unexpected version {}",
                    model.version
                );
                let result = model.score(&probe).expect("scoring succeeds mid-swap");
                assert!((0.0..=1.0).contains(&result.score));
            }
        }));
    }

    let writer = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || {
            for i in 0..200 {
                let model = if i % 2 == 0 { Arc::clone(&v2) } else { Arc::clone(&v1) };
                registry.publish_anomaly("pump", model);
            }
        })
    };

    for reader in readers {
        reader.join().unwrap();
    }
    writer.join().unwrap();

    // The last publish wins and is fully visible.
    let active = registry.anomaly_snapshot("pump").unwrap();
    assert_eq!(active.version, "anomaly-v1");
}
