//! Active artifact registry with atomic swap and rollback history
//!
//! Inference reads go through `Arc` snapshots: a caller clones the `Arc`
//! once, then scores against an immutable artifact for the rest of the call.
//! Publication is a single map insert, so concurrent readers observe either
//! the old artifact or the new one, never a mix.

use crate::anomaly::AnomalyModel;
use crate::failure::FailureModel;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry key for the cross-class fallback failure model.
pub const FLEET_CLASS: &str = "fleet";

pub struct ArtifactRegistry {
    anomaly: DashMap<String, Arc<AnomalyModel>>,
    failure: DashMap<String, Arc<FailureModel>>,
    anomaly_history: DashMap<String, Vec<Arc<AnomalyModel>>>,
    failure_history: DashMap<String, Vec<Arc<FailureModel>>>,
    versions_to_keep: usize,
}

impl ArtifactRegistry {
    pub fn new(versions_to_keep: usize) -> Self {
        Self {
            anomaly: DashMap::new(),
            failure: DashMap::new(),
            anomaly_history: DashMap::new(),
            failure_history: DashMap::new(),
            versions_to_keep,
        }
    }

    /// Snapshot the active anomaly artifact for a class.
    pub fn anomaly_snapshot(&self, equipment_class: &str) -> Option<Arc<AnomalyModel>> {
        self.anomaly.get(equipment_class).map(|e| Arc::clone(e.value()))
    }

    /// Snapshot the active failure artifact for a class, falling back to the
    /// fleet-scope model when the class has none.
    pub fn failure_snapshot(&self, equipment_class: &str) -> Option<Arc<FailureModel>> {
        self.failure
            .get(equipment_class)
            .or_else(|| self.failure.get(FLEET_CLASS))
            .map(|e| Arc::clone(e.value()))
    }

    /// Publish a new anomaly artifact. The previous one moves to the
    /// rollback history.
    pub fn publish_anomaly(&self, equipment_class: &str, model: Arc<AnomalyModel>) {
        let version = model.version.clone();
        if let Some(old) = self.anomaly.insert(equipment_class.to_string(), model) {
            let mut history = self
                .anomaly_history
                .entry(equipment_class.to_string())
                .or_default();
            history.insert(0, old);
            history.truncate(self.versions_to_keep);
        }
        info!(
            event = "artifact_published",
            kind = "anomaly",
            equipment_class = %equipment_class,
            version = %version,
            "Published anomaly artifact"
        );
    }

    /// Publish a new failure artifact. The previous one moves to the
    /// rollback history.
    pub fn publish_failure(&self, equipment_class: &str, model: Arc<FailureModel>) {
        let version = model.version.clone();
        if let Some(old) = self.failure.insert(equipment_class.to_string(), model) {
            let mut history = self
                .failure_history
                .entry(equipment_class.to_string())
                .or_default();
            history.insert(0, old);
            history.truncate(self.versions_to_keep);
        }
        info!(
            event = "artifact_published",
            kind = "failure",
            equipment_class = %equipment_class,
            version = %version,
            "Published failure artifact"
        );
    }

    /// Restore the most recent prior anomaly artifact. The replaced artifact
    /// is discarded, not re-queued.
    pub fn rollback_anomaly(&self, equipment_class: &str) -> Option<Arc<AnomalyModel>> {
        let prior = self
            .anomaly_history
            .get_mut(equipment_class)
            .and_then(|mut h| if h.is_empty() { None } else { Some(h.remove(0)) });

        match prior {
            Some(model) => {
                info!(
                    event = "artifact_rollback",
                    kind = "anomaly",
                    equipment_class = %equipment_class,
                    version = %model.version,
                    "Rolled back anomaly artifact"
                );
                self.anomaly
                    .insert(equipment_class.to_string(), Arc::clone(&model));
                Some(model)
            }
            None => {
                warn!(
                    event = "artifact_rollback",
                    kind = "anomaly",
                    equipment_class = %equipment_class,
                    "No prior anomaly artifact available for rollback"
                );
                None
            }
        }
    }

    /// Restore the most recent prior failure artifact.
    pub fn rollback_failure(&self, equipment_class: &str) -> Option<Arc<FailureModel>> {
        let prior = self
            .failure_history
            .get_mut(equipment_class)
            .and_then(|mut h| if h.is_empty() { None } else { Some(h.remove(0)) });

        match prior {
            Some(model) => {
                info!(
                    event = "artifact_rollback",
                    kind = "failure",
                    equipment_class = %equipment_class,
                    version = %model.version,
                    "Rolled back failure artifact"
                );
                self.failure
                    .insert(equipment_class.to_string(), Arc::clone(&model));
                Some(model)
            }
            None => {
                warn!(
                    event = "artifact_rollback",
                    kind = "failure",
                    equipment_class = %equipment_class,
                    "No prior failure artifact available for rollback"
                );
                None
            }
        }
    }

    /// Classes with an active anomaly artifact.
    pub fn anomaly_classes(&self) -> Vec<String> {
        self.anomaly.iter().map(|e| e.key().clone()).collect()
    }

    /// Classes with an active failure artifact.
    pub fn failure_classes(&self) -> Vec<String> {
        self.failure.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnomalyConfig, BoundsConfig};
    use crate::features::FeatureExtractor;
    use crate::models::{ChannelValues, FeatureVector, Reading, Window};

    fn trained_model(version: &str) -> Arc<AnomalyModel> {
        let vectors: Vec<FeatureVector> = (0..20)
            .map(|i| {
                let readings = (0..12)
                    .map(|j| Reading {
                        equipment_id: "eq-1".to_string(),
                        timestamp: 1000 + (i * 12 + j) as i64 * 60,
                        values: ChannelValues {
                            temperature: Some(60.0 + (j % 3) as f64),
                            pressure: Some(100.0),
                            vibration: Some(0.5 + (i % 4) as f64 * 0.05),
                            power: Some(300.0),
                        },
                    })
                    .collect();
                FeatureExtractor::new(10, BoundsConfig::default())
                    .extract(&Window::new("eq-1", readings))
                    .unwrap()
            })
            .collect();

        Arc::new(
            AnomalyModel::train("pump", version, &vectors, &AnomalyConfig::default()).unwrap(),
        )
    }

    #[test]
    fn test_snapshot_missing_class() {
        let registry = ArtifactRegistry::new(5);
        assert!(registry.anomaly_snapshot("pump").is_none());
        assert!(registry.failure_snapshot("pump").is_none());
    }

    #[test]
    fn test_publish_and_snapshot() {
        let registry = ArtifactRegistry::new(5);
        registry.publish_anomaly("pump", trained_model("v1"));

        let snapshot = registry.anomaly_snapshot("pump").unwrap();
        assert_eq!(snapshot.version, "v1");
        assert_eq!(registry.anomaly_classes(), vec!["pump".to_string()]);
    }

    #[test]
    fn test_rollback_restores_prior_version() {
        let registry = ArtifactRegistry::new(5);
        registry.publish_anomaly("pump", trained_model("v1"));
        registry.publish_anomaly("pump", trained_model("v2"));

        let restored = registry.rollback_anomaly("pump").unwrap();
        assert_eq!(restored.version, "v1");
        assert_eq!(registry.anomaly_snapshot("pump").unwrap().version, "v1");

        // History is now exhausted.
        assert!(registry.rollback_anomaly("pump").is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let registry = ArtifactRegistry::new(2);
        for v in ["v1", "v2", "v3", "v4", "v5"] {
            registry.publish_anomaly("pump", trained_model(v));
        }

        // Only the two most recent prior versions survive.
        assert_eq!(registry.rollback_anomaly("pump").unwrap().version, "v4");
        assert_eq!(registry.rollback_anomaly("pump").unwrap().version, "v3");
        assert!(registry.rollback_anomaly("pump").is_none());
    }
}
