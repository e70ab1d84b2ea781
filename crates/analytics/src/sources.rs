//! Boundary traits between the pipeline and its host
//!
//! Ingestion and persistence are behind traits so the pipeline core stays
//! free of storage technology. The crate ships an in-memory artifact store
//! for tests and embedded use; production hosts supply their own.

use crate::error::PipelineError;
use crate::models::{EquipmentRef, FailureEvent, ModelKind, Window};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Supplies sensor windows on demand. Windows are assembled by the host's
/// ingestion layer and never persisted by the pipeline.
#[async_trait]
pub trait WindowSource: Send + Sync {
    /// Equipment currently under evaluation.
    async fn equipment(&self) -> Result<Vec<EquipmentRef>>;

    /// The most recent window for one piece of equipment.
    async fn latest_window(&self, equipment: &EquipmentRef) -> Result<Window>;

    /// Historical windows for an equipment class, for training. An empty
    /// class string means the whole fleet.
    async fn history(&self, equipment_class: &str) -> Result<Vec<Window>>;
}

/// Supplies ground-truth failure events for label construction.
#[async_trait]
pub trait FailureEventSource: Send + Sync {
    /// Failure events for an equipment class. An empty class string means
    /// the whole fleet.
    async fn events(&self, equipment_class: &str) -> Result<Vec<FailureEvent>>;
}

/// Persists published model artifacts keyed by kind and equipment class.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, artifact: StoredArtifact) -> Result<()>;

    async fn get(&self, kind: ModelKind, equipment_class: &str)
        -> Result<Option<StoredArtifact>>;
}

/// A serialized artifact with its integrity checksum.
///
/// Payloads are sealed once at publication; `open` re-verifies the SHA-256
/// checksum so a store that corrupts data surfaces `ArtifactCorrupt` instead
/// of silently loading garbage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub kind: ModelKind,
    pub equipment_class: String,
    pub version: String,
    pub payload: Vec<u8>,
    pub checksum: String,
    pub stored_at: i64,
}

impl StoredArtifact {
    /// Serialize a model and checksum the payload.
    pub fn seal<T: Serialize>(
        kind: ModelKind,
        equipment_class: &str,
        version: &str,
        model: &T,
    ) -> Result<Self> {
        let payload = serde_json::to_vec(model)
            .with_context(|| format!("failed to serialize {} artifact {}", kind, version))?;
        let checksum = compute_checksum(&payload);

        Ok(Self {
            kind,
            equipment_class: equipment_class.to_string(),
            version: version.to_string(),
            payload,
            checksum,
            stored_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Verify the checksum and deserialize the payload.
    pub fn open<T: DeserializeOwned>(&self) -> Result<T, PipelineError> {
        let computed = compute_checksum(&self.payload);
        if computed != self.checksum {
            return Err(PipelineError::ArtifactCorrupt {
                kind: self.kind,
                class: self.equipment_class.clone(),
                detail: format!("checksum mismatch: expected {}, got {}", self.checksum, computed),
            });
        }

        serde_json::from_slice(&self.payload).map_err(|e| PipelineError::ArtifactCorrupt {
            kind: self.kind,
            class: self.equipment_class.clone(),
            detail: format!("deserialization failed: {}", e),
        })
    }
}

/// Compute SHA256 checksum of a payload
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// In-memory artifact store. Keeps the latest artifact per kind and class.
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<(ModelKind, String), StoredArtifact>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, artifact: StoredArtifact) -> Result<()> {
        self.artifacts
            .insert((artifact.kind, artifact.equipment_class.clone()), artifact);
        Ok(())
    }

    async fn get(
        &self,
        kind: ModelKind,
        equipment_class: &str,
    ) -> Result<Option<StoredArtifact>> {
        Ok(self
            .artifacts
            .get(&(kind, equipment_class.to_string()))
            .map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        threshold: f64,
        trees: Vec<u32>,
    }

    fn sample() -> Payload {
        Payload {
            threshold: 0.61,
            trees: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_seal_and_open() {
        let sealed =
            StoredArtifact::seal(ModelKind::Anomaly, "pump", "v1", &sample()).unwrap();
        assert_eq!(sealed.checksum.len(), 64);

        let opened: Payload = sealed.open().unwrap();
        assert_eq!(opened, sample());
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let mut sealed =
            StoredArtifact::seal(ModelKind::Failure, "pump", "v1", &sample()).unwrap();
        sealed.payload[0] ^= 0xff;

        let opened: Result<Payload, _> = sealed.open();
        assert!(matches!(
            opened,
            Err(PipelineError::ArtifactCorrupt { kind: ModelKind::Failure, .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryArtifactStore::new();
        let sealed =
            StoredArtifact::seal(ModelKind::Anomaly, "pump", "v3", &sample()).unwrap();
        store.put(sealed).await.unwrap();

        let loaded = store.get(ModelKind::Anomaly, "pump").await.unwrap().unwrap();
        assert_eq!(loaded.version, "v3");
        assert!(store.get(ModelKind::Failure, "pump").await.unwrap().is_none());
    }
}
