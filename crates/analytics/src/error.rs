//! Error taxonomy for the analytics pipeline
//!
//! All failures are equipment- or class-scoped; none of these variants is
//! fatal for the pipeline as a whole. Callers distinguish retryable
//! conditions (`InsufficientData`), degraded modes (`InsufficientLabels`,
//! `ArtifactUnavailable`) and operator-attention conditions
//! (`ValidationRegression`, `ArtifactCorrupt`).

use crate::models::ModelKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Window too short or too sparse. Caller should wait for more samples
    /// and retry; not fatal.
    #[error("insufficient data: {got} samples, need at least {need}")]
    InsufficientData { got: usize, need: usize },

    /// Too few positive training labels for a per-class model. Training
    /// falls back to a fleet-scope model rather than refusing predictions.
    #[error("insufficient labels for class {class}: {positives} positive examples, need {need}")]
    InsufficientLabels {
        class: String,
        positives: usize,
        need: usize,
    },

    /// No trained model is active yet for this equipment class. Inference
    /// reports an explicit unscored outcome, never a silent zero score.
    #[error("no active {kind} artifact for equipment class {class}")]
    ArtifactUnavailable { kind: ModelKind, class: String },

    /// Candidate artifact failed the minimum quality check. The previously
    /// active artifact stays published.
    #[error("candidate {kind} artifact for class {class} failed validation: {detail}")]
    ValidationRegression {
        kind: ModelKind,
        class: String,
        detail: String,
    },

    /// Stored artifact payload failed checksum or deserialization. Fatal for
    /// this class until retrained or rolled back.
    #[error("stored {kind} artifact for class {class} is corrupt: {detail}")]
    ArtifactCorrupt {
        kind: ModelKind,
        class: String,
        detail: String,
    },

    /// Training was cancelled cooperatively; the partial candidate was
    /// discarded and nothing was published.
    #[error("training cancelled for class {class}")]
    TrainingCancelled { class: String },

    /// The background training task died before producing a candidate.
    /// Nothing was published; the active artifact is untouched.
    #[error("training task for class {class} aborted: {detail}")]
    TrainingAborted { class: String, detail: String },

    /// Feature vector was built against a different schema version than the
    /// model expects.
    #[error("feature schema mismatch: vector has version {vector}, model expects {model}")]
    SchemaMismatch { vector: u32, model: u32 },
}

impl PipelineError {
    /// True when the caller should simply retry later with more data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::InsufficientData { .. })
    }
}
