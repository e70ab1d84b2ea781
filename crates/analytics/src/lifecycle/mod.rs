//! Model lifecycle: active artifact registry and retraining management

mod manager;
mod registry;

pub use manager::{LifecycleManager, RetrainTrigger};
pub use registry::{ArtifactRegistry, FLEET_CLASS};
