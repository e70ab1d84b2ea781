//! Unsupervised anomaly scoring
//!
//! Isolation-based outlier detection over baseline feature vectors, with a
//! contamination-calibrated flag threshold stored in the artifact.

mod forest;
mod scorer;

pub use forest::{average_path_length, IsolationForest, IsolationNode, IsolationTree};
pub use scorer::{AnomalyModel, FeatureBaseline, MIN_BASELINE_VECTORS};
