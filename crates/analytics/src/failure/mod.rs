//! Supervised failure-probability and remaining-useful-life estimation
//!
//! Bagged decision-tree ensembles per prediction horizon, trained on
//! time-aligned labels derived from historical failure events.

mod forest;
mod labels;
mod predictor;

pub use forest::{BaggedForest, ClassificationTree, ForestParams, TreeNode};
pub use labels::{build_labels, positive_count, LabeledExample};
pub use predictor::{FailureModel, MIN_TRAINING_EXAMPLES};
