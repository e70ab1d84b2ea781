//! Time-aligned label construction for failure training
//!
//! A feature vector is positive for horizon H when a failure event for the
//! same equipment falls strictly after the vector and within H of it.
//! Vectors recorded at or after a failure (inside the post-failure exclusion
//! gap) are dropped entirely, so post-failure behavior can never leak into
//! pre-failure labels of the same episode.

use crate::models::{FailureEvent, FeatureVector};

/// One training example: schema-ordered values plus its horizon label.
#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub values: Vec<f64>,
    pub timestamp: i64,
    pub positive: bool,
}

/// Build labeled examples for one horizon.
pub fn build_labels(
    vectors: &[FeatureVector],
    events: &[FailureEvent],
    horizon_secs: i64,
    post_failure_exclusion_secs: i64,
) -> Vec<LabeledExample> {
    vectors
        .iter()
        .filter_map(|vector| {
            let equipment_events: Vec<&FailureEvent> = events
                .iter()
                .filter(|e| e.equipment_id == vector.equipment_id)
                .collect();

            // Drop vectors inside any post-failure exclusion gap.
            let excluded = equipment_events.iter().any(|e| {
                vector.timestamp >= e.timestamp
                    && vector.timestamp < e.timestamp + post_failure_exclusion_secs
            });
            if excluded {
                return None;
            }

            // Positive only for events strictly in the vector's future.
            let positive = equipment_events.iter().any(|e| {
                e.timestamp > vector.timestamp && e.timestamp <= vector.timestamp + horizon_secs
            });

            Some(LabeledExample {
                values: vector.values.clone(),
                timestamp: vector.timestamp,
                positive,
            })
        })
        .collect()
}

/// Count of positive examples in a labeled set.
pub fn positive_count(examples: &[LabeledExample]) -> usize {
    examples.iter().filter(|e| e.positive).count()
}
