//! Bagged classification trees over flat node arrays
//!
//! Each tree trains on a bootstrap sample with a random feature subset per
//! split (Gini impurity). Probabilities are the mean of per-tree leaf
//! positive fractions. Nodes live in index-linked arrays so trained forests
//! serialize directly into artifacts.

use super::labels::LabeledExample;
use crate::cancel::CancelToken;
use crate::error::PipelineError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

const NO_CHILD: u32 = u32::MAX;

/// Candidate split thresholds evaluated per feature.
const SPLIT_CANDIDATES: usize = 16;

/// One node of a classification tree. Leaf when `left == NO_CHILD`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: u32,
    /// NaN feature values always route left.
    pub threshold: f64,
    pub left: u32,
    pub right: u32,
    /// Fraction of positive training examples at this node; leaves supply
    /// the tree's vote.
    pub positive_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationTree {
    pub nodes: Vec<TreeNode>,
}

impl ClassificationTree {
    /// Positive-class probability for one point.
    pub fn predict(&self, point: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.left == NO_CHILD {
                return node.positive_fraction;
            }
            let value = point[node.feature as usize];
            idx = if value.is_nan() || value < node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

/// Training limits for one forest.
#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub tree_count: usize,
    pub max_depth: usize,
    pub min_leaf: usize,
}

/// Bagged ensemble voting by averaged leaf fractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaggedForest {
    pub trees: Vec<ClassificationTree>,
}

impl BaggedForest {
    /// Fit a forest on labeled examples.
    ///
    /// The cancel token is checked between tree iterations; a cancelled fit
    /// returns [`PipelineError::TrainingCancelled`] and the partial forest is
    /// dropped.
    pub fn fit(
        examples: &[LabeledExample],
        params: ForestParams,
        rng: &mut StdRng,
        cancel: &CancelToken,
        class: &str,
    ) -> Result<Self, PipelineError> {
        let n = examples.len();
        let dim = examples.first().map(|e| e.values.len()).unwrap_or(0);
        // sqrt(dim) features per split, the usual bagging heuristic.
        let features_per_split = ((dim as f64).sqrt().ceil() as usize).clamp(1, dim.max(1));

        let mut trees = Vec::with_capacity(params.tree_count);
        for _ in 0..params.tree_count {
            if cancel.is_cancelled() {
                return Err(PipelineError::TrainingCancelled {
                    class: class.to_string(),
                });
            }

            // Bootstrap sample with replacement.
            let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut nodes = Vec::new();
            build_node(
                examples,
                &indices,
                0,
                params,
                features_per_split,
                &mut nodes,
                rng,
            );
            trees.push(ClassificationTree { nodes });
        }

        Ok(Self { trees })
    }

    /// Mean positive-class probability across the ensemble.
    pub fn predict(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(point)).sum::<f64>() / self.trees.len() as f64
    }
}

fn positive_fraction(examples: &[LabeledExample], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let positives = indices.iter().filter(|&&i| examples[i].positive).count();
    positives as f64 / indices.len() as f64
}

fn gini(p: f64) -> f64 {
    2.0 * p * (1.0 - p)
}

fn build_node(
    examples: &[LabeledExample],
    indices: &[usize],
    depth: usize,
    params: ForestParams,
    features_per_split: usize,
    nodes: &mut Vec<TreeNode>,
    rng: &mut StdRng,
) -> u32 {
    let idx = nodes.len() as u32;
    let fraction = positive_fraction(examples, indices);
    nodes.push(TreeNode {
        feature: 0,
        threshold: 0.0,
        left: NO_CHILD,
        right: NO_CHILD,
        positive_fraction: fraction,
    });

    let pure = fraction <= f64::EPSILON || fraction >= 1.0 - f64::EPSILON;
    if depth >= params.max_depth || indices.len() < 2 * params.min_leaf || pure {
        return idx;
    }

    let Some((feature, threshold)) = best_split(examples, indices, features_per_split, rng) else {
        return idx;
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices.iter().partition(|&&i| {
        let v = examples[i].values[feature];
        v.is_nan() || v < threshold
    });
    if left_idx.len() < params.min_leaf || right_idx.len() < params.min_leaf {
        return idx;
    }

    let left = build_node(
        examples,
        &left_idx,
        depth + 1,
        params,
        features_per_split,
        nodes,
        rng,
    );
    let right = build_node(
        examples,
        &right_idx,
        depth + 1,
        params,
        features_per_split,
        nodes,
        rng,
    );
    nodes[idx as usize].feature = feature as u32;
    nodes[idx as usize].threshold = threshold;
    nodes[idx as usize].left = left;
    nodes[idx as usize].right = right;
    idx
}

/// Pick the Gini-best (feature, threshold) among a random feature subset.
fn best_split(
    examples: &[LabeledExample],
    indices: &[usize],
    features_per_split: usize,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let dim = examples[indices[0]].values.len();
    let mut features: Vec<usize> = (0..dim).collect();
    features.shuffle(rng);
    features.truncate(features_per_split);

    let parent_gini = gini(positive_fraction(examples, indices));
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in features {
        let mut values: Vec<f64> = indices
            .iter()
            .filter_map(|&i| {
                let v = examples[i].values[feature];
                v.is_finite().then_some(v)
            })
            .collect();
        if values.len() < 2 {
            continue;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();
        if values.len() < 2 {
            continue;
        }

        let step = (values.len() / SPLIT_CANDIDATES).max(1);
        for pair in values.windows(2).step_by(step) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices.iter().partition(|&&i| {
                let v = examples[i].values[feature];
                v.is_nan() || v < threshold
            });
            if left.is_empty() || right.is_empty() {
                continue;
            }
            let total = indices.len() as f64;
            let weighted = gini(positive_fraction(examples, &left)) * left.len() as f64 / total
                + gini(positive_fraction(examples, &right)) * right.len() as f64 / total;
            let gain = parent_gini - weighted;
            if gain > best.map(|(_, _, g)| g).unwrap_or(1e-9) {
                best = Some((feature, threshold, gain));
            }
        }
    }

    best.map(|(f, t, _)| (f, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn separable_examples(count: usize) -> Vec<LabeledExample> {
        // Positive class sits above 5.0 on the first feature.
        (0..count)
            .map(|i| {
                let positive = i % 2 == 0;
                let base = if positive { 8.0 } else { 2.0 };
                LabeledExample {
                    values: vec![base + (i % 5) as f64 * 0.1, (i % 3) as f64],
                    timestamp: i as i64,
                    positive,
                }
            })
            .collect()
    }

    fn params() -> ForestParams {
        ForestParams {
            tree_count: 25,
            max_depth: 6,
            min_leaf: 2,
        }
    }

    #[test]
    fn test_learns_separable_classes() {
        let examples = separable_examples(200);
        let mut rng = StdRng::seed_from_u64(42);
        let forest =
            BaggedForest::fit(&examples, params(), &mut rng, &CancelToken::new(), "pump").unwrap();

        assert!(forest.predict(&[8.5, 1.0]) > 0.8);
        assert!(forest.predict(&[1.5, 1.0]) < 0.2);
    }

    #[test]
    fn test_probability_in_unit_interval() {
        let examples = separable_examples(100);
        let mut rng = StdRng::seed_from_u64(1);
        let forest =
            BaggedForest::fit(&examples, params(), &mut rng, &CancelToken::new(), "pump").unwrap();

        for point in [[5.0, 0.0], [0.0, 0.0], [100.0, -3.0], [f64::NAN, 1.0]] {
            let p = forest.predict(&point);
            assert!((0.0..=1.0).contains(&p), "p was {}", p);
        }
    }

    #[test]
    fn test_cancellation_discards_candidate() {
        let examples = separable_examples(100);
        let mut rng = StdRng::seed_from_u64(1);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = BaggedForest::fit(&examples, params(), &mut rng, &cancel, "pump").unwrap_err();
        assert!(matches!(err, PipelineError::TrainingCancelled { .. }));
    }

    #[test]
    fn test_fit_deterministic_for_seed() {
        let examples = separable_examples(120);
        let mut rng_a = StdRng::seed_from_u64(9);
        let mut rng_b = StdRng::seed_from_u64(9);
        let a = BaggedForest::fit(&examples, params(), &mut rng_a, &CancelToken::new(), "pump")
            .unwrap();
        let b = BaggedForest::fit(&examples, params(), &mut rng_b, &CancelToken::new(), "pump")
            .unwrap();

        assert_eq!(a.predict(&[6.0, 1.0]), b.predict(&[6.0, 1.0]));
    }
}
