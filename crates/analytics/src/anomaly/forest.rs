//! Isolation forest over flat node arrays
//!
//! Trees are stored as `Vec<IsolationNode>` with index links rather than
//! boxed node graphs, so artifacts serialize directly for the store. Shorter
//! isolation paths mean easier separation from the baseline, which maps to
//! higher anomaly scores.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant, used in the average-path-length normalizer.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Marker for a node without children.
const NO_CHILD: u32 = u32::MAX;

/// One node of an isolation tree. Leaf when `left == NO_CHILD`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IsolationNode {
    /// Index into the feature vector; unused in leaves.
    pub feature: u32,
    /// Split value; NaN feature values always route left.
    pub split: f64,
    pub left: u32,
    pub right: u32,
    /// Number of training samples that reached this node; leaves use it for
    /// the residual path-length term.
    pub size: u32,
}

/// One isolation tree as an index-linked node array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    pub nodes: Vec<IsolationNode>,
}

impl IsolationTree {
    /// Path length from root to the leaf isolating `point`.
    pub fn path_length(&self, point: &[f64]) -> f64 {
        let mut depth = 0.0;
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.left == NO_CHILD {
                return depth + average_path_length(node.size as usize);
            }
            let value = point[node.feature as usize];
            // NaN (missing-channel sentinel) takes the left branch so a
            // missing channel degrades gracefully instead of aborting.
            idx = if value.is_nan() || value < node.split {
                node.left as usize
            } else {
                node.right as usize
            };
            depth += 1.0;
        }
    }
}

/// Ensemble of isolation trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    pub trees: Vec<IsolationTree>,
    /// Sub-sample size each tree was grown from; normalizes scores.
    pub sample_size: usize,
}

impl IsolationForest {
    /// Grow a forest over `data` (rows of schema-ordered feature values).
    ///
    /// Deterministic for a fixed `rng` seed and identical input.
    pub fn fit(data: &[Vec<f64>], tree_count: usize, sample_size: usize, rng: &mut StdRng) -> Self {
        let n = data.len();
        let per_tree = sample_size.min(n).max(1);
        let height_limit = (per_tree as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..tree_count)
            .map(|_| {
                let indices: Vec<usize> = if per_tree < n {
                    sample(rng, n, per_tree).into_vec()
                } else {
                    (0..n).collect()
                };
                let mut nodes = Vec::new();
                build_node(data, &indices, 0, height_limit, &mut nodes, rng);
                IsolationTree { nodes }
            })
            .collect();

        Self {
            trees,
            sample_size: per_tree,
        }
    }

    /// Anomaly score in [0, 1]; higher is more anomalous.
    pub fn score(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.path_length(point)).sum();
        let mean_path = total / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= f64::EPSILON {
            return 0.0;
        }
        2f64.powf(-mean_path / c)
    }
}

/// Recursively build a subtree, returning its node index.
fn build_node(
    data: &[Vec<f64>],
    indices: &[usize],
    depth: usize,
    height_limit: usize,
    nodes: &mut Vec<IsolationNode>,
    rng: &mut StdRng,
) -> u32 {
    let idx = nodes.len() as u32;
    nodes.push(IsolationNode {
        feature: 0,
        split: 0.0,
        left: NO_CHILD,
        right: NO_CHILD,
        size: indices.len() as u32,
    });

    if indices.len() <= 1 || depth >= height_limit {
        return idx;
    }

    let Some((feature, split)) = pick_split(data, indices, rng) else {
        return idx;
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices.iter().partition(|&&i| {
        let v = data[i][feature];
        v.is_nan() || v < split
    });
    if left_idx.is_empty() || right_idx.is_empty() {
        return idx;
    }

    let left = build_node(data, &left_idx, depth + 1, height_limit, nodes, rng);
    let right = build_node(data, &right_idx, depth + 1, height_limit, nodes, rng);
    nodes[idx as usize].feature = feature as u32;
    nodes[idx as usize].split = split;
    nodes[idx as usize].left = left;
    nodes[idx as usize].right = right;
    idx
}

/// Choose a random feature with spread among the finite values, and a
/// uniform split within its range. Returns `None` when nothing separates.
fn pick_split(data: &[Vec<f64>], indices: &[usize], rng: &mut StdRng) -> Option<(usize, f64)> {
    let dim = data[indices[0]].len();
    let mut candidates: Vec<(usize, f64, f64)> = Vec::new();
    for feature in 0..dim {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &i in indices {
            let v = data[i][feature];
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        if hi > lo {
            candidates.push((feature, lo, hi));
        }
    }
    if candidates.is_empty() {
        return None;
    }
    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    Some((feature, rng.gen_range(lo..hi)))
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_GAMMA;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}
