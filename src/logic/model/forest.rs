//! Isolation Forest
//!
//! Each tree recursively splits a random subsample on a random feature at a
//! random value inside that feature's observed range. Points in sparse
//! regions are isolated after fewer splits, so a short mean path length
//! across the ensemble means "anomalous".
//!
//! Trees are stored as flat node arenas so an artifact carries every split
//! decision and can be scored without re-running training.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::error::ModelError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful BST search over `n` points,
/// used to normalize depths and to credit leaves holding several points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ============================================================================
// ENSEMBLE PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub n_estimators: usize,
    /// Effective subsample size (capped at the training set size)
    pub subsample_size: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl EnsembleParams {
    /// Cap the subsample at `n_samples` and derive the depth limit ceil(log2(ψ))
    pub fn for_training(n_estimators: usize, subsample_size: usize, n_samples: usize, seed: u64) -> Self {
        let psi = subsample_size.min(n_samples).max(1);
        let max_depth = (psi as f64).log2().ceil().max(1.0) as usize;
        Self {
            n_estimators,
            subsample_size: psi,
            max_depth,
            seed,
        }
    }
}

// ============================================================================
// TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    /// Root is `nodes[0]`; children always have larger indices than parents
    pub nodes: Vec<Node>,
}

impl IsolationTree {
    pub fn fit<R: Rng>(data: &[Vec<f64>], sample: &[usize], max_depth: usize, rng: &mut R) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, sample, 0, max_depth, rng);
        tree
    }

    fn grow<R: Rng>(
        &mut self,
        data: &[Vec<f64>],
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: indices.len() });

        if depth >= max_depth || indices.len() <= 1 {
            return id;
        }

        // Only features with spread inside this node can split it
        let n_features = data[indices[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(data[i][f]), hi.max(data[i][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let value = rng.gen_range(lo..hi);

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().copied().partition(|&i| data[i][feature] < value);

        let left = self.grow(data, &left_idx, depth + 1, max_depth, rng);
        let right = self.grow(data, &right_idx, depth + 1, max_depth, rng);

        self.nodes[id] = Node::Split {
            feature,
            value,
            left,
            right,
        };
        id
    }

    /// Splits taken to reach a leaf, plus the expected remainder for the points
    /// that leaf still holds
    pub fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes.get(node) {
                Some(Node::Split {
                    feature,
                    value,
                    left,
                    right,
                }) => {
                    let x = point.get(*feature).copied().unwrap_or(0.0);
                    node = if x < *value { *left } else { *right };
                    depth += 1.0;
                }
                Some(Node::Leaf { size }) => return depth + average_path_length(*size),
                None => return depth,
            }
        }
    }

    /// Structural check for trees loaded from disk
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (id, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                value,
                left,
                right,
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {} splits on feature {} of {}", id, feature, n_features));
                }
                if !value.is_finite() {
                    return Err(format!("node {} has non-finite split value", id));
                }
                // Forward-only links rule out cycles
                for child in [left, right] {
                    if *child <= id || *child >= self.nodes.len() {
                        return Err(format!("node {} has invalid child {}", id, child));
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// FOREST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    pub params: EnsembleParams,
    pub trees: Vec<IsolationTree>,
}

impl IsolationForest {
    /// Fit on standardized row-major data. Aborts once `budget` has elapsed
    /// since `started`.
    pub fn fit(
        data: &[Vec<f64>],
        params: EnsembleParams,
        started: Instant,
        budget: Duration,
    ) -> Result<Self, ModelError> {
        if data.is_empty() {
            return Err(ModelError::InsufficientData {
                available: 0,
                required: 1,
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let psi = params.subsample_size.min(data.len());
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            if started.elapsed() > budget {
                return Err(ModelError::TrainingBudgetExceeded {
                    budget,
                    trees_built: trees.len(),
                });
            }
            let sample = index::sample(&mut rng, data.len(), psi).into_vec();
            trees.push(IsolationTree::fit(data, &sample, params.max_depth, &mut rng));
        }

        Ok(Self { params, trees })
    }

    pub fn mean_path_length(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.path_length(point)).sum();
        total / self.trees.len() as f64
    }

    /// 2^(-E[h(x)] / c(ψ)) in (0, 1]; higher = more anomalous
    pub fn anomaly_score(&self, point: &[f64]) -> f64 {
        let c = average_path_length(self.params.subsample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-self.mean_path_length(point) / c)
    }
}
