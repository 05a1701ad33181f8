//! Random forest classifier
//!
//! Pure Rust bagged ensemble of Gini decision trees, used as the trainable
//! classifier behind [`TrainedClassifier`](super::backend::TrainedClassifier).
//!
//! # Algorithm
//! 1. Derive per-class weights (optionally balanced so both classes carry
//!    equal total weight)
//! 2. For each tree, draw a bootstrap sample and grow a depth-limited tree,
//!    considering a random subset of features at every split (more are drawn
//!    when none of the subset improves impurity)
//! 3. Class-1 probability is the mean of the per-tree leaf probabilities
//!
//! Training is fully determined by `seed`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Random forest hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Features considered per split; `None` means sqrt(n_features)
    pub max_features: Option<usize>,
    /// Reweight classes inversely to their frequency
    pub balanced_class_weight: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
            max_features: None,
            balanced_class_weight: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Node {
    Leaf {
        /// Weighted fraction of class 1 in this leaf
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single decision tree stored as a flat node list (root at index 0)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

/// Borrowed training state shared while growing one tree
struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    weights: &'a [f64],
    n_features: usize,
    max_features: usize,
    config: &'a ForestConfig,
}

impl TreeBuilder<'_> {
    fn grow(&self, indices: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        let mut nodes = Vec::new();
        self.build(&mut nodes, indices, 0, rng);
        DecisionTree { nodes }
    }

    fn build(
        &self,
        nodes: &mut Vec<Node>,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = nodes.len();
        let (w0, w1) = self.class_weights(&indices);
        let total = w0 + w1;
        let probability = if total > 0.0 { w1 / total } else { 0.0 };
        nodes.push(Node::Leaf { probability });

        let pure = w0 == 0.0 || w1 == 0.0;
        if pure || depth >= self.config.max_depth || indices.len() < self.config.min_samples_split
        {
            return id;
        }

        let Some((feature, threshold)) = self.best_split(&indices, gini(w0, w1), rng) else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][feature] <= threshold);

        let left = self.build(nodes, left, depth + 1, rng);
        let right = self.build(nodes, right, depth + 1, rng);
        nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn class_weights(&self, indices: &[usize]) -> (f64, f64) {
        indices.iter().fold((0.0, 0.0), |(w0, w1), &i| {
            if self.y[i] == 1 {
                (w0, w1 + self.weights[i])
            } else {
                (w0 + self.weights[i], w1)
            }
        })
    }

    /// Best (feature, threshold) by weighted Gini decrease, if any split helps
    fn best_split(
        &self,
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut StdRng,
    ) -> Option<(usize, f64)> {
        let mut order: Vec<usize> = (0..self.n_features).collect();
        order.shuffle(rng);
        let (total0, total1) = self.class_weights(indices);
        let total = total0 + total1;

        let mut best_impurity = parent_impurity - 1e-12;
        let mut best = None;
        let mut sorted = indices.to_vec();

        // Keep drawing features past max_features until some split helps
        for (drawn, &feature) in order.iter().enumerate() {
            if drawn >= self.max_features && best.is_some() {
                break;
            }

            sorted.sort_by(|&a, &b| {
                self.x[a][feature]
                    .partial_cmp(&self.x[b][feature])
                    .unwrap_or(Ordering::Equal)
            });

            let (mut left0, mut left1) = (0.0, 0.0);
            for pair in sorted.windows(2) {
                let (i, next) = (pair[0], pair[1]);
                if self.y[i] == 1 {
                    left1 += self.weights[i];
                } else {
                    left0 += self.weights[i];
                }

                let (value, next_value) = (self.x[i][feature], self.x[next][feature]);
                if value == next_value {
                    continue;
                }

                let left_total = left0 + left1;
                let right_total = total - left_total;
                if left_total <= 0.0 || right_total <= 0.0 {
                    continue;
                }

                let impurity = (left_total * gini(left0, left1)
                    + right_total * gini(total0 - left0, total1 - left1))
                    / total;

                if impurity < best_impurity {
                    best_impurity = impurity;
                    best = Some((feature, value + (next_value - value) / 2.0));
                }
            }
        }

        best
    }
}

impl DecisionTree {
    fn predict(&self, features: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { probability } => return *probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Structural check for trees read back from disk
    fn is_well_formed(&self, n_features: usize) -> bool {
        // Children always follow their parent, so a valid tree has no cycles
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(id, node)| match node {
                Node::Leaf { probability } => (0.0..=1.0).contains(probability),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < n_features
                        && threshold.is_finite()
                        && (id + 1..self.nodes.len()).contains(left)
                        && (id + 1..self.nodes.len()).contains(right)
                }
            })
    }
}

fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let (p0, p1) = (w0 / total, w1 / total);
    1.0 - p0 * p0 - p1 * p1
}

/// Fitted random forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest on rows `x` with binary labels `y`.
    pub fn fit(x: &[Vec<f64>], y: &[u8], config: &ForestConfig) -> Result<Self, String> {
        if x.is_empty() {
            return Err("cannot fit on an empty training set".to_string());
        }
        if x.len() != y.len() {
            return Err(format!("{} rows but {} labels", x.len(), y.len()));
        }
        if config.n_estimators == 0 {
            return Err("n_estimators must be at least 1".to_string());
        }

        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
            return Err("training rows must share a non-zero width".to_string());
        }

        let max_features = config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features);

        let class_weight = class_weights(y, config.balanced_class_weight);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = x.len();
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            // Bootstrap: a sample's weight is its draw count times its class weight
            let mut counts = vec![0u32; n];
            for _ in 0..n {
                counts[rng.gen_range(0..n)] += 1;
            }

            let weights: Vec<f64> = counts
                .iter()
                .zip(y)
                .map(|(&c, &label)| c as f64 * class_weight[label as usize])
                .collect();
            let indices: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

            let builder = TreeBuilder {
                x,
                y,
                weights: &weights,
                n_features,
                max_features,
                config,
            };
            trees.push(builder.grow(indices, &mut rng));
        }

        Ok(Self {
            config: config.clone(),
            n_features,
            trees,
        })
    }

    /// Class-1 probability for one row
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, String> {
        if features.len() != self.n_features {
            return Err(format!(
                "expected {} features, got {}",
                self.n_features,
                features.len()
            ));
        }
        if let Some(bad) = features.iter().find(|v| !v.is_finite()) {
            return Err(format!("feature value {} is not finite", bad));
        }

        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        Ok((sum / self.trees.len() as f64).clamp(0.0, 1.0))
    }

    /// Fraction of rows whose thresholded prediction matches the label
    pub fn accuracy(&self, x: &[Vec<f64>], y: &[u8]) -> Result<f64, String> {
        if x.is_empty() {
            return Err("cannot score an empty set".to_string());
        }

        let mut correct = 0usize;
        for (row, &label) in x.iter().zip(y) {
            let predicted = u8::from(self.predict_proba(row)? > 0.5);
            if predicted == label {
                correct += 1;
            }
        }
        Ok(correct as f64 / x.len() as f64)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Check a deserialized forest before it is allowed to serve
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if self.trees.iter().any(|t| !t.is_well_formed(self.n_features)) {
            return Err("forest contains a malformed tree".to_string());
        }
        Ok(())
    }
}

/// Per-class weights indexed by label
fn class_weights(y: &[u8], balanced: bool) -> [f64; 2] {
    if !balanced {
        return [1.0, 1.0];
    }

    let positives = y.iter().filter(|&&l| l == 1).count();
    let negatives = y.len() - positives;
    let weight = |count: usize| {
        if count == 0 {
            1.0
        } else {
            y.len() as f64 / (2.0 * count as f64)
        }
    };
    [weight(negatives), weight(positives)]
}
