//! Random forest classifier over the three credit classes.
//!
//! CART trees with gini impurity, bootstrap sampling, sqrt(n_features)
//! candidate features per split and class-balanced sample weights.
//! Every tree draws from its own RNG stream so the forest is
//! reproducible for a given seed.

use crate::{
    error::{ScoreError, ScoreResult},
    rng::{RngBank, RngSlot, ScoreRng},
    synthetic::CLASS_COUNT,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { n_trees: 100, max_depth: 10, min_samples_split: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        distribution: [f64; CLASS_COUNT],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict(&self, row: &[f64]) -> ScoreResult<&[f64; CLASS_COUNT]> {
        let mut id = 0;
        // A well-formed tree reaches a leaf in at most nodes.len() steps.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(id) {
                Some(Node::Leaf { distribution }) => return Ok(distribution),
                Some(Node::Split { feature, threshold, left, right }) => {
                    let x = row.get(*feature).ok_or_else(|| {
                        ScoreError::ModelPrediction(format!(
                            "split on feature {feature} but row has {} features",
                            row.len()
                        ))
                    })?;
                    id = if x <= threshold { *left } else { *right };
                }
                None => {
                    return Err(ScoreError::ModelPrediction(format!("dangling node id {id}")));
                }
            }
        }
        Err(ScoreError::ModelPrediction("tree contains a cycle".into()))
    }

    fn validate(&self, n_features: usize) -> ScoreResult<()> {
        if self.nodes.is_empty() {
            return Err(ScoreError::ArtifactCorrupt("empty tree".into()));
        }
        for node in &self.nodes {
            match node {
                Node::Leaf { distribution } => {
                    let sum: f64 = distribution.iter().sum();
                    if !sum.is_finite() || (sum - 1.0).abs() > 1e-6 {
                        return Err(ScoreError::ArtifactCorrupt(format!(
                            "leaf distribution sums to {sum}"
                        )));
                    }
                }
                Node::Split { feature, left, right, .. } => {
                    if *feature >= n_features
                        || *left >= self.nodes.len()
                        || *right >= self.nodes.len()
                    {
                        return Err(ScoreError::ArtifactCorrupt("split out of range".into()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    params: ForestParams,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on standardised rows. `labels` are class indices in [0, CLASS_COUNT).
    pub fn fit<R: AsRef<[f64]>>(
        rows: &[R],
        labels: &[usize],
        params: ForestParams,
        seed: u64,
    ) -> ScoreResult<Self> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(ScoreError::InvalidTrainingData(format!(
                "{} rows vs {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(ScoreError::InvalidTrainingData("n_trees must be > 0".into()));
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= CLASS_COUNT) {
            return Err(ScoreError::InvalidTrainingData(format!("label {bad} out of range")));
        }
        let n_features = rows[0].as_ref().len();
        if rows.iter().any(|r| r.as_ref().len() != n_features) {
            return Err(ScoreError::InvalidTrainingData("ragged rows".into()));
        }

        let class_weights = balanced_class_weights(labels);
        let bank = RngBank::new(seed);
        let n = rows.len();

        let trees = (0..params.n_trees)
            .map(|t| {
                let mut rng = bank.for_stream(RngSlot::Forest, t as u64);
                let bootstrap: Vec<usize> =
                    (0..n).map(|_| rng.next_u64_below(n as u64) as usize).collect();
                let mut builder = TreeBuilder {
                    rows,
                    labels,
                    class_weights: &class_weights,
                    params,
                    n_features,
                    max_features: ((n_features as f64).sqrt() as usize).max(1),
                    rng,
                    nodes: Vec::new(),
                };
                builder.build(bootstrap, 0);
                DecisionTree { nodes: builder.nodes }
            })
            .collect();

        Ok(Self { n_features, params, trees })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the leaf distributions reached in every tree.
    pub fn predict_proba(&self, row: &[f64]) -> ScoreResult<[f64; CLASS_COUNT]> {
        if row.len() != self.n_features {
            return Err(ScoreError::ModelPrediction(format!(
                "forest expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(ScoreError::ModelPrediction("forest has no trees".into()));
        }
        let mut acc = [0.0; CLASS_COUNT];
        for tree in &self.trees {
            for (a, p) in acc.iter_mut().zip(tree.predict(row)?) {
                *a += p;
            }
        }
        let n = self.trees.len() as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        Ok(acc)
    }

    pub fn validate(&self) -> ScoreResult<()> {
        if self.trees.is_empty() {
            return Err(ScoreError::ArtifactCorrupt("forest has no trees".into()));
        }
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }
}

/// w_c = n / (n_classes * count_c). Absent classes get weight 0.
fn balanced_class_weights(labels: &[usize]) -> [f64; CLASS_COUNT] {
    let mut counts = [0usize; CLASS_COUNT];
    for &l in labels {
        counts[l] += 1;
    }
    let n = labels.len() as f64;
    let mut weights = [0.0; CLASS_COUNT];
    for (w, &c) in weights.iter_mut().zip(&counts) {
        if c > 0 {
            *w = n / (CLASS_COUNT as f64 * c as f64);
        }
    }
    weights
}

fn gini(counts: &[f64; CLASS_COUNT], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a, R> {
    rows: &'a [R],
    labels: &'a [usize],
    class_weights: &'a [f64; CLASS_COUNT],
    params: ForestParams,
    n_features: usize,
    max_features: usize,
    rng: ScoreRng,
    nodes: Vec<Node>,
}

impl<R: AsRef<[f64]>> TreeBuilder<'_, R> {
    fn value(&self, sample: usize, feature: usize) -> f64 {
        self.rows[sample].as_ref()[feature]
    }

    fn weighted_counts(&self, samples: &[usize]) -> [f64; CLASS_COUNT] {
        let mut counts = [0.0; CLASS_COUNT];
        for &s in samples {
            let label = self.labels[s];
            counts[label] += self.class_weights[label];
        }
        counts
    }

    /// Build the subtree for `samples` and return its node id.
    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let counts = self.weighted_counts(&samples);
        let total: f64 = counts.iter().sum();
        let pure = counts.iter().filter(|&&c| c > 0.0).count() <= 1;

        if pure || depth >= self.params.max_depth || samples.len() < self.params.min_samples_split {
            return self.push_leaf(counts, total);
        }

        let Some(split) = self.best_split(&samples, gini(&counts, total) * total) else {
            return self.push_leaf(counts, total);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .copied()
            .partition(|&s| self.value(s, split.feature) <= split.threshold);

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { distribution: [0.0; CLASS_COUNT] });
        let left_id = self.build(left, depth + 1);
        let right_id = self.build(right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn push_leaf(&mut self, counts: [f64; CLASS_COUNT], total: f64) -> usize {
        let distribution = if total > 0.0 {
            counts.map(|c| c / total)
        } else {
            [1.0 / CLASS_COUNT as f64; CLASS_COUNT]
        };
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    /// Visit features in random order. Constant features do not count
    /// towards `max_features`, so a split is found whenever one exists.
    fn best_split(&mut self, samples: &[usize], parent_impurity: f64) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        self.rng.shuffle(&mut features);

        let mut best: Option<BestSplit> = None;
        let mut visited = 0;
        for feature in features {
            if visited >= self.max_features && best.is_some() {
                break;
            }
            let Some(candidate) = self.best_split_on(samples, feature) else {
                continue;
            };
            visited += 1;
            if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                best = Some(candidate);
            }
        }
        best.filter(|b| b.impurity <= parent_impurity + 1e-12)
    }

    fn best_split_on(&self, samples: &[usize], feature: usize) -> Option<BestSplit> {
        if samples.len() < 2 {
            return None;
        }
        let mut sorted: Vec<(f64, usize)> = samples
            .iter()
            .map(|&s| (self.value(s, feature), self.labels[s]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut right = [0.0; CLASS_COUNT];
        for &(_, label) in &sorted {
            right[label] += self.class_weights[label];
        }
        let mut left = [0.0; CLASS_COUNT];
        let mut best: Option<BestSplit> = None;

        for i in 0..sorted.len() - 1 {
            let (x, label) = sorted[i];
            let w = self.class_weights[label];
            left[label] += w;
            right[label] -= w;

            let next = sorted[i + 1].0;
            if next <= x {
                continue;
            }
            let left_total: f64 = left.iter().sum();
            let right_total: f64 = right.iter().sum();
            let impurity =
                left_total * gini(&left, left_total) + right_total * gini(&right, right_total);
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = x + (next - x) / 2.0;
                if threshold >= next {
                    threshold = x;
                }
                best = Some(BestSplit { feature, threshold, impurity });
            }
        }
        best
    }
}
