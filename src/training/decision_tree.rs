//! Decision tree implementation

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Gains below this are treated as floating noise
const MIN_GAIN: f64 = 1e-12;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity over class indices `0..n_classes`
    Gini { n_classes: usize },
    /// Mean squared error (regression)
    Mse,
}

/// Running statistics of the targets on one side of a split
#[derive(Debug, Clone)]
enum SideStats {
    Classes { counts: Vec<usize>, n: usize },
    Moments { sum: f64, sq_sum: f64, n: usize },
}

impl SideStats {
    fn empty(criterion: Criterion) -> Self {
        match criterion {
            Criterion::Gini { n_classes } => SideStats::Classes {
                counts: vec![0; n_classes],
                n: 0,
            },
            Criterion::Mse => SideStats::Moments {
                sum: 0.0,
                sq_sum: 0.0,
                n: 0,
            },
        }
    }

    fn add(&mut self, y: f64) {
        match self {
            SideStats::Classes { counts, n } => {
                counts[y as usize] += 1;
                *n += 1;
            }
            SideStats::Moments { sum, sq_sum, n } => {
                *sum += y;
                *sq_sum += y * y;
                *n += 1;
            }
        }
    }

    fn remove(&mut self, y: f64) {
        match self {
            SideStats::Classes { counts, n } => {
                counts[y as usize] -= 1;
                *n -= 1;
            }
            SideStats::Moments { sum, sq_sum, n } => {
                *sum -= y;
                *sq_sum -= y * y;
                *n -= 1;
            }
        }
    }

    fn count(&self) -> usize {
        match self {
            SideStats::Classes { n, .. } | SideStats::Moments { n, .. } => *n,
        }
    }

    fn impurity(&self) -> f64 {
        match self {
            SideStats::Classes { counts, n } => {
                if *n == 0 {
                    return 0.0;
                }
                let n = *n as f64;
                1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
            }
            SideStats::Moments { sum, sq_sum, n } => {
                if *n == 0 {
                    return 0.0;
                }
                let n = *n as f64;
                // Var = E[X²] - E[X]²
                (sq_sum / n - (sum / n).powi(2)).max(0.0)
            }
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features drawn at random for every split (all when `None`)
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl DecisionTree {
    /// Classifier over labels encoded as `0..n_classes`
    pub fn new_classifier(n_classes: usize) -> Self {
        Self::with_criterion(Criterion::Gini { n_classes })
    }

    pub fn new_regressor() -> Self {
        Self::with_criterion(Criterion::Mse)
    }

    fn with_criterion(criterion: Criterion) -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion,
            random_state: 0,
            n_features: 0,
            feature_importances: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn is_classification(&self) -> bool {
        matches!(self.criterion, Criterion::Gini { .. })
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PipelineError::InsufficientRows {
                required: 1,
                actual: 0,
            });
        }
        if let Criterion::Gini { n_classes } = self.criterion {
            if let Some(bad) = y.iter().find(|&&v| v < 0.0 || v as usize >= n_classes) {
                return Err(PipelineError::Computation(format!(
                    "class index {} outside 0..{}",
                    bad, n_classes
                )));
            }
        }

        self.n_features = n_features;
        let mut importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(x, y, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let leaf = || TreeNode::Leaf {
            value: self.leaf_value(y, indices),
            n_samples,
        };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || is_pure(y, indices);
        if should_stop {
            return leaf();
        }

        let features = self.candidate_features(rng);
        let Some((feature, threshold, gain)) = self.find_best_split(x, y, indices, &features) else {
            return leaf();
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

        importances[feature] += n_samples as f64 * gain;

        let left = Box::new(self.build_tree(x, y, &left_idx, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_idx, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: feature,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Random feature subset for one split, in ascending order
    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut picked = sample(rng, self.n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    /// Best (feature, threshold, impurity decrease). Each feature is sorted
    /// once and swept left to right; ties go to the lower feature index.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<(usize, f64, f64)> {
        let mut parent = SideStats::empty(self.criterion);
        for &i in indices {
            parent.add(y[i]);
        }
        let parent_impurity = parent.impurity();
        let n = indices.len() as f64;

        let per_feature: Vec<Option<(usize, f64, f64)>> = features
            .par_iter()
            .map(|&feature| {
                let mut order = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

                let mut left = SideStats::empty(self.criterion);
                let mut right = parent.clone();
                let mut best: Option<(f64, f64)> = None;

                for pos in 0..order.len() - 1 {
                    let yi = y[order[pos]];
                    left.add(yi);
                    right.remove(yi);

                    let here = x[[order[pos], feature]];
                    let next = x[[order[pos + 1], feature]];
                    if here == next {
                        continue;
                    }
                    if left.count() < self.min_samples_leaf || right.count() < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (left.count() as f64 * left.impurity()
                        + right.count() as f64 * right.impurity())
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > MIN_GAIN && best.map_or(true, |(g, _)| gain > g) {
                        best = Some((gain, (here + next) / 2.0));
                    }
                }

                best.map(|(gain, threshold)| (feature, threshold, gain))
            })
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
    }

    /// Majority class (ties to the lower index) or mean target
    fn leaf_value(&self, y: &Array1<f64>, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        match self.criterion {
            Criterion::Gini { n_classes } => {
                let mut counts = vec![0usize; n_classes];
                for &i in indices {
                    counts[y[i] as usize] += 1;
                }
                argmax_count(&counts) as f64
            }
            Criterion::Mse => indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64,
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut node = root;
                loop {
                    match node {
                        TreeNode::Leaf { value, .. } => break *value,
                        TreeNode::Split {
                            feature_idx,
                            threshold,
                            left,
                            right,
                            ..
                        } => {
                            node = if row[*feature_idx] <= *threshold { &**left } else { &**right };
                        }
                    }
                }
            })
            .collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification()
    }

    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

/// Index of the largest count; ties go to the lowest index
pub(crate) fn argmax_count(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .fold((0, 0), |(bi, bc), (i, &c)| if c > bc { (i, c) } else { (bi, bc) })
        .0
}

fn is_pure(y: &Array1<f64>, indices: &[usize]) -> bool {
    match indices.first() {
        None => true,
        Some(&first) => indices.iter().all(|&i| (y[i] - y[first]).abs() < 1e-10),
    }
}
