//! Random Forest implementation

use super::cancel::CancellationToken;
use super::decision_tree::{argmax_count, DecisionTree};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for the number of features tried at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Depth limit per tree; unbounded when `None`
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Sample rows with replacement for each tree
    pub bootstrap: bool,
    pub random_state: u64,
    /// `Some(k)` for a classifier over `0..k`
    n_classes: Option<usize>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl RandomForest {
    /// Classifier over labels encoded as `0..n_classes`
    pub fn new_classifier(n_estimators: usize, n_classes: usize) -> Self {
        Self::build(n_estimators, Some(n_classes), MaxFeatures::Sqrt)
    }

    pub fn new_regressor(n_estimators: usize) -> Self {
        Self::build(n_estimators, None, MaxFeatures::All)
    }

    fn build(n_estimators: usize, n_classes: Option<usize>, max_features: MaxFeatures) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators: n_estimators.max(1),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features,
            bootstrap: true,
            random_state: 42,
            n_classes,
            feature_importances: None,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn compute_max_features(&self, n_features: usize) -> usize {
        match self.max_features {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .max(1)
    }

    /// Fit the forest. Trees are built in parallel; each one checks `cancel`
    /// before it starts.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, cancel: &CancellationToken) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(PipelineError::InsufficientRows { required: 1, actual: 0 });
        }

        self.n_features = n_features;
        let max_features = self.compute_max_features(n_features);
        let base_seed = self.random_state;

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                cancel.check()?;

                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let x_boot = x.select(Axis(0), &sample_indices);
                let y_boot: Array1<f64> = sample_indices.iter().map(|&i| y[i]).collect();

                let mut tree = match self.n_classes {
                    Some(k) => DecisionTree::new_classifier(k),
                    None => DecisionTree::new_regressor(),
                }
                .with_min_samples_split(self.min_samples_split)
                .with_min_samples_leaf(self.min_samples_leaf)
                .with_max_features(max_features)
                .with_random_state(rng.gen());
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit(&x_boot, &y_boot)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total_importances = vec![0.0; self.n_features];

        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (total, &val) in total_importances.iter_mut().zip(imp.iter()) {
                    *total += val;
                }
            }
        }

        let total: f64 = total_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut total_importances {
                *imp /= total;
            }
        }

        self.feature_importances = Some(Array1::from_vec(total_importances));
    }

    /// Majority vote (ties to the lower class index) or mean of the trees
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let n_samples = x.nrows();
        let predictions = match self.n_classes {
            Some(k) => (0..n_samples)
                .map(|i| {
                    let mut votes = vec![0usize; k];
                    for preds in &all_predictions {
                        votes[preds[i] as usize] += 1;
                    }
                    argmax_count(&votes) as f64
                })
                .collect(),
            None => (0..n_samples)
                .map(|i| all_predictions.iter().map(|p| p[i]).sum::<f64>() / all_predictions.len() as f64)
                .collect(),
        };

        Ok(predictions)
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier() {
        let x = array![[0.0, 0.0], [0.1, 0.1], [0.2, 0.2], [1.0, 1.0], [1.1, 1.1], [1.2, 1.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut rf = RandomForest::new_classifier(10, 2).with_random_state(42);
        rf.fit(&x, &y, &CancellationToken::new()).unwrap();

        let predictions = rf.predict(&x).unwrap();
        let accuracy = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, a)| (*p - *a).abs() < 0.5)
            .count() as f64
            / y.len() as f64;

        assert!(accuracy >= 0.8, "Accuracy too low: {}", accuracy);
        assert_eq!(rf.n_trees(), 10);
    }

    #[test]
    fn test_regressor() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut rf = RandomForest::new_regressor(10).with_random_state(42);
        rf.fit(&x, &y, &CancellationToken::new()).unwrap();

        let predictions = rf.predict(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;

        assert!(mse < 2.0, "MSE too high: {}", mse);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let x = array![[1.0, 3.0], [2.0, 1.0], [3.0, 4.0], [4.0, 1.0], [5.0, 5.0], [6.0, 9.0]];
        let y = array![1.5, 2.0, 3.5, 4.0, 5.5, 6.0];

        let fit = || {
            let mut rf = RandomForest::new_regressor(8).with_random_state(3);
            rf.fit(&x, &y, &CancellationToken::new()).unwrap();
            (rf.predict(&x).unwrap(), rf.feature_importances().unwrap().clone())
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];

        let mut rf = RandomForest::new_regressor(10).with_random_state(42);
        rf.fit(&x, &y, &CancellationToken::new()).unwrap();

        let importances = rf.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!((importances.sum() - 1.0).abs() < 1e-9);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_cancelled_fit() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0, 1.0];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut rf = RandomForest::new_classifier(4, 2);
        assert!(matches!(rf.fit(&x, &y, &cancel), Err(PipelineError::Cancelled)));
    }
}
