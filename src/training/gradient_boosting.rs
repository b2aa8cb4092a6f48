//! Gradient Boosting implementation
//!
//! Boosted regression trees fitted on residuals. The classifier keeps one
//! score per class and fits one tree per class and round on the softmax
//! gradient.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::cancel::CancellationToken;
use super::decision_tree::DecisionTree;
use crate::error::{PipelineError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Depth of each regression tree
    pub max_depth: usize,
    /// Minimum rows in a leaf
    pub min_samples_leaf: usize,
    /// Row subsample ratio per round
    pub subsample: f64,
    /// Column subsample ratio per round
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            random_state: 42,
        }
    }
}

/// One fitted tree and the columns it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stage {
    tree: DecisionTree,
    columns: Vec<usize>,
}

impl Stage {
    fn fit(
        config: &GradientBoostingConfig,
        x: &Array2<f64>,
        residuals: &Array1<f64>,
        rows: &[usize],
        columns: Vec<usize>,
        seed: u64,
    ) -> Result<Self> {
        let x_sub = x.select(Axis(0), rows).select(Axis(1), &columns);
        let y_sub: Array1<f64> = rows.iter().map(|&i| residuals[i]).collect();

        let mut tree = DecisionTree::new_regressor()
            .with_max_depth(config.max_depth)
            .with_min_samples_leaf(config.min_samples_leaf)
            .with_random_state(seed);
        tree.fit(&x_sub, &y_sub)?;
        Ok(Self { tree, columns })
    }

    /// Tree output for every row of `x`
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.tree.predict(&x.select(Axis(1), &self.columns))
    }

    fn add_importances(&self, totals: &mut [f64]) {
        if let Some(imp) = self.tree.feature_importances() {
            for (&col, &val) in self.columns.iter().zip(imp.iter()) {
                totals[col] += val;
            }
        }
    }
}

fn sample_sorted(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let size = ((n as f64) * ratio.clamp(0.0, 1.0)).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(size.min(n));
    indices.sort_unstable();
    indices
}

fn normalize(importances: &mut [f64]) {
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for imp in importances.iter_mut() {
            *imp /= total;
        }
    }
}

fn check_shapes(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::InsufficientRows { required: 1, actual: 0 });
    }
    Ok(())
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    stages: Vec<Stage>,
    initial_prediction: f64,
    feature_importances: Vec<f64>,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
            initial_prediction: 0.0,
            feature_importances: Vec::new(),
        }
    }

    /// Fit on squared-error residuals, checking `cancel` before every round
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, cancel: &CancellationToken) -> Result<()> {
        check_shapes(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.feature_importances = vec![0.0; n_features];
        self.stages.clear();

        for _ in 0..self.config.n_estimators {
            cancel.check()?;

            let residuals = y - &predictions;
            let rows = sample_sorted(n_samples, self.config.subsample, &mut rng);
            let cols = sample_sorted(n_features, self.config.colsample_bytree, &mut rng);
            let stage = Stage::fit(&self.config, x, &residuals, &rows, cols, rng.gen())?;

            predictions.scaled_add(self.config.learning_rate, &stage.predict(x)?);
            stage.add_importances(&mut self.feature_importances);
            self.stages.push(stage);
        }

        normalize(&mut self.feature_importances);
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.stages.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for stage in &self.stages {
            predictions.scaled_add(self.config.learning_rate, &stage.predict(x)?);
        }
        Ok(predictions)
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

/// Gradient Boosting Classifier over labels encoded as `0..n_classes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    n_classes: usize,
    /// `rounds[r][k]` is the stage for class `k` in round `r`
    rounds: Vec<Vec<Stage>>,
    initial_scores: Vec<f64>,
    feature_importances: Vec<f64>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig, n_classes: usize) -> Self {
        Self {
            config,
            n_classes: n_classes.max(1),
            rounds: Vec::new(),
            initial_scores: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, cancel: &CancellationToken) -> Result<()> {
        check_shapes(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let k = self.n_classes;

        // log class priors, smoothed so an absent class stays finite
        let mut counts = vec![0usize; k];
        for &label in y.iter() {
            let idx = label as usize;
            if idx >= k {
                return Err(PipelineError::Computation(format!("class index {} outside 0..{}", idx, k)));
            }
            counts[idx] += 1;
        }
        self.initial_scores = counts
            .iter()
            .map(|&c| ((c as f64 + 1e-3) / (n_samples as f64 + 1e-3 * k as f64)).ln())
            .collect();

        let mut scores = Array2::from_shape_fn((n_samples, k), |(_, c)| self.initial_scores[c]);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.feature_importances = vec![0.0; n_features];
        self.rounds.clear();

        for _ in 0..self.config.n_estimators {
            cancel.check()?;

            let probs = softmax_rows(&scores);
            let rows = sample_sorted(n_samples, self.config.subsample, &mut rng);
            let cols = sample_sorted(n_features, self.config.colsample_bytree, &mut rng);

            let mut round = Vec::with_capacity(k);
            for class in 0..k {
                let residuals: Array1<f64> = (0..n_samples)
                    .map(|i| {
                        let target = if y[i] as usize == class { 1.0 } else { 0.0 };
                        target - probs[[i, class]]
                    })
                    .collect();
                let stage = Stage::fit(&self.config, x, &residuals, &rows, cols.clone(), rng.gen())?;
                scores
                    .column_mut(class)
                    .scaled_add(self.config.learning_rate, &stage.predict(x)?);
                stage.add_importances(&mut self.feature_importances);
                round.push(stage);
            }
            self.rounds.push(round);
        }

        normalize(&mut self.feature_importances);
        Ok(())
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.rounds.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        let mut scores = Array2::from_shape_fn((x.nrows(), self.n_classes), |(_, c)| self.initial_scores[c]);
        for round in &self.rounds {
            for (class, stage) in round.iter().enumerate() {
                scores
                    .column_mut(class)
                    .scaled_add(self.config.learning_rate, &stage.predict(x)?);
            }
        }
        Ok(scores)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(softmax_rows(&self.decision_function(x)?))
    }

    /// Class with the highest score; ties go to the lower index
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(scores.rows().into_iter().map(|row| argmax(row.iter().copied()) as f64).collect())
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

/// Index of the largest value; ties go to the lowest index
pub(crate) fn argmax(values: impl Iterator<Item = f64>) -> usize {
    values
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

pub(crate) fn softmax_rows(scores: &Array2<f64>) -> Array2<f64> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x.rows().into_iter().map(|row| row[0] * 2.0 + row[1] * 0.5 + 1.0).collect();
        (x, y)
    }

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| i as f64 * 0.1).collect()).unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[0] + row[1] > 10.0 { 1.0 } else { 0.0 })
            .collect();
        (x, y)
    }

    #[test]
    fn test_gradient_boosting_regressor() {
        let (x, y) = create_regression_data();
        let config = GradientBoostingConfig {
            n_estimators: 20,
            ..Default::default()
        };

        let mut model = GradientBoostingRegressor::new(config);
        model.fit(&x, &y, &CancellationToken::new()).unwrap();

        let predictions = model.predict(&x).unwrap();
        assert_eq!(predictions.len(), 100);

        let mse: f64 = y
            .iter()
            .zip(predictions.iter())
            .map(|(yi, pi)| (yi - pi).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        let y_var = y.var(0.0);
        assert!(mse < y_var, "MSE ({}) should be less than variance ({})", mse, y_var);
    }

    #[test]
    fn test_gradient_boosting_classifier() {
        let (x, y) = create_classification_data();
        let config = GradientBoostingConfig {
            n_estimators: 10,
            ..Default::default()
        };

        let mut model = GradientBoostingClassifier::new(config, 2);
        model.fit(&x, &y, &CancellationToken::new()).unwrap();

        let predictions = model.predict(&x).unwrap();
        let correct = y
            .iter()
            .zip(predictions.iter())
            .filter(|(&yi, &pi)| (yi - pi).abs() < 0.5)
            .count();
        let accuracy = correct as f64 / y.len() as f64;
        assert!(accuracy > 0.7, "Accuracy ({}) should be above 70%", accuracy);

        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_multiclass() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..30).map(|i| (i / 10) as f64).collect();

        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default(), 3);
        model.fit(&x, &y, &CancellationToken::new()).unwrap();
        let predictions = model.predict(&x).unwrap();
        let correct = predictions.iter().zip(y.iter()).filter(|(p, a)| p == a).count();
        assert!(correct >= 27, "only {} of 30 correct", correct);
    }

    #[test]
    fn test_feature_importances_sum_to_one() {
        let (x, y) = create_regression_data();
        let config = GradientBoostingConfig {
            n_estimators: 10,
            ..Default::default()
        };

        let mut model = GradientBoostingRegressor::new(config);
        model.fit(&x, &y, &CancellationToken::new()).unwrap();

        let importances = model.feature_importances();
        assert_eq!(importances.len(), 2);
        let sum: f64 = importances.iter().sum();
        assert!((sum - 1.0).abs() < 0.01, "Sum of importances ({}) should be ~1", sum);
    }

    #[test]
    fn test_cancelled_before_first_round() {
        let (x, y) = create_regression_data();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut model = GradientBoostingRegressor::new(GradientBoostingConfig::default());
        assert!(matches!(model.fit(&x, &y, &cancel), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_argmax_ties() {
        assert_eq!(argmax([0.5, 0.5].into_iter()), 0);
        assert_eq!(argmax([0.1, 0.7, 0.7].into_iter()), 1);
    }
}
