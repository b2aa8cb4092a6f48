//! K-Nearest Neighbors implementation
//!
//! KNN classifier and regressor with distance metrics.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::gradient_boosting::argmax;
use crate::error::{PipelineError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors, capped at the training set size
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
    }
}

/// (distance, training row) of the `k` nearest rows, nearest first.
/// Equal distances are ordered by training row.
fn find_k_nearest(query: ArrayView1<f64>, x_train: &Array2<f64>, k: usize, metric: DistanceMetric) -> Vec<(f64, usize)> {
    let mut distances: Vec<(f64, usize)> = x_train
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| (compute_distance(query, row, metric), i))
        .collect();
    distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    distances.truncate(k);
    distances
}

fn neighbor_weight(distance: f64, weights: WeightScheme) -> f64 {
    match weights {
        WeightScheme::Uniform => 1.0,
        WeightScheme::Distance => 1.0 / (distance + 1e-10),
    }
}

/// Stored training set shared by both estimators
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainingSet {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl TrainingSet {
    fn new(x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::InsufficientRows { required: 1, actual: 0 });
        }
        Ok(Self {
            x: x.clone(),
            y: y.clone(),
        })
    }

    fn check_query(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.x.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} features", self.x.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }
}

/// K-Nearest Neighbors Classifier over labels encoded as `0..n_classes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    n_classes: usize,
    train: Option<TrainingSet>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig, n_classes: usize) -> Self {
        Self {
            config,
            n_classes: n_classes.max(1),
            train: None,
        }
    }

    /// Stores the training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.train = Some(TrainingSet::new(x, y)?);
        Ok(())
    }

    /// Weighted vote among the nearest rows; ties go to the lower class index
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row.iter().copied()) as f64).collect())
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let train = self.train.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        train.check_query(x)?;
        let k = self.config.n_neighbors.clamp(1, train.x.nrows());
        let n_classes = self.n_classes;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let mut votes = vec![0.0; n_classes];
                for (dist, j) in find_k_nearest(x.row(i), &train.x, k, self.config.metric) {
                    let class = (train.y[j] as usize).min(n_classes - 1);
                    votes[class] += neighbor_weight(dist, self.config.weights);
                }
                let total: f64 = votes.iter().sum();
                votes.iter().map(|v| v / total).collect()
            })
            .collect();

        Array2::from_shape_vec((x.nrows(), n_classes), rows.into_iter().flatten().collect())
            .map_err(|e| PipelineError::Computation(e.to_string()))
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    train: Option<TrainingSet>,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self { config, train: None }
    }

    /// Stores the training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.train = Some(TrainingSet::new(x, y)?);
        Ok(())
    }

    /// Weighted mean target of the nearest rows
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let train = self.train.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        train.check_query(x)?;
        let k = self.config.n_neighbors.clamp(1, train.x.nrows());

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let (sum, weight) = find_k_nearest(x.row(i), &train.x, k, self.config.metric)
                    .into_iter()
                    .fold((0.0, 0.0), |(s, w), (dist, j)| {
                        let wt = neighbor_weight(dist, self.config.weights);
                        (s + wt * train.y[j], w + wt)
                    });
                sum / weight
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_knn_classifier() {
        let x = array![[0.0, 0.0], [0.1, 0.1], [0.2, 0.0], [1.0, 1.0], [1.1, 1.0], [0.9, 1.1]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut knn = KNNClassifier::new(KNNConfig { n_neighbors: 3, ..Default::default() }, 2);
        knn.fit(&x, &y).unwrap();

        let test = array![[0.05, 0.05], [1.05, 1.05]];
        assert_eq!(knn.predict(&test).unwrap(), array![0.0, 1.0]);
    }

    #[test]
    fn test_k_capped_at_training_size() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 10.0];

        let mut knn = KNNRegressor::new(KNNConfig::default());
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.0]]).unwrap(), array![5.0]);
    }

    #[test]
    fn test_knn_regressor_distance_weighted() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];

        let config = KNNConfig {
            n_neighbors: 2,
            metric: DistanceMetric::Manhattan,
            weights: WeightScheme::Distance,
        };
        let mut knn = KNNRegressor::new(config);
        knn.fit(&x, &y).unwrap();

        let pred = knn.predict(&array![[1.0]]).unwrap();
        assert!((pred[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vote_tie_goes_to_lower_class() {
        let x = array![[0.0], [2.0]];
        let y = array![1.0, 0.0];
        let mut knn = KNNClassifier::new(KNNConfig { n_neighbors: 2, ..Default::default() }, 2);
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[1.0]]).unwrap(), array![0.0]);
    }

    #[test]
    fn test_predict_before_fit() {
        let knn = KNNRegressor::new(KNNConfig::default());
        assert!(matches!(knn.predict(&array![[1.0]]), Err(PipelineError::ModelNotFitted)));
    }
}
