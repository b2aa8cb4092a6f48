//! Neural Network (Multi-Layer Perceptron) implementation
//!
//! A feedforward network trained by mini-batch gradient descent with
//! momentum. Inputs (and regression targets) are standardized internally.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::cancel::CancellationToken;
use super::gradient_boosting::{argmax, softmax_rows};
use super::linear_models::Standardizer;
use crate::error::{PipelineError, Result};

/// Hidden layer activation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Hyperbolic tangent
    Tanh,
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Tanh => z.mapv(f64::tanh),
        }
    }

    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 regularization
    pub alpha: f64,
    pub random_state: u64,
    /// Epochs without validation improvement before stopping
    pub early_stopping_patience: usize,
    /// Fraction of training rows held out for early stopping
    pub validation_split: f64,
    pub momentum: f64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64],
            activation: Activation::ReLU,
            learning_rate: 0.01,
            max_epochs: 200,
            batch_size: 32,
            alpha: 0.0001,
            random_state: 42,
            early_stopping_patience: 10,
            validation_split: 0.1,
            momentum: 0.9,
        }
    }
}

/// Output layer behaviour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Output {
    /// Identity output, squared error loss
    Linear,
    /// Softmax output, cross-entropy loss
    Softmax,
}

/// Weights and biases of a fitted network
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Network {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    activation: Activation,
    output: Output,
}

impl Network {
    /// Xavier/Glorot initialization
    fn init(layer_sizes: &[usize], activation: Activation, output: Output, rng: &mut Xoshiro256PlusPlus) -> Self {
        let mut weights = Vec::with_capacity(layer_sizes.len() - 1);
        let mut biases = Vec::with_capacity(layer_sizes.len() - 1);
        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let scale = (2.0 / (n_in + n_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen::<f64>() * 2.0 * scale - scale));
            biases.push(Array1::zeros(n_out));
        }
        Self {
            weights,
            biases,
            activation,
            output,
        }
    }

    /// Activations of every layer (input first) and pre-activations of every hidden layer
    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut activations = vec![x.clone()];
        let mut z_values = Vec::with_capacity(self.weights.len());
        let last = self.weights.len() - 1;

        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last {
                self.activation.apply(&z)
            } else {
                match self.output {
                    Output::Linear => z.clone(),
                    Output::Softmax => softmax_rows(&z),
                }
            };
            z_values.push(z);
            activations.push(a);
        }
        (activations, z_values)
    }

    fn predict(&self, x: &Array2<f64>) -> Array2<f64> {
        let (mut activations, _) = self.forward(x);
        activations.pop().unwrap_or_else(|| Array2::zeros((x.nrows(), 0)))
    }

    /// Both losses share the output gradient `(output - target) / n`
    fn gradients(&self, x: &Array2<f64>, target: &Array2<f64>) -> Vec<(Array2<f64>, Array1<f64>)> {
        let (activations, z_values) = self.forward(x);
        let n = x.nrows().max(1) as f64;
        let mut delta = (&activations[activations.len() - 1] - target) / n;
        let mut gradients = Vec::with_capacity(self.weights.len());

        for i in (0..self.weights.len()).rev() {
            gradients.push((activations[i].t().dot(&delta), delta.sum_axis(Axis(0))));
            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.activation.derivative(&z_values[i - 1]);
            }
        }
        gradients.reverse();
        gradients
    }

    fn loss(&self, x: &Array2<f64>, target: &Array2<f64>) -> f64 {
        let out = self.predict(x);
        let n = x.nrows().max(1) as f64;
        match self.output {
            Output::Linear => (&out - target).mapv(|v| v * v).sum() / n,
            Output::Softmax => -(&out.mapv(|p| p.max(1e-15).ln()) * target).sum() / n,
        }
    }
}

/// Mini-batch training loop with momentum, weight decay and early stopping.
/// `cancel` is checked before every epoch.
fn train(
    config: &MLPConfig,
    x: &Array2<f64>,
    target: &Array2<f64>,
    output: Output,
    cancel: &CancellationToken,
) -> Result<Network> {
    let n_samples = x.nrows();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.random_state);

    let mut sizes = vec![x.ncols()];
    sizes.extend(config.hidden_layers.iter().copied().filter(|&h| h > 0));
    sizes.push(target.ncols());
    let mut net = Network::init(&sizes, config.activation, output, &mut rng);

    // hold out a random slice of rows for early stopping
    let mut order: Vec<usize> = (0..n_samples).collect();
    order.shuffle(&mut rng);
    let val_size = (n_samples as f64 * config.validation_split) as usize;
    let (val_rows, train_rows) = order.split_at(val_size.min(n_samples.saturating_sub(1)));
    let x_train = x.select(Axis(0), train_rows);
    let t_train = target.select(Axis(0), train_rows);
    let x_val = x.select(Axis(0), val_rows);
    let t_val = target.select(Axis(0), val_rows);

    let mut vel_w: Vec<Array2<f64>> = net.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
    let mut vel_b: Vec<Array1<f64>> = net.biases.iter().map(|b| Array1::zeros(b.len())).collect();
    let mut best: Option<(f64, Network)> = None;
    let mut patience = 0;
    let batch_size = config.batch_size.max(1);
    let decay = 1.0 - config.alpha * config.learning_rate;

    for _epoch in 0..config.max_epochs {
        cancel.check()?;

        let mut indices: Vec<usize> = (0..x_train.nrows()).collect();
        indices.shuffle(&mut rng);

        for batch in indices.chunks(batch_size) {
            let x_batch = x_train.select(Axis(0), batch);
            let t_batch = t_train.select(Axis(0), batch);

            for (i, (grad_w, grad_b)) in net.gradients(&x_batch, &t_batch).into_iter().enumerate() {
                vel_w[i] = &vel_w[i] * config.momentum - &grad_w * config.learning_rate;
                vel_b[i] = &vel_b[i] * config.momentum - &grad_b * config.learning_rate;
                net.weights[i] += &vel_w[i];
                net.biases[i] += &vel_b[i];
                net.weights[i] *= decay;
            }
        }

        if x_val.nrows() > 0 {
            let val_loss = net.loss(&x_val, &t_val);
            if !val_loss.is_finite() {
                break;
            }
            match &best {
                Some((best_loss, _)) if val_loss >= *best_loss => {
                    patience += 1;
                    if patience >= config.early_stopping_patience {
                        break;
                    }
                }
                _ => {
                    best = Some((val_loss, net.clone()));
                    patience = 0;
                }
            }
        }
    }

    Ok(best.map_or(net, |(_, n)| n))
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

/// Multi-Layer Perceptron Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPRegressor {
    config: MLPConfig,
    fitted: Option<(Standardizer, f64, f64, Network)>,
}

impl MLPRegressor {
    pub fn new(config: MLPConfig) -> Self {
        Self { config, fitted: None }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, cancel: &CancellationToken) -> Result<()> {
        check_shapes(x, y)?;
        let scaler = Standardizer::fit(x);
        let y_mean = y.mean().unwrap_or(0.0);
        let y_std = Some(y.std(0.0)).filter(|s| *s > 1e-12).unwrap_or(1.0);
        let target = ((y - y_mean) / y_std).insert_axis(Axis(1));

        let net = train(&self.config, &scaler.transform(x), &target, Output::Linear, cancel)?;
        self.fitted = Some((scaler, y_mean, y_std, net));
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (scaler, y_mean, y_std, net) = self.fitted.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        let out = net.predict(&scaler.transform(x));
        Ok(out.column(0).mapv(|v| v * y_std + y_mean))
    }
}

/// Multi-Layer Perceptron Classifier over labels encoded as `0..n_classes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    config: MLPConfig,
    n_classes: usize,
    fitted: Option<(Standardizer, Network)>,
}

impl MLPClassifier {
    pub fn new(config: MLPConfig, n_classes: usize) -> Self {
        Self {
            config,
            n_classes: n_classes.max(1),
            fitted: None,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, cancel: &CancellationToken) -> Result<()> {
        check_shapes(x, y)?;
        let k = self.n_classes;
        let onehot = Array2::from_shape_fn((y.len(), k), |(i, c)| if y[i] as usize == c { 1.0 } else { 0.0 });
        let scaler = Standardizer::fit(x);

        let net = train(&self.config, &scaler.transform(x), &onehot, Output::Softmax, cancel)?;
        self.fitted = Some((scaler, net));
        Ok(())
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (scaler, net) = self.fitted.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok(net.predict(&scaler.transform(x)))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row.iter().copied()) as f64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((100, 2), |(i, j)| (i as f64 * 0.1) + j as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] * 2.0 + r[1] * 0.5).collect();
        (x, y)
    }

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((100, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 7) as f64 });
        let y: Array1<f64> = (0..100).map(|i| if i >= 50 { 1.0 } else { 0.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_mlp_regressor() {
        let (x, y) = create_regression_data();
        let mut model = MLPRegressor::new(MLPConfig::default());
        model.fit(&x, &y, &CancellationToken::new()).unwrap();

        let predictions = model.predict(&x).unwrap();
        let mse = (&predictions - &y).mapv(|v| v * v).mean().unwrap();
        assert!(mse < y.var(0.0), "MSE ({}) should be below the target variance", mse);
    }

    #[test]
    fn test_mlp_classifier() {
        let (x, y) = create_classification_data();
        let mut model = MLPClassifier::new(MLPConfig::default(), 2);
        model.fit(&x, &y, &CancellationToken::new()).unwrap();

        let predictions = model.predict(&x).unwrap();
        let correct = predictions.iter().zip(y.iter()).filter(|(p, a)| p == a).count();
        assert!(correct >= 85, "only {} of 100 correct", correct);

        let proba = model.predict_proba(&x).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tanh_is_deterministic() {
        let (x, y) = create_regression_data();
        let config = MLPConfig {
            activation: Activation::Tanh,
            max_epochs: 20,
            ..Default::default()
        };
        let fit = || {
            let mut model = MLPRegressor::new(config.clone());
            model.fit(&x, &y, &CancellationToken::new()).unwrap();
            model.predict(&x).unwrap()
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_cancelled() {
        let (x, y) = create_classification_data();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut model = MLPClassifier::new(MLPConfig::default(), 2);
        assert!(matches!(model.fit(&x, &y, &cancel), Err(PipelineError::Cancelled)));
    }
}
