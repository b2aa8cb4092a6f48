//! Linear model implementations

use super::cancel::CancellationToken;
use super::gradient_boosting::argmax;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

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

/// Cholesky factorisation of a symmetric matrix, `None` if it is not positive definite
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `A x = b` for symmetric positive semi-definite `A`.
///
/// Collinear designs (one-hot groups, constant columns) make `A` singular, so
/// an increasing ridge is added to the diagonal until the factorisation succeeds.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n == 0 {
        return Some(Array1::zeros(0));
    }
    let scale = (a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64).max(1e-12);

    let l = [0.0, 1e-10, 1e-8, 1e-6, 1e-4, 1e-2].iter().find_map(|&jitter| {
        let mut reg = a.clone();
        for k in 0..n {
            reg[[k, k]] += jitter * scale;
        }
        cholesky(&reg)
    })?;

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Per-feature standardisation fitted on training data.
/// Constant features get unit scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Standardizer {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    pub(crate) fn fit(x: &Array2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        Self { mean, std }
    }

    pub(crate) fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }
}

/// Ordinary least squares linear regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// L2 regularization strength
    pub alpha: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha: 0.0,
        }
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Solve the normal equations `(XᵀX + αI) w = Xᵀy` on centered data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_shapes(x, y)?;
        let n_features = x.ncols();

        let (x_mean, y_mean) = if self.fit_intercept {
            (
                x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features)),
                y.mean().unwrap_or(0.0),
            )
        } else {
            (Array1::zeros(n_features), 0.0)
        };
        let x_centered = x - &x_mean;
        let y_centered = y - y_mean;

        let mut xtx = x_centered.t().dot(&x_centered);
        for i in 0..n_features {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = cholesky_solve(&xtx, &xty)
            .ok_or_else(|| PipelineError::Computation("normal equations are singular".to_string()))?;

        self.intercept = Some(y_mean - coefficients.dot(&x_mean));
        self.coefficients = Some(coefficients);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }
}

/// Binary logistic model on standardized inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryLogit {
    weights: Array1<f64>,
    bias: f64,
}

impl BinaryLogit {
    fn proba(&self, x: &Array2<f64>) -> Array1<f64> {
        sigmoid(&(x.dot(&self.weights) + self.bias))
    }
}

fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Logistic regression, one-vs-rest for more than two classes.
/// Labels are class indices `0..n_classes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// L2 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    /// Gradient norm below which descent stops
    pub tol: f64,
    pub learning_rate: f64,
    n_classes: usize,
    scaler: Option<Standardizer>,
    models: Vec<BinaryLogit>,
}

impl LogisticRegression {
    pub fn new(n_classes: usize) -> Self {
        Self {
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            n_classes: n_classes.max(2),
            scaler: None,
            models: Vec::new(),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Batch gradient descent; `cancel` is checked every iteration
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, cancel: &CancellationToken) -> Result<&mut Self> {
        check_shapes(x, y)?;
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x);

        // a single model separates two classes; otherwise one per class
        let positives: Vec<usize> = if self.n_classes == 2 { vec![1] } else { (0..self.n_classes).collect() };
        let mut models = Vec::with_capacity(positives.len());
        for class in positives {
            let target = y.mapv(|v| if v as usize == class { 1.0 } else { 0.0 });
            models.push(self.fit_binary(&xs, &target, cancel)?);
        }

        self.scaler = Some(scaler);
        self.models = models;
        Ok(self)
    }

    fn fit_binary(&self, x: &Array2<f64>, y: &Array1<f64>, cancel: &CancellationToken) -> Result<BinaryLogit> {
        let n_samples = x.nrows() as f64;
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            cancel.check()?;

            let predictions = sigmoid(&(x.dot(&weights) + bias));
            let errors = &predictions - y;
            let dw = x.t().dot(&errors) / n_samples + self.alpha * &weights;
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights.scaled_add(-self.learning_rate, &dw);
            bias -= self.learning_rate * db;
        }

        Ok(BinaryLogit { weights, bias })
    }

    /// Class probabilities, one column per class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scaler = self.scaler.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        let xs = scaler.transform(x);

        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        if let [model] = self.models.as_slice() {
            let p = model.proba(&xs);
            proba.column_mut(0).assign(&p.mapv(|v| 1.0 - v));
            proba.column_mut(1).assign(&p);
        } else {
            for (class, model) in self.models.iter().enumerate() {
                proba.column_mut(class).assign(&model.proba(&xs));
            }
            for mut row in proba.rows_mut() {
                let sum = row.sum();
                if sum > 0.0 {
                    row.mapv_inplace(|v| v / sum);
                }
            }
        }
        Ok(proba)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(row.iter().copied()) as f64).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_recovers_coefficients() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0], [5.0, 5.0]];
        let y: Array1<f64> = x.rows().into_iter().map(|r| 2.0 * r[0] - r[1] + 3.0).collect();

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-6);
        assert!((coef[1] + 1.0).abs() < 1e-6);
        assert!((model.intercept.unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_linear_regression_collinear_design() {
        // two one-hot indicators that always sum to one
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]];
        let y = array![1.0, 3.0, 1.0, 3.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, a) in pred.iter().zip(y.iter()) {
            assert!((p - a).abs() < 1e-3, "{} vs {}", p, a);
        }
    }

    #[test]
    fn test_logistic_binary() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [7.0], [8.0], [9.0], [10.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new(2);
        model.fit(&x, &y, &CancellationToken::new()).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[[0, 0]] > 0.5);
        assert!((proba.row(3).sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_logistic_one_vs_rest() {
        let x = array![[0.0, 0.0], [0.2, 0.1], [5.0, 0.0], [5.1, 0.2], [0.0, 5.0], [0.1, 5.2]];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];

        let mut model = LogisticRegression::new(3);
        model.fit(&x, &y, &CancellationToken::new()).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_logistic_cancel() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut model = LogisticRegression::new(2);
        assert!(matches!(model.fit(&x, &y, &cancel), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_standardizer_handles_constant_column() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let s = Standardizer::fit(&x);
        let t = s.transform(&x);
        assert_eq!(t, array![[-1.0, 0.0], [1.0, 0.0]]);
    }
}
