//! Training configuration

use serde::{Deserialize, Serialize};

/// Configuration shared by model selection and training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Random seed for the split and every seeded model
    pub random_state: u64,

    /// Fraction of usable rows held out for evaluation
    pub test_fraction: f64,

    /// Numeric targets with at most this many distinct values (and no more
    /// than half the rows) are treated as class labels
    pub max_classes: usize,

    /// Fewest usable rows a dataset must have to be split
    pub min_rows: usize,

    // Tree ensembles
    /// Number of trees in a random forest
    pub n_estimators: usize,

    /// Number of boosting rounds
    pub boosting_rounds: usize,

    /// Learning rate (for boosting)
    pub learning_rate: f64,

    /// Maximum depth of boosted trees
    pub boosting_max_depth: usize,

    /// Maximum depth of forest trees (unbounded when `None`)
    pub max_depth: Option<usize>,

    // Other families
    /// Neighbours consulted by KNN
    pub n_neighbors: usize,

    /// Units in the MLP hidden layer
    pub hidden_units: usize,

    /// MLP training epochs
    pub max_epochs: usize,

    /// Folds used when tuning hyperparameters by cross-validation
    pub cv_folds: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            random_state: 42,
            test_fraction: 0.2,
            max_classes: 10,
            min_rows: 5,
            n_estimators: 100,
            boosting_rounds: 100,
            learning_rate: 0.1,
            boosting_max_depth: 3,
            max_depth: None,
            n_neighbors: 5,
            hidden_units: 64,
            max_epochs: 200,
            cv_folds: 3,
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_boosting_rounds(mut self, n: usize) -> Self {
        self.boosting_rounds = n.max(1);
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth.map(|d| d.max(1));
        self
    }

    pub fn with_boosting_max_depth(mut self, depth: usize) -> Self {
        self.boosting_max_depth = depth.max(1);
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs.max(1);
        self
    }

    pub fn with_n_neighbors(mut self, k: usize) -> Self {
        self.n_neighbors = k.max(1);
        self
    }
}
