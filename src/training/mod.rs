//! Model selection and training
//!
//! Provides:
//! - Task detection and the model catalog
//! - Deterministic (stratified) train/test splitting
//! - Random forests and gradient boosting over CART trees
//! - Linear and logistic regression
//! - K-Nearest Neighbors
//! - Neural networks (MLP)
//! - Evaluation metrics and feature importances
//! - Cross-validated grid search over tree ensembles
//! - Scoring new datasets with a fitted model

mod cancel;
mod config;
mod engine;
mod features;
mod metrics;
mod models;
mod selector;
mod split;
mod tuning;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod neural_network;
pub mod random_forest;

pub use cancel::CancellationToken;
pub use config::TrainingConfig;
pub use engine::{
    FeatureImportance, FittedModel, ModelCache, ModelKey, Prediction, ResultRecord, TrainEngine, TrainedModel,
    DEFAULT_CACHE_CAPACITY, PREDICTION_COLUMN,
};
pub use features::{class_labels, prepare, FeatureSchema, FeatureSource, PreparedData};
pub use metrics::{
    accuracy_score, mean_squared_error, r2_score, ClassScores, ClassificationReport, EvaluationScores, ModelResult,
    ResultMeta, Scores,
};
pub use models::{ModelKind, TaskKind};
pub use selector::{infer_task, select, Selection};
pub use split::{k_fold, shuffle_split, stratified_k_fold, stratified_split, test_size, SplitIndices};
pub use tuning::{cv_folds, CandidateScore, ParamGrid, Params, TuneResult};

pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, KNNRegressor, WeightScheme};
pub use linear_models::{LinearRegression, LogisticRegression};
pub use neural_network::{Activation, MLPClassifier, MLPConfig, MLPRegressor};
pub use random_forest::{MaxFeatures, RandomForest};
