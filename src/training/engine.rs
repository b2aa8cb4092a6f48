//! Training engine implementation

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::cancel::CancellationToken;
use super::config::TrainingConfig;
use super::features::{prepare, FeatureSchema, PreparedData};
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNConfig, KNNRegressor};
use super::linear_models::{LinearRegression, LogisticRegression};
use super::metrics::{mean_squared_error, r2_score, ClassificationReport, EvaluationScores, ModelResult, ResultMeta, Scores};
use super::models::{ModelKind, TaskKind};
use super::neural_network::{MLPClassifier, MLPConfig, MLPRegressor};
use super::random_forest::RandomForest;
use super::selector::{select, Selection};
use super::split::{shuffle_split, stratified_split, SplitIndices};
use super::tuning::{grid_search, ParamGrid, TuneResult};
use crate::cache::{CacheStats, LruCache};
use crate::dataset::{Column, Dataset, Value};
use crate::error::{PipelineError, Result};
use crate::preprocessing::unique_name;
use crate::profiler::{infer_kind, parse_cell};

/// Default number of fitted models kept for importance lookups
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Name of the column holding predictions on a scored dataset
pub const PREDICTION_COLUMN: &str = "Prediction";

/// Enum to hold trained model variants
#[derive(Debug, Clone)]
pub enum TrainedModel {
    RandomForest(RandomForest),
    GradientBoostingClassifier(GradientBoostingClassifier),
    GradientBoostingRegressor(GradientBoostingRegressor),
    LogisticRegression(LogisticRegression),
    LinearRegression(LinearRegression),
    KNNClassifier(KNNClassifier),
    KNNRegressor(KNNRegressor),
    MLPClassifier(MLPClassifier),
    MLPRegressor(MLPRegressor),
}

impl TrainedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            TrainedModel::RandomForest(m) => m.predict(x),
            TrainedModel::GradientBoostingClassifier(m) => m.predict(x),
            TrainedModel::GradientBoostingRegressor(m) => m.predict(x),
            TrainedModel::LogisticRegression(m) => m.predict(x),
            TrainedModel::LinearRegression(m) => m.predict(x),
            TrainedModel::KNNClassifier(m) => m.predict(x),
            TrainedModel::KNNRegressor(m) => m.predict(x),
            TrainedModel::MLPClassifier(m) => m.predict(x),
            TrainedModel::MLPRegressor(m) => m.predict(x),
        }
    }

    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        match self {
            TrainedModel::RandomForest(m) => m.feature_importances().map(|imp| imp.to_vec()),
            TrainedModel::GradientBoostingClassifier(m) => Some(m.feature_importances().to_vec()),
            TrainedModel::GradientBoostingRegressor(m) => Some(m.feature_importances().to_vec()),
            _ => None,
        }
    }
}

/// A fitted model together with what is needed to interpret it
#[derive(Debug, Clone)]
pub struct FittedModel {
    /// Catalog entry the model was fitted as
    pub kind: ModelKind,
    /// The fitted estimator
    pub model: TrainedModel,
    /// Feature layout of the training data
    pub schema: FeatureSchema,
    /// Sorted class labels; `None` for regression
    pub classes: Option<Vec<String>>,
}

impl FittedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.predict(x)
    }

    /// Importance per feature, highest first. Equal importances keep feature order.
    pub fn feature_importances(&self) -> Result<Vec<FeatureImportance>> {
        let values = self
            .model
            .feature_importances()
            .ok_or_else(|| PipelineError::NotSupported(format!("{} has no feature importances", self.kind)))?;

        let mut ranked: Vec<FeatureImportance> = self
            .schema
            .feature_names()
            .iter()
            .zip(values)
            .map(|(feature, importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Ok(ranked)
    }
}

/// One entry of an importance ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    /// Feature name, `<column>_<category>` for one-hot features
    pub feature: String,
    /// Normalized importance; the ranking sums to 1
    pub importance: f64,
}

/// Cache key: one fitted model per dataset version, target and model kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    /// Dataset handle the model was fitted on
    pub handle: String,
    /// Target column
    pub target: String,
    /// Model kind
    pub model: ModelKind,
}

impl ModelKey {
    pub fn new(handle: &str, target: &str, model: ModelKind) -> Self {
        Self {
            handle: handle.to_string(),
            target: target.to_string(),
            model,
        }
    }
}

pub type ModelCache = LruCache<ModelKey, Arc<FittedModel>>;

/// A logged training result
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    /// Handle of the training dataset
    pub dataset: String,
    /// When training finished
    pub trained_at: DateTime<Utc>,
    /// Wall-clock fit and evaluation time
    pub training_time_secs: f64,
    #[serde(flatten)]
    pub result: ModelResult,
}

/// A dataset scored by a fitted model
#[derive(Debug, Clone)]
pub struct Prediction {
    /// The scored rows with the prediction column appended
    pub dataset: Dataset,
    /// Name of the appended column, normally [`PREDICTION_COLUMN`]
    pub column: String,
    /// Present when the scored rows carry the target column
    pub scores: Option<EvaluationScores>,
}

/// Main training engine.
///
/// Shared between requests: the model cache and the result log use interior
/// locking, everything else is read-only.
pub struct TrainEngine {
    config: TrainingConfig,
    cache: ModelCache,
    results: RwLock<Vec<ResultRecord>>,
}

impl TrainEngine {
    pub fn new(config: TrainingConfig) -> Self {
        Self::with_cache_capacity(config, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(config: TrainingConfig, capacity: usize) -> Self {
        Self {
            config,
            cache: ModelCache::new(capacity),
            results: RwLock::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Task kind and applicable models for `target`
    pub fn select(&self, dataset: &Dataset, target: &str) -> Result<Selection> {
        select(dataset, target, &self.config)
    }

    /// Split, fit and evaluate `model` on `dataset`. The fitted model is
    /// cached under `(handle, target, model)` and the result is logged.
    pub fn train(
        &self,
        handle: &str,
        dataset: &Dataset,
        target: &str,
        model: ModelKind,
        cancel: &CancellationToken,
    ) -> Result<ModelResult> {
        let start = Instant::now();
        let (data, split, fitted) = self.fit(dataset, target, model, cancel)?;

        let (_, x_test, _, y_test) = split.apply(&data.x, &data.y);
        let y_pred = fitted.predict(&x_test)?;

        let scores = match data.task {
            TaskKind::Classification => {
                let to_labels = |a: &Array1<f64>| a.iter().map(|&v| v as usize).collect::<Vec<_>>();
                let report = ClassificationReport::compute(
                    &to_labels(&y_test),
                    &to_labels(&y_pred),
                    data.classes.as_deref().unwrap_or_default(),
                );
                Scores::Classification {
                    accuracy: report.accuracy,
                    classification_report: report,
                }
            }
            TaskKind::Regression => Scores::Regression {
                mse: mean_squared_error(&y_test, &y_pred),
                r2_score: r2_score(&y_test, &y_pred),
            },
        };

        let result = ModelResult {
            model,
            scores,
            meta: ResultMeta {
                task: data.task,
                target: target.to_string(),
                train_size: split.train.len(),
                test_size: split.test.len(),
                n_features: data.feature_names().len(),
                classes: data.classes.clone(),
                target_range: data.target_range,
            },
        };

        self.cache.insert(ModelKey::new(handle, target, model), Arc::new(fitted));

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            handle = %handle,
            target = %target,
            model = %model,
            train_size = result.meta.train_size,
            test_size = result.meta.test_size,
            elapsed_secs = elapsed,
            "Training complete"
        );

        self.results.write().push(ResultRecord {
            dataset: handle.to_string(),
            trained_at: Utc::now(),
            training_time_secs: elapsed,
            result: result.clone(),
        });

        Ok(result)
    }

    /// Feature importances of `model` for `target`. Uses the model fitted by
    /// an earlier `train` call when cached, otherwise fits one and caches it.
    pub fn explain(
        &self,
        handle: &str,
        dataset: &Dataset,
        target: &str,
        model: ModelKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<FeatureImportance>> {
        if !model.supports_importance() {
            return Err(PipelineError::NotSupported(format!(
                "feature importance is not available for {}",
                model
            )));
        }

        let key = ModelKey::new(handle, target, model);
        self.fitted_model(&key, dataset, cancel)?.feature_importances()
    }

    /// Grid search over `grid` for `model`, scored by cross-validation on
    /// every usable row of `dataset`.
    pub fn tune(
        &self,
        dataset: &Dataset,
        target: &str,
        model: ModelKind,
        grid: &ParamGrid,
        cancel: &CancellationToken,
    ) -> Result<TuneResult> {
        let start = Instant::now();
        let data = self.prepare_for(dataset, target, model)?;
        let result = grid_search(&self.config, model, &data, grid, cancel)?;

        info!(
            target = %target,
            model = %model,
            candidates = result.candidates.len(),
            best_score = result.best_score,
            best_params = ?result.best_params,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Grid search complete"
        );
        Ok(result)
    }

    /// Score `other` with the model cached under `key`, fitting it on
    /// `training` first when it is not cached.
    ///
    /// `other` must carry every feature column of the training data;
    /// its target column, when present, is used to evaluate the predictions.
    pub fn predict(
        &self,
        key: &ModelKey,
        training: &Dataset,
        other: &Dataset,
        cancel: &CancellationToken,
    ) -> Result<Prediction> {
        let fitted = self.fitted_model(key, training, cancel)?;
        fitted.schema.check(other)?;
        if other.n_rows() == 0 {
            return Err(PipelineError::InsufficientRows { required: 1, actual: 0 });
        }

        let x = fitted.schema.transform(other)?;
        let y_pred = fitted.predict(&x)?;

        let values: Vec<Value> = match &fitted.classes {
            Some(classes) => {
                let labels: Vec<Option<&str>> = y_pred
                    .iter()
                    .map(|&c| classes.get(c as usize).map(String::as_str))
                    .collect();
                let kind = infer_kind(labels.iter().copied());
                labels.into_iter().map(|label| parse_cell(kind, label)).collect()
            }
            None => y_pred.iter().map(|&v| Value::Float(v)).collect(),
        };
        let column = unique_name(PREDICTION_COLUMN, |n| other.column(n).is_some());
        let mut columns = other.columns().to_vec();
        columns.push(Column::new(column.clone(), values));
        let dataset = Dataset::new(columns)?;

        let scores = other
            .column(&key.target)
            .and_then(|truth| evaluate(&fitted, truth, &y_pred));

        info!(
            handle = %key.handle,
            model = %key.model,
            rows = other.n_rows(),
            evaluated = scores.is_some(),
            "Scored dataset"
        );
        Ok(Prediction { dataset, column, scores })
    }

    /// Every logged result, oldest first
    pub fn results(&self) -> Vec<ResultRecord> {
        self.results.read().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cached model for `key`, or a freshly fitted one that is then cached
    fn fitted_model(&self, key: &ModelKey, dataset: &Dataset, cancel: &CancellationToken) -> Result<Arc<FittedModel>> {
        if let Some(fitted) = self.cache.get(key) {
            debug!(handle = %key.handle, model = %key.model, "Using cached model");
            return Ok(fitted);
        }
        debug!(handle = %key.handle, model = %key.model, "No cached model, fitting");
        let (_, _, fitted) = self.fit(dataset, &key.target, key.model, cancel)?;
        let fitted = Arc::new(fitted);
        self.cache.insert(key.clone(), Arc::clone(&fitted));
        Ok(fitted)
    }

    /// Task check and feature extraction shared by fitting and tuning
    fn prepare_for(&self, dataset: &Dataset, target: &str, model: ModelKind) -> Result<PreparedData> {
        let selection = select(dataset, target, &self.config)?;
        if model.task() != selection.task {
            return Err(PipelineError::IncompatibleTask {
                model: model.to_string(),
                task: selection.task.to_string(),
            });
        }
        prepare(dataset, target, selection.task)
    }

    fn fit(
        &self,
        dataset: &Dataset,
        target: &str,
        model: ModelKind,
        cancel: &CancellationToken,
    ) -> Result<(PreparedData, SplitIndices, FittedModel)> {
        let data = self.prepare_for(dataset, target, model)?;
        let split = match data.task {
            TaskKind::Classification => {
                stratified_split(&data.labels(), self.config.test_fraction, self.config.random_state)?
            }
            TaskKind::Regression => shuffle_split(data.n_rows(), self.config.test_fraction, self.config.random_state)?,
        };
        debug!(
            model = %model,
            features = data.feature_names().len(),
            train = split.train.len(),
            test = split.test.len(),
            "Prepared training data"
        );

        let (x_train, _, y_train, _) = split.apply(&data.x, &data.y);
        let n_classes = data.classes.as_ref().map_or(0, Vec::len);
        let trained = fit_model(&self.config, model, n_classes, &x_train, &y_train, cancel)?;

        let fitted = FittedModel {
            kind: model,
            model: trained,
            schema: data.schema.clone(),
            classes: data.classes.clone(),
        };
        Ok((data, split, fitted))
    }
}

impl Default for TrainEngine {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

/// Compare predictions against the rows of `truth` that hold a target value.
/// Labels never seen in training count as misses.
fn evaluate(fitted: &FittedModel, truth: &Column, y_pred: &Array1<f64>) -> Option<EvaluationScores> {
    let rows: Vec<usize> = (0..truth.len()).filter(|&i| !truth.values()[i].is_missing()).collect();
    if rows.is_empty() {
        return None;
    }

    match &fitted.classes {
        Some(classes) => {
            let mut labels = classes.clone();
            let mut y_true = Vec::with_capacity(rows.len());
            for &i in &rows {
                let label = truth.values()[i].render();
                let index = match labels.iter().position(|l| *l == label) {
                    Some(index) => index,
                    None => {
                        labels.push(label);
                        labels.len() - 1
                    }
                };
                y_true.push(index);
            }
            let predicted: Vec<usize> = rows.iter().map(|&i| y_pred[i] as usize).collect();
            Some(EvaluationScores::classification(&y_true, &predicted, &labels))
        }
        None => {
            let pairs: Vec<(f64, f64)> = rows
                .iter()
                .filter_map(|&i| truth.values()[i].as_f64().map(|t| (t, y_pred[i])))
                .collect();
            if pairs.is_empty() {
                return None;
            }
            let y_true: Array1<f64> = pairs.iter().map(|p| p.0).collect();
            let predicted: Array1<f64> = pairs.iter().map(|p| p.1).collect();
            Some(EvaluationScores::regression(&y_true, &predicted))
        }
    }
}

/// Fit `model` on `x`/`y` with the settings of `config`
pub(crate) fn fit_model(
    config: &TrainingConfig,
    model: ModelKind,
    n_classes: usize,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cancel: &CancellationToken,
) -> Result<TrainedModel> {
    cancel.check()?;

    let trained = match model {
        ModelKind::RandomForestClassifier | ModelKind::RandomForestRegressor => {
            let mut forest = if model == ModelKind::RandomForestClassifier {
                RandomForest::new_classifier(config.n_estimators, n_classes)
            } else {
                RandomForest::new_regressor(config.n_estimators)
            }
            .with_random_state(config.random_state);
            if let Some(depth) = config.max_depth {
                forest = forest.with_max_depth(depth);
            }
            forest.fit(x, y, cancel)?;
            TrainedModel::RandomForest(forest)
        }
        ModelKind::GradientBoostingClassifier => {
            let mut gb = GradientBoostingClassifier::new(boosting_config(config), n_classes);
            gb.fit(x, y, cancel)?;
            TrainedModel::GradientBoostingClassifier(gb)
        }
        ModelKind::GradientBoostingRegressor => {
            let mut gb = GradientBoostingRegressor::new(boosting_config(config));
            gb.fit(x, y, cancel)?;
            TrainedModel::GradientBoostingRegressor(gb)
        }
        ModelKind::LogisticRegression => {
            let mut lr = LogisticRegression::new(n_classes);
            lr.fit(x, y, cancel)?;
            TrainedModel::LogisticRegression(lr)
        }
        ModelKind::LinearRegression => {
            let mut lr = LinearRegression::new();
            lr.fit(x, y)?;
            TrainedModel::LinearRegression(lr)
        }
        ModelKind::KNeighborsClassifier => {
            let mut knn = KNNClassifier::new(knn_config(config), n_classes);
            knn.fit(x, y)?;
            TrainedModel::KNNClassifier(knn)
        }
        ModelKind::KNeighborsRegressor => {
            let mut knn = KNNRegressor::new(knn_config(config));
            knn.fit(x, y)?;
            TrainedModel::KNNRegressor(knn)
        }
        ModelKind::MLPClassifier => {
            let mut mlp = MLPClassifier::new(mlp_config(config), n_classes);
            mlp.fit(x, y, cancel)?;
            TrainedModel::MLPClassifier(mlp)
        }
        ModelKind::MLPRegressor => {
            let mut mlp = MLPRegressor::new(mlp_config(config));
            mlp.fit(x, y, cancel)?;
            TrainedModel::MLPRegressor(mlp)
        }
    };
    Ok(trained)
}

fn boosting_config(config: &TrainingConfig) -> GradientBoostingConfig {
    GradientBoostingConfig {
        n_estimators: config.boosting_rounds,
        learning_rate: config.learning_rate,
        max_depth: config.boosting_max_depth,
        random_state: config.random_state,
        ..Default::default()
    }
}

fn knn_config(config: &TrainingConfig) -> KNNConfig {
    KNNConfig {
        n_neighbors: config.n_neighbors,
        ..Default::default()
    }
}

fn mlp_config(config: &TrainingConfig) -> MLPConfig {
    MLPConfig {
        hidden_layers: vec![config.hidden_units],
        max_epochs: config.max_epochs,
        random_state: config.random_state,
        ..Default::default()
    }
}
