//! Exhaustive hyperparameter search scored by cross-validation

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cancel::CancellationToken;
use super::config::TrainingConfig;
use super::engine::fit_model;
use super::features::PreparedData;
use super::metrics::{accuracy_score, r2_score};
use super::models::{ModelKind, TaskKind};
use super::split::{k_fold, stratified_k_fold, SplitIndices};
use crate::error::{PipelineError, Result};

/// Values tried for each tunable parameter of a tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    /// Trees in a forest, or rounds for gradient boosting
    pub n_estimators: Vec<usize>,
    /// Depth limits. `None` means unbounded trees for a forest and the
    /// configured depth for gradient boosting.
    pub max_depth: Vec<Option<usize>>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100],
            max_depth: vec![None, Some(10), Some(20)],
        }
    }
}

impl ParamGrid {
    /// Every combination, depth-major
    pub fn candidates(&self) -> Vec<Params> {
        self.max_depth
            .iter()
            .flat_map(|&max_depth| {
                self.n_estimators.iter().map(move |&n_estimators| Params {
                    n_estimators,
                    max_depth,
                })
            })
            .collect()
    }
}

/// One point of a [`ParamGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Trees, or boosting rounds
    pub n_estimators: usize,
    /// Tree depth limit
    pub max_depth: Option<usize>,
}

impl Params {
    /// `base` with these parameters applied to `model`
    pub fn apply(&self, base: &TrainingConfig, model: ModelKind) -> TrainingConfig {
        let config = base.clone();
        match model {
            ModelKind::GradientBoostingClassifier | ModelKind::GradientBoostingRegressor => {
                let config = config.with_boosting_rounds(self.n_estimators);
                match self.max_depth {
                    Some(depth) => config.with_boosting_max_depth(depth),
                    None => config,
                }
            }
            _ => config.with_n_estimators(self.n_estimators).with_max_depth(self.max_depth),
        }
    }
}

/// Cross-validated score of one candidate
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub params: Params,
    /// Mean of `fold_scores`
    pub mean_score: f64,
    /// Population standard deviation of `fold_scores`
    pub std_score: f64,
    /// Validation score on each fold, in fold order
    pub fold_scores: Vec<f64>,
}

/// Outcome of a grid search
#[derive(Debug, Clone, Serialize)]
pub struct TuneResult {
    pub model: ModelKind,
    pub task: TaskKind,
    /// `accuracy` for classification, `r2` for regression
    pub metric: &'static str,
    /// Folds each candidate was scored on
    pub cv_folds: usize,
    /// First candidate with the highest mean score
    pub best_params: Params,
    /// Mean score of `best_params`
    pub best_score: f64,
    /// Every candidate in grid order
    pub candidates: Vec<CandidateScore>,
}

/// Folds over the prepared rows, stratified for classification
pub fn cv_folds(data: &PreparedData, n_splits: usize, seed: u64) -> Result<Vec<SplitIndices>> {
    match data.task {
        TaskKind::Classification => stratified_k_fold(&data.labels(), n_splits, seed),
        TaskKind::Regression => k_fold(data.n_rows(), n_splits, seed),
    }
}

/// Score every grid candidate on every fold and keep the best mean.
/// Equal means keep the earlier candidate.
pub(crate) fn grid_search(
    base: &TrainingConfig,
    model: ModelKind,
    data: &PreparedData,
    grid: &ParamGrid,
    cancel: &CancellationToken,
) -> Result<TuneResult> {
    if !model.supports_importance() {
        return Err(PipelineError::NotSupported(format!(
            "hyperparameter tuning is available for tree ensembles, not {}",
            model
        )));
    }
    let candidates = grid.candidates();
    if candidates.is_empty() {
        return Err(PipelineError::NotSupported("parameter grid is empty".to_string()));
    }

    let folds = cv_folds(data, base.cv_folds, base.random_state)?;
    let n_classes = data.classes.as_ref().map_or(0, Vec::len);

    let mut scored = Vec::with_capacity(candidates.len());
    for params in candidates {
        let config = params.apply(base, model);
        let mut fold_scores = Vec::with_capacity(folds.len());
        for fold in &folds {
            cancel.check()?;
            let (x_train, x_test, y_train, y_test) = fold.apply(&data.x, &data.y);
            let fitted = fit_model(&config, model, n_classes, &x_train, &y_train, cancel)?;
            let y_pred = fitted.predict(&x_test)?;
            let score = match data.task {
                TaskKind::Classification => {
                    let as_labels = |v: &ndarray::Array1<f64>| v.iter().map(|&c| c as usize).collect::<Vec<_>>();
                    accuracy_score(&as_labels(&y_test), &as_labels(&y_pred))
                }
                TaskKind::Regression => r2_score(&y_test, &y_pred),
            };
            fold_scores.push(score);
        }

        let n = fold_scores.len() as f64;
        let mean_score = fold_scores.iter().sum::<f64>() / n;
        let std_score = (fold_scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n).sqrt();
        debug!(model = %model, ?params, mean_score, "Scored grid candidate");
        scored.push(CandidateScore {
            params,
            mean_score,
            std_score,
            fold_scores,
        });
    }

    let best = scored
        .iter()
        .fold(&scored[0], |best, c| if c.mean_score > best.mean_score { c } else { best });

    Ok(TuneResult {
        model,
        task: data.task,
        metric: match data.task {
            TaskKind::Classification => "accuracy",
            TaskKind::Regression => "r2",
        },
        cv_folds: folds.len(),
        best_params: best.params,
        best_score: best.mean_score,
        candidates: scored,
    })
}
