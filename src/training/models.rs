//! Model catalog

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of learning task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Classification,
    Regression,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Classification => "classification",
            TaskKind::Regression => "regression",
        })
    }
}

/// Every model the engine can train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    RandomForestClassifier,
    GradientBoostingClassifier,
    LogisticRegression,
    KNeighborsClassifier,
    MLPClassifier,
    RandomForestRegressor,
    GradientBoostingRegressor,
    LinearRegression,
    KNeighborsRegressor,
    MLPRegressor,
}

const CLASSIFIERS: [ModelKind; 5] = [
    ModelKind::RandomForestClassifier,
    ModelKind::GradientBoostingClassifier,
    ModelKind::LogisticRegression,
    ModelKind::KNeighborsClassifier,
    ModelKind::MLPClassifier,
];

const REGRESSORS: [ModelKind; 5] = [
    ModelKind::RandomForestRegressor,
    ModelKind::GradientBoostingRegressor,
    ModelKind::LinearRegression,
    ModelKind::KNeighborsRegressor,
    ModelKind::MLPRegressor,
];

impl ModelKind {
    pub const ALL: [ModelKind; 10] = [
        ModelKind::RandomForestClassifier,
        ModelKind::GradientBoostingClassifier,
        ModelKind::LogisticRegression,
        ModelKind::KNeighborsClassifier,
        ModelKind::MLPClassifier,
        ModelKind::RandomForestRegressor,
        ModelKind::GradientBoostingRegressor,
        ModelKind::LinearRegression,
        ModelKind::KNeighborsRegressor,
        ModelKind::MLPRegressor,
    ];

    /// Models applicable to a task, in catalog order
    pub fn catalog(task: TaskKind) -> &'static [ModelKind] {
        match task {
            TaskKind::Classification => &CLASSIFIERS,
            TaskKind::Regression => &REGRESSORS,
        }
    }

    pub fn task(self) -> TaskKind {
        if CLASSIFIERS.contains(&self) {
            TaskKind::Classification
        } else {
            TaskKind::Regression
        }
    }

    /// Tree ensembles expose feature importances
    pub fn supports_importance(self) -> bool {
        matches!(
            self,
            ModelKind::RandomForestClassifier
                | ModelKind::RandomForestRegressor
                | ModelKind::GradientBoostingClassifier
                | ModelKind::GradientBoostingRegressor
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::RandomForestClassifier => "RandomForestClassifier",
            ModelKind::GradientBoostingClassifier => "GradientBoostingClassifier",
            ModelKind::LogisticRegression => "LogisticRegression",
            ModelKind::KNeighborsClassifier => "KNeighborsClassifier",
            ModelKind::MLPClassifier => "MLPClassifier",
            ModelKind::RandomForestRegressor => "RandomForestRegressor",
            ModelKind::GradientBoostingRegressor => "GradientBoostingRegressor",
            ModelKind::LinearRegression => "LinearRegression",
            ModelKind::KNeighborsRegressor => "KNeighborsRegressor",
            ModelKind::MLPRegressor => "MLPRegressor",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exact, case-sensitive catalog names only
impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| PipelineError::UnknownModel(s.to_string()))
    }
}
