//! Model selection: decide the task kind from the target column and return
//! the matching catalog.

use serde::Serialize;
use tracing::debug;

use super::config::TrainingConfig;
use super::models::{ModelKind, TaskKind};
use crate::dataset::{Column, ColumnKind, Dataset};
use crate::error::{PipelineError, Result};

/// Result of [`select`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Task inferred from the target column
    pub task: TaskKind,
    /// Catalog models applicable to the task
    pub models: Vec<ModelKind>,
    /// Rows whose target is present
    pub usable_rows: usize,
}

/// Task kind implied by a target column.
///
/// Categorical and boolean targets are labels. A numeric target is treated as
/// labels when it has at most `config.max_classes` distinct values and no
/// more than half as many distinct values as usable rows.
pub fn infer_task(target: &Column, config: &TrainingConfig) -> TaskKind {
    match target.kind() {
        ColumnKind::Categorical | ColumnKind::Boolean => TaskKind::Classification,
        ColumnKind::Integer | ColumnKind::Float => {
            let usable = target.len() - target.missing_count();
            let distinct = target.distinct_count();
            if distinct <= config.max_classes && distinct * 2 <= usable {
                TaskKind::Classification
            } else {
                TaskKind::Regression
            }
        }
    }
}

/// Look up the target and check there are enough usable rows to split
pub(crate) fn usable_target<'a>(dataset: &'a Dataset, target: &str, config: &TrainingConfig) -> Result<(&'a Column, usize)> {
    let column = dataset
        .column(target)
        .ok_or_else(|| PipelineError::TargetNotFound(target.to_string()))?;

    let usable = column.len() - column.missing_count();
    if usable < config.min_rows {
        return Err(PipelineError::InsufficientRows {
            required: config.min_rows,
            actual: usable,
        });
    }
    Ok((column, usable))
}

/// Models applicable to predicting `target` from the rest of `dataset`
pub fn select(dataset: &Dataset, target: &str, config: &TrainingConfig) -> Result<Selection> {
    let (column, usable_rows) = usable_target(dataset, target, config)?;
    let task = infer_task(column, config);
    debug!(target = %target, task = %task, usable_rows, "Selected task");

    Ok(Selection {
        task,
        models: ModelKind::catalog(task).to_vec(),
        usable_rows,
    })
}
