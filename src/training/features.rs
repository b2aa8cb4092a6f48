//! Feature matrix and target vector extraction

use ndarray::{Array1, Array2};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::models::TaskKind;
use crate::dataset::{Column, ColumnKind, Dataset, Value};
use crate::error::{PipelineError, Result};
use crate::preprocessing::unique_name;

/// Numeric view of a dataset ready for fitting
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Feature matrix, one row per usable row
    pub x: Array2<f64>,
    /// Regression targets, or class indices into `classes`
    pub y: Array1<f64>,
    /// Mapping from source columns to the columns of `x`
    pub schema: FeatureSchema,
    /// Task the target was prepared for
    pub task: TaskKind,
    /// Sorted class labels; `y` holds indices into it
    pub classes: Option<Vec<String>>,
    /// Min and max of a regression target
    pub target_range: Option<[f64; 2]>,
}

impl PreparedData {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn feature_names(&self) -> &[String] {
        self.schema.feature_names()
    }

    /// Class index of every row (classification only)
    pub fn labels(&self) -> Vec<usize> {
        self.y.iter().map(|&v| v as usize).collect()
    }
}

/// How one source column maps onto feature columns
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureSource {
    /// Integer or float column, missing as 0
    Numeric(String),
    /// Boolean column as 0/1, missing as 0
    Flag(String),
    /// One indicator per category, matched on rendered text
    OneHot { column: String, categories: Vec<String> },
}

impl FeatureSource {
    pub fn column(&self) -> &str {
        match self {
            FeatureSource::Numeric(column) | FeatureSource::Flag(column) => column,
            FeatureSource::OneHot { column, .. } => column,
        }
    }

    fn width(&self) -> usize {
        match self {
            FeatureSource::OneHot { categories, .. } => categories.len(),
            _ => 1,
        }
    }

    fn accepts(&self, column: &Column) -> bool {
        let all_missing = column.missing_count() == column.len();
        match self {
            FeatureSource::Numeric(_) => all_missing || column.kind().is_numeric(),
            FeatureSource::Flag(_) => all_missing || column.kind() == ColumnKind::Boolean,
            FeatureSource::OneHot { .. } => true,
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            FeatureSource::Numeric(_) => "numeric",
            FeatureSource::Flag(_) => "boolean",
            FeatureSource::OneHot { .. } => "categorical",
        }
    }
}

/// Feature layout learned from a training dataset.
///
/// A fitted model keeps its schema so that any other dataset carrying the
/// same feature columns can be turned into a matrix with identical columns.
/// Categories unseen at fit time encode as all zeros; extra columns are ignored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureSchema {
    sources: Vec<FeatureSource>,
    feature_names: Vec<String>,
}

impl FeatureSchema {
    /// Layout of every column except `target`, with categories taken from `rows`
    fn infer(dataset: &Dataset, target: &str, rows: &[usize]) -> Self {
        let mut taken: HashSet<String> = dataset.column_names().iter().map(|s| s.to_string()).collect();
        let mut schema = FeatureSchema::default();

        for column in dataset.columns().iter().filter(|c| c.name() != target) {
            let name = column.name().to_string();
            match column.kind() {
                ColumnKind::Integer | ColumnKind::Float => {
                    schema.feature_names.push(name.clone());
                    schema.sources.push(FeatureSource::Numeric(name));
                }
                ColumnKind::Boolean => {
                    schema.feature_names.push(name.clone());
                    schema.sources.push(FeatureSource::Flag(name));
                }
                ColumnKind::Categorical => {
                    let mut categories: Vec<String> = Vec::new();
                    for value in column.select(rows).distinct_values() {
                        let category = value.render();
                        if categories.contains(&category) {
                            continue;
                        }
                        let feature = unique_name(&format!("{}_{}", name, category), |n| taken.contains(n));
                        taken.insert(feature.clone());
                        schema.feature_names.push(feature);
                        categories.push(category);
                    }
                    schema.sources.push(FeatureSource::OneHot { column: name, categories });
                }
            }
        }
        schema
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn sources(&self) -> &[FeatureSource] {
        &self.sources
    }

    /// Fails with `ColumnNotFound` when a source column is absent from
    /// `dataset` or holds cells of an incompatible kind.
    pub fn check(&self, dataset: &Dataset) -> Result<()> {
        self.resolve(dataset).map(|_| ())
    }

    /// Feature matrix for every row of `dataset`
    pub fn transform(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let rows: Vec<usize> = (0..dataset.n_rows()).collect();
        self.matrix(dataset, &rows)
    }

    /// Feature matrix for the given rows of `dataset`
    pub fn matrix(&self, dataset: &Dataset, rows: &[usize]) -> Result<Array2<f64>> {
        let columns = self.resolve(dataset)?;
        let mut x = Array2::<f64>::zeros((rows.len(), self.n_features()));

        let mut offset = 0;
        for (source, column) in self.sources.iter().zip(columns) {
            let values = column.values();
            match source {
                FeatureSource::Numeric(_) => {
                    for (r, &i) in rows.iter().enumerate() {
                        x[[r, offset]] = values[i].as_f64().unwrap_or(0.0);
                    }
                }
                FeatureSource::Flag(_) => {
                    for (r, &i) in rows.iter().enumerate() {
                        if let Value::Bool(true) = values[i] {
                            x[[r, offset]] = 1.0;
                        }
                    }
                }
                FeatureSource::OneHot { categories, .. } => {
                    let index: HashMap<&str, usize> =
                        categories.iter().enumerate().map(|(j, c)| (c.as_str(), j)).collect();
                    for (r, &i) in rows.iter().enumerate() {
                        if values[i].is_missing() {
                            continue;
                        }
                        if let Some(&j) = index.get(values[i].render().as_str()) {
                            x[[r, offset + j]] = 1.0;
                        }
                    }
                }
            }
            offset += source.width();
        }
        Ok(x)
    }

    fn resolve<'a>(&self, dataset: &'a Dataset) -> Result<Vec<&'a Column>> {
        self.sources
            .iter()
            .map(|source| {
                let column = dataset
                    .column(source.column())
                    .ok_or_else(|| PipelineError::ColumnNotFound(source.column().to_string()))?;
                if !source.accepts(column) {
                    return Err(PipelineError::ColumnNotFound(format!(
                        "'{}' ({} column expected, found {})",
                        source.column(),
                        source.expected(),
                        column.kind()
                    )));
                }
                Ok(column)
            })
            .collect()
    }
}

/// Build `x` and `y` from the rows of `dataset` whose target is present.
///
/// Numeric cells map to themselves (missing as 0), booleans to 0/1, and
/// categorical columns are one-hot expanded into `<column>_<category>`.
pub fn prepare(dataset: &Dataset, target: &str, task: TaskKind) -> Result<PreparedData> {
    let target_col = dataset
        .column(target)
        .ok_or_else(|| PipelineError::TargetNotFound(target.to_string()))?;

    let rows: Vec<usize> = (0..dataset.n_rows())
        .filter(|&i| !target_col.values()[i].is_missing())
        .collect();

    let schema = FeatureSchema::infer(dataset, target, &rows);
    if schema.n_features() == 0 {
        return Err(PipelineError::InsufficientData {
            column: target.to_string(),
            reason: "no feature columns besides the target".to_string(),
        });
    }
    let x = schema.matrix(dataset, &rows)?;

    let target_values: Vec<&Value> = rows.iter().map(|&i| &target_col.values()[i]).collect();
    let (y, classes, target_range) = match task {
        TaskKind::Classification => {
            let classes = class_labels(&target_values);
            let lookup: HashMap<&str, usize> = classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
            let y: Array1<f64> = target_values
                .iter()
                .map(|v| lookup.get(v.render().as_str()).copied().unwrap_or(0) as f64)
                .collect();
            (y, Some(classes), None)
        }
        TaskKind::Regression => {
            let y: Vec<f64> = target_values
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| PipelineError::InsufficientData {
                        column: target.to_string(),
                        reason: format!("non-numeric target value '{}'", v.render()),
                    })
                })
                .collect::<Result<_>>()?;
            let min = y.iter().copied().fold(f64::INFINITY, f64::min);
            let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (Array1::from_vec(y), None, Some([min, max]))
        }
    };

    Ok(PreparedData {
        x,
        y,
        schema,
        task,
        classes,
        target_range,
    })
}

/// Distinct rendered labels, sorted numerically when every label is a number
pub fn class_labels(values: &[&Value]) -> Vec<String> {
    let mut labels: Vec<String> = values
        .iter()
        .map(|v| v.render())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let numeric: Option<Vec<f64>> = labels.iter().map(|l| l.parse::<f64>().ok()).collect();
    match numeric {
        Some(_) => labels.sort_by(|a, b| {
            let (x, y) = (a.parse::<f64>().unwrap_or(0.0), b.parse::<f64>().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b))
        }),
        None => labels.sort(),
    }
    labels
}
