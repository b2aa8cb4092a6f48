//! Cleaning pipeline

use super::config::{CleaningOptions, EncoderKind, MissingStrategy, ScalerKind};
use super::dedup::remove_duplicates;
use super::encoder::Encoder;
use super::imputer::{drop_missing, Imputer};
use super::scaler::Scaler;
use crate::dataset::{Column, Dataset};
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A recovered per-column problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningWarning {
    /// Column the step was skipped for
    pub column: String,
    pub message: String,
}

/// Output of a cleaning run
#[derive(Debug, Clone)]
pub struct CleanReport {
    /// The cleaned dataset
    pub dataset: Dataset,
    /// Steps that were skipped, in the order they happened
    pub warnings: Vec<CleaningWarning>,
}

/// Applies missing handling, deduplication, scaling and encoding in that order
#[derive(Debug, Clone, Default)]
pub struct CleaningPipeline {
    options: CleaningOptions,
}

impl CleaningPipeline {
    pub fn new(options: CleaningOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CleaningOptions {
        &self.options
    }

    /// Run every enabled step. The input is never modified.
    pub fn clean(&self, dataset: &Dataset) -> Result<CleanReport> {
        let start = Instant::now();
        let mut warnings = Vec::new();
        let rows_in = dataset.n_rows();

        let mut current = match self.options.handle_missing {
            MissingStrategy::Drop => {
                let out = drop_missing(dataset);
                debug!(dropped = rows_in - out.n_rows(), "Dropped rows with missing values");
                out
            }
            MissingStrategy::Fill => self.fill(dataset, &mut warnings)?,
            MissingStrategy::None => dataset.clone(),
        };

        if self.options.remove_duplicates {
            let before = current.n_rows();
            current = remove_duplicates(&current);
            debug!(removed = before - current.n_rows(), "Removed duplicate rows");
        }

        if self.options.scaler != ScalerKind::None {
            let scaler = Scaler::new(self.options.scaler);
            current = Dataset::new(
                current.columns().iter().map(|c| scaler.scale_column(c)).collect(),
            )?;
        }

        if self.options.encoder != EncoderKind::None {
            current = self.encode(&current)?;
        }

        info!(
            rows_in,
            rows_out = current.n_rows(),
            cols_out = current.n_cols(),
            warnings = warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cleaning complete"
        );

        Ok(CleanReport {
            dataset: current,
            warnings,
        })
    }

    fn fill(&self, dataset: &Dataset, warnings: &mut Vec<CleaningWarning>) -> Result<Dataset> {
        let imputer = Imputer::new(self.options.fill_strategy);
        let mut columns = Vec::with_capacity(dataset.n_cols());

        for column in dataset.columns() {
            match imputer.fill_column(column) {
                Ok(filled) => columns.push(filled),
                Err(err @ PipelineError::InsufficientData { .. }) => {
                    warn!(column = column.name(), error = %err, "Column left unfilled");
                    warnings.push(CleaningWarning {
                        column: column.name().to_string(),
                        message: err.to_string(),
                    });
                    columns.push(column.clone());
                }
                Err(err) => return Err(err),
            }
        }

        Dataset::new(columns)
    }

    fn encode(&self, dataset: &Dataset) -> Result<Dataset> {
        let encoder = Encoder::new(self.options.encoder);
        let mut taken: HashSet<String> = dataset.column_names().into_iter().map(String::from).collect();
        let mut columns: Vec<Column> = Vec::with_capacity(dataset.n_cols());

        for column in dataset.columns() {
            taken.remove(column.name());
            for encoded in encoder.encode_column(column, &taken) {
                taken.insert(encoded.name().to_string());
                columns.push(encoded);
            }
        }

        Dataset::new(columns)
    }
}

/// Clean `dataset` with `options`
pub fn clean(dataset: &Dataset, options: &CleaningOptions) -> Result<CleanReport> {
    CleaningPipeline::new(options.clone()).clean(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::preprocessing::config::FillStrategy;

    fn sample() -> Dataset {
        Dataset::from_rows(
            &["a", "b"],
            vec![
                vec![Value::Int(1), "x".into()],
                vec![Value::Int(2), "y".into()],
                vec![Value::Missing, "x".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_disabled_pipeline_is_identity() {
        let ds = sample();
        let report = clean(&ds, &CleaningOptions::new()).unwrap();
        assert_eq!(report.dataset, ds);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_fill_then_dedup() {
        let options = CleaningOptions::new()
            .with_fill(FillStrategy::Mean)
            .with_remove_duplicates(true);
        let report = clean(&sample(), &options).unwrap();
        assert_eq!(
            report.dataset.column("a").unwrap().numeric_values(),
            vec![1.0, 2.0, 1.5]
        );
        assert_eq!(report.dataset.n_rows(), 3);
    }

    #[test]
    fn test_fill_failure_is_warning() {
        let ds = Dataset::new(vec![
            Column::new("a", vec![Value::Int(1), Value::Missing]),
            Column::new("empty", vec![Value::Missing, Value::Missing]),
        ])
        .unwrap();

        let report = clean(&ds, &CleaningOptions::new().with_fill(FillStrategy::Median)).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].column, "empty");
        assert_eq!(report.dataset.column("a").unwrap().missing_count(), 0);
        assert_eq!(report.dataset.column("empty").unwrap().missing_count(), 2);
    }

    #[test]
    fn test_one_hot_replaces_column_in_place() {
        let report = clean(&sample(), &CleaningOptions::new().with_encoder(EncoderKind::OneHot)).unwrap();
        assert_eq!(report.dataset.column_names(), vec!["a", "b_x", "b_y"]);
    }

    #[test]
    fn test_input_not_mutated() {
        let ds = sample();
        let before = ds.clone();
        let options = CleaningOptions::new()
            .with_drop_missing()
            .with_scaler(ScalerKind::Standard)
            .with_encoder(EncoderKind::Label);
        let report = clean(&ds, &options).unwrap();
        assert_eq!(ds, before);
        assert_eq!(report.dataset.n_rows(), 2);
    }
}
