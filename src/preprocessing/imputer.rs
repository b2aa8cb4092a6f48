//! Missing value handling

use super::config::FillStrategy;
use super::scaler::{mean, percentile, sorted};
use crate::dataset::{CellKey, Column, ColumnKind, Dataset, Value};
use crate::error::{PipelineError, Result};
use std::collections::HashMap;

/// Remove every row that holds at least one missing cell
pub fn drop_missing(dataset: &Dataset) -> Dataset {
    let keep: Vec<usize> = (0..dataset.n_rows())
        .filter(|&i| dataset.columns().iter().all(|c| !c.values()[i].is_missing()))
        .collect();
    if keep.len() == dataset.n_rows() {
        return dataset.clone();
    }
    dataset.select_rows(&keep)
}

/// Most frequent non-missing value. Ties go to the value encountered first.
pub fn mode(column: &Column) -> Option<&Value> {
    let mut counts: HashMap<CellKey, (usize, usize)> = HashMap::new();
    for (pos, value) in column.values().iter().enumerate() {
        if value.is_missing() {
            continue;
        }
        counts.entry(value.key()).or_insert((0, pos)).0 += 1;
    }

    counts
        .values()
        .max_by(|(ca, pa), (cb, pb)| ca.cmp(cb).then_with(|| pb.cmp(pa)))
        .map(|&(_, first)| &column.values()[first])
}

/// Per-column missing value filler
#[derive(Debug, Clone, Copy)]
pub struct Imputer {
    strategy: FillStrategy,
}

impl Imputer {
    pub fn new(strategy: FillStrategy) -> Self {
        Self { strategy }
    }

    /// Value used to fill `column`. `Ok(None)` means the column needs no fill
    /// or the strategy is unrecognized.
    fn fill_value(&self, column: &Column) -> Result<Option<Value>> {
        let missing = column.missing_count();
        if missing == 0 || self.strategy == FillStrategy::Unrecognized {
            return Ok(None);
        }
        if missing == column.len() {
            return Err(PipelineError::InsufficientData {
                column: column.name().to_string(),
                reason: "every value is missing, nothing to fill from".to_string(),
            });
        }

        let kind = column.kind();
        let stat = match (kind.is_numeric(), self.strategy) {
            (true, FillStrategy::Mean) => mean(&column.numeric_values()),
            (true, FillStrategy::Median) => percentile(&sorted(&column.numeric_values()), 0.5),
            _ => return Ok(mode(column).cloned()),
        };

        Ok(stat.map(|v| {
            if kind == ColumnKind::Integer && v.fract() == 0.0 {
                Value::Int(v as i64)
            } else {
                Value::Float(v)
            }
        }))
    }

    /// Fill one column. An integer column filled with a non-integral value
    /// becomes a float column.
    pub fn fill_column(&self, column: &Column) -> Result<Column> {
        let Some(fill) = self.fill_value(column)? else {
            return Ok(column.clone());
        };

        let widen = matches!(fill, Value::Float(_)) && column.kind() == ColumnKind::Integer;
        let values = column
            .values()
            .iter()
            .map(|v| match v {
                Value::Missing => fill.clone(),
                Value::Int(i) if widen => Value::Float(*i as f64),
                other => other.clone(),
            })
            .collect();
        Ok(column.with_values(values))
    }
}
