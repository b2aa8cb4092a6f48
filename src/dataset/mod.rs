//! Typed tabular datasets
//!
//! A [`Dataset`] is an ordered list of named [`Column`]s, each holding one
//! [`Value`] per row. Datasets are immutable once built: every transformation
//! produces a new dataset, and the [`DatasetStore`] hands them out behind `Arc`.

pub mod io;
pub mod store;

pub use io::DataFormat;
pub use store::{DatasetOrigin, DatasetStore, DatasetSummary};

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Inferred kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Categorical,
}

impl ColumnKind {
    /// Integer and float columns are numeric; booleans are not.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Categorical => "categorical",
        };
        f.write_str(name)
    }
}

/// A single cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Missing,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Hashable identity of a cell, used for duplicate detection and category lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Missing,
    Int(i64),
    Float(u64),
    Bool(bool),
    Text(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the cell. Booleans and text are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn key(&self) -> CellKey {
        match self {
            Value::Missing => CellKey::Missing,
            Value::Int(v) => CellKey::Int(*v),
            // -0.0 and 0.0 compare equal
            Value::Float(v) => CellKey::Float(if *v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() }),
            Value::Bool(v) => CellKey::Bool(*v),
            Value::Text(v) => CellKey::Text(v.clone()),
        }
    }

    /// Text rendering used for categories, CSV export and labels.
    /// Missing renders as the empty string; `-0.0` renders like `0.0`.
    pub fn render(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) if *v == 0.0 => "0".to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Text(v) => v.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Missing => serde_json::Value::Null,
            Value::Int(v) => serde_json::json!(v),
            Value::Float(v) => serde_json::json!(v),
            Value::Bool(v) => serde_json::json!(v),
            Value::Text(v) => serde_json::json!(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build a column from anything convertible into cells
    pub fn from_values<T: Into<Value>>(name: impl Into<String>, values: impl IntoIterator<Item = T>) -> Self {
        Self::new(name, values.into_iter().map(Into::into).collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    /// Number of distinct non-missing values
    pub fn distinct_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| !v.is_missing())
            .map(Value::key)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Distinct non-missing values in first-encountered order
    pub fn distinct_values(&self) -> Vec<&Value> {
        let mut seen = HashSet::new();
        self.values
            .iter()
            .filter(|v| !v.is_missing() && seen.insert(v.key()))
            .collect()
    }

    /// Kind of the column derived from its typed cells.
    ///
    /// A column mixing incompatible cell types, or holding no values at all,
    /// is categorical.
    pub fn kind(&self) -> ColumnKind {
        let mut has_int = false;
        let mut has_float = false;
        let mut has_bool = false;
        let mut has_text = false;
        for value in &self.values {
            match value {
                Value::Missing => {}
                Value::Int(_) => has_int = true,
                Value::Float(_) => has_float = true,
                Value::Bool(_) => has_bool = true,
                Value::Text(_) => has_text = true,
            }
        }

        match (has_int, has_float, has_bool, has_text) {
            (true, false, false, false) => ColumnKind::Integer,
            (_, true, false, false) => ColumnKind::Float,
            (false, false, true, false) => ColumnKind::Boolean,
            _ => ColumnKind::Categorical,
        }
    }

    /// Non-missing numeric values, in row order
    pub fn numeric_values(&self) -> Vec<f64> {
        self.values.iter().filter_map(Value::as_f64).collect()
    }

    /// Same column name, new cells
    pub fn with_values(&self, values: Vec<Value>) -> Self {
        Self::new(self.name.clone(), values)
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        self.with_values(indices.iter().map(|&i| self.values[i].clone()).collect())
    }
}

/// An ordered collection of equally long, uniquely named columns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Create a dataset, checking that every column has the same length and a unique name
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let n_rows = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
                return Err(PipelineError::ShapeError {
                    expected: format!("{} rows in column '{}'", n_rows, bad.name()),
                    actual: format!("{} rows", bad.len()),
                });
            }
        }

        let mut names = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !names.insert(c.name())) {
            return Err(PipelineError::ShapeError {
                expected: "unique column names".to_string(),
                actual: format!("duplicate column '{}'", dup.name()),
            });
        }

        Ok(Self { columns })
    }

    /// Build a dataset from column names and row-major cells
    pub fn from_rows(names: &[&str], rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(PipelineError::ShapeError {
                    expected: format!("{} cells in row {}", names.len(), i),
                    actual: format!("{} cells", row.len()),
                });
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }

        Self::new(
            names
                .iter()
                .zip(columns)
                .map(|(name, values)| Column::new(*name, values))
                .collect(),
        )
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Cells of row `index`, in column order
    pub fn row(&self, index: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[index]).collect()
    }

    /// New dataset holding only the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.select(indices)).collect(),
        }
    }

    /// First `n` rows as JSON objects keyed by column name
    pub fn to_records(&self, n: usize) -> Vec<serde_json::Value> {
        (0..self.n_rows().min(n))
            .map(|i| {
                let record: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.name().to_string(), c.values[i].to_json()))
                    .collect();
                serde_json::Value::Object(record)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kind_from_cells() {
        assert_eq!(Column::from_values("a", [1i64, 2]).kind(), ColumnKind::Integer);
        assert_eq!(
            Column::new("a", vec![Value::Int(1), Value::Float(1.5), Value::Missing]).kind(),
            ColumnKind::Float
        );
        assert_eq!(Column::from_values("a", [true, false]).kind(), ColumnKind::Boolean);
        assert_eq!(Column::from_values("a", ["x", "y"]).kind(), ColumnKind::Categorical);
        assert_eq!(Column::new("a", vec![Value::Missing]).kind(), ColumnKind::Categorical);
        assert_eq!(
            Column::new("a", vec![Value::Bool(true), Value::Int(1)]).kind(),
            ColumnKind::Categorical
        );
    }

    #[test]
    fn test_dataset_rejects_ragged_columns() {
        let result = Dataset::new(vec![
            Column::from_values("a", [1i64, 2]),
            Column::from_values("b", [1i64]),
        ]);
        assert!(matches!(result, Err(PipelineError::ShapeError { .. })));
    }

    #[test]
    fn test_dataset_rejects_duplicate_names() {
        let result = Dataset::new(vec![
            Column::from_values("a", [1i64]),
            Column::from_values("a", [2i64]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_rows_and_shape() {
        let ds = Dataset::from_rows(
            &["a", "b"],
            vec![
                vec![Value::Int(1), "x".into()],
                vec![Value::Missing, "y".into()],
            ],
        )
        .unwrap();
        assert_eq!(ds.shape(), (2, 2));
        assert_eq!(ds.column("a").unwrap().missing_count(), 1);
        assert_eq!(ds.row(1), vec![&Value::Missing, &Value::Text("y".into())]);
    }

    #[test]
    fn test_distinct_values_first_encountered_order() {
        let col = Column::new(
            "c",
            vec!["b".into(), Value::Missing, "a".into(), "b".into(), "c".into()],
        );
        let distinct: Vec<String> = col.distinct_values().iter().map(|v| v.render()).collect();
        assert_eq!(distinct, vec!["b", "a", "c"]);
        assert_eq!(col.distinct_count(), 3);
    }

    #[test]
    fn test_records_render_missing_as_null() {
        let ds = Dataset::new(vec![Column::new("a", vec![Value::Missing, Value::Float(2.5)])]).unwrap();
        let records = ds.to_records(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["a"], serde_json::Value::Null);
        assert_eq!(records[1]["a"], serde_json::json!(2.5));
    }

    #[test]
    fn test_float_keys_treat_signed_zero_as_equal() {
        assert_eq!(Value::Float(0.0).key(), Value::Float(-0.0).key());
        assert_ne!(Value::Float(1.0).key(), Value::Int(1).key());
        assert_eq!(Value::Float(-0.0).render(), "0");
        assert_eq!(Value::Float(-0.0).render(), Value::Float(0.0).render());
    }
}
