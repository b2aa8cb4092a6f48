//! Categorical encoding

use super::config::EncoderKind;
use crate::dataset::{Column, ColumnKind, Value};
use std::collections::{HashMap, HashSet};

/// Categorical column encoder
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    kind: EncoderKind,
}

impl Encoder {
    pub fn new(kind: EncoderKind) -> Self {
        Self { kind }
    }

    /// Encode one column into its replacement columns.
    ///
    /// Returns the column unchanged when it is not categorical, has no
    /// categories, or the encoder is disabled. `taken` holds the names already
    /// used in the output so one-hot names never clash with existing columns.
    pub fn encode_column(&self, column: &Column, taken: &HashSet<String>) -> Vec<Column> {
        if column.kind() != ColumnKind::Categorical {
            return vec![column.clone()];
        }
        let categories = column.distinct_values();
        if categories.is_empty() {
            return vec![column.clone()];
        }

        match self.kind {
            EncoderKind::None => vec![column.clone()],
            EncoderKind::Label => vec![label_encode(column)],
            EncoderKind::OneHot => one_hot(column, taken),
        }
    }
}

/// Integer codes in first-encountered order. Missing cells stay missing.
fn label_encode(column: &Column) -> Column {
    let codes: HashMap<_, i64> = column
        .distinct_values()
        .into_iter()
        .enumerate()
        .map(|(code, value)| (value.key(), code as i64))
        .collect();

    column.with_values(
        column
            .values()
            .iter()
            .map(|v| match codes.get(&v.key()) {
                Some(&code) if !v.is_missing() => Value::Int(code),
                _ => Value::Missing,
            })
            .collect(),
    )
}

/// One boolean column per category, named `<column>_<category>`.
/// A missing row is false in every indicator.
fn one_hot(column: &Column, taken: &HashSet<String>) -> Vec<Column> {
    let mut used: HashSet<String> = HashSet::new();
    column
        .distinct_values()
        .into_iter()
        .map(|category| {
            let base = format!("{}_{}", column.name(), category.render());
            let name = unique_name(&base, |n| taken.contains(n) || used.contains(n));
            used.insert(name.clone());

            let key = category.key();
            let values = column
                .values()
                .iter()
                .map(|v| Value::Bool(!v.is_missing() && v.key() == key))
                .collect();
            Column::new(name, values)
        })
        .collect()
}

pub(crate) fn unique_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}
