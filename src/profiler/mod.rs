//! Dataset profiling
//!
//! Type inference over raw text cells, and per-column structure, missing
//! counts and shape for a loaded dataset. Profiling has no side effects.

use crate::dataset::{ColumnKind, Dataset, Value};
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

/// Raw tokens read as the missing marker (compared after trimming)
pub const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "-"];

/// Tokens accepted as booleans, true token first (compared case-insensitively)
pub const BOOLEAN_TOKENS: [&str; 2] = ["true", "false"];

pub fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw.trim())
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    BOOLEAN_TOKENS
        .iter()
        .position(|token| token.eq_ignore_ascii_case(raw))
        .map(|idx| idx == 0)
}

/// Infer the kind of a column of raw text cells.
///
/// Precedence is integer, float, boolean, categorical. Missing cells (either
/// `None` or a missing token) never influence the result.
pub fn infer_kind<'a, I>(cells: I) -> ColumnKind
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut all_int = true;
    let mut all_decimal = true;
    let mut all_bool = true;
    let mut seen_any = false;

    for raw in cells.into_iter().flatten() {
        if is_missing_token(raw) {
            continue;
        }
        seen_any = true;
        if all_int && parse_int(raw).is_none() {
            all_int = false;
        }
        if all_decimal && parse_decimal(raw).is_none() {
            all_decimal = false;
        }
        if all_bool && parse_bool(raw).is_none() {
            all_bool = false;
        }
        if !all_int && !all_decimal && !all_bool {
            break;
        }
    }

    if !seen_any {
        ColumnKind::Categorical
    } else if all_int {
        ColumnKind::Integer
    } else if all_decimal {
        ColumnKind::Float
    } else if all_bool {
        ColumnKind::Boolean
    } else {
        ColumnKind::Categorical
    }
}

/// Convert a raw cell into a typed value of the given column kind
pub fn parse_cell(kind: ColumnKind, raw: Option<&str>) -> Value {
    let raw = match raw {
        Some(r) if !is_missing_token(r) => r,
        _ => return Value::Missing,
    };

    match kind {
        ColumnKind::Integer => parse_int(raw).map_or(Value::Missing, Value::Int),
        ColumnKind::Float => parse_decimal(raw).map_or(Value::Missing, Value::Float),
        ColumnKind::Boolean => parse_bool(raw).map_or(Value::Missing, Value::Bool),
        ColumnKind::Categorical => Value::Text(raw.trim().to_string()),
    }
}

/// Profile of a single column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    /// Inferred kind
    pub kind: ColumnKind,
    /// Missing cells
    pub missing: usize,
    /// Distinct present values
    pub distinct: usize,
}

/// Structure, missing counts and shape of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetProfile {
    /// One entry per column, in dataset order
    pub columns: Vec<ColumnProfile>,
    /// `(rows, columns)`
    pub shape: (usize, usize),
}

impl DatasetProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(|c| c.kind)
    }
}

/// Profile a dataset
pub fn profile(dataset: &Dataset) -> DatasetProfile {
    let columns = dataset
        .columns()
        .iter()
        .map(|col| ColumnProfile {
            name: col.name().to_string(),
            kind: col.kind(),
            missing: col.missing_count(),
            distinct: col.distinct_count(),
        })
        .collect();

    DatasetProfile {
        columns,
        shape: dataset.shape(),
    }
}

struct StructureView<'a>(&'a [ColumnProfile]);

impl Serialize for StructureView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for col in self.0 {
            map.serialize_entry(&col.name, &col.kind)?;
        }
        map.end()
    }
}

struct MissingView<'a>(&'a [ColumnProfile]);

impl Serialize for MissingView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for col in self.0 {
            map.serialize_entry(&col.name, &col.missing)?;
        }
        map.end()
    }
}

/// Serializes as `{structure: {col: kind}, missing: {col: count}, shape: [rows, cols]}`
impl Serialize for DatasetProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DatasetProfile", 3)?;
        state.serialize_field("structure", &StructureView(&self.columns))?;
        state.serialize_field("missing", &MissingView(&self.columns))?;
        state.serialize_field("shape", &[self.shape.0, self.shape.1])?;
        state.end()
    }
}
