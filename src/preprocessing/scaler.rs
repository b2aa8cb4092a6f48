//! Feature scaling for numeric columns

use super::config::ScalerKind;
use crate::dataset::{Column, Value};
use tracing::debug;

/// Center and scale fitted on one column
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScalerParams {
    center: f64, // mean, min, or median
    scale: f64,  // std, range, or IQR
}

/// Arithmetic mean; `None` for an empty slice
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Percentile with linear interpolation between closest ranks. `sorted` must be ascending.
pub(crate) fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Column scaler
#[derive(Debug, Clone, Copy)]
pub struct Scaler {
    kind: ScalerKind,
}

impl Scaler {
    pub fn new(kind: ScalerKind) -> Self {
        Self { kind }
    }

    fn compute_params(&self, values: &[f64]) -> Option<ScalerParams> {
        let sorted = sorted(values);
        let (min, max) = (*sorted.first()?, *sorted.last()?);
        // constant columns are never scaled
        if min == max {
            return None;
        }

        let params = match self.kind {
            ScalerKind::None => return None,
            ScalerKind::Standard => ScalerParams {
                center: mean(values)?,
                scale: std_dev(values)?,
            },
            ScalerKind::MinMax => ScalerParams {
                center: min,
                scale: max - min,
            },
            ScalerKind::Robust => ScalerParams {
                center: percentile(&sorted, 0.5)?,
                scale: percentile(&sorted, 0.75)? - percentile(&sorted, 0.25)?,
            },
        };

        (params.scale != 0.0 && params.scale.is_finite()).then_some(params)
    }

    /// Scale one column. Non-numeric columns, constant columns and columns
    /// whose spread is zero come back unchanged. Missing cells stay missing.
    pub fn scale_column(&self, column: &Column) -> Column {
        if !column.kind().is_numeric() {
            return column.clone();
        }

        let Some(params) = self.compute_params(&column.numeric_values()) else {
            debug!(column = column.name(), scaler = ?self.kind, "Column left unscaled");
            return column.clone();
        };

        let values = column
            .values()
            .iter()
            .map(|v| match v.as_f64() {
                Some(x) => Value::Float((x - params.center) / params.scale),
                None => Value::Missing,
            })
            .collect();
        column.with_values(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnKind;

    fn floats(col: &Column) -> Vec<f64> {
        col.numeric_values()
    }

    #[test]
    fn test_percentile_interpolates() {
        let s = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&s, 0.5), Some(2.5));
        assert_eq!(percentile(&s, 0.25), Some(1.75));
        assert_eq!(percentile(&s, 1.0), Some(4.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_standard_scaling() {
        let col = Column::from_values("x", [1i64, 2, 3, 4, 5]);
        let scaled = Scaler::new(ScalerKind::Standard).scale_column(&col);
        let values = floats(&scaled);
        assert!(mean(&values).unwrap().abs() < 1e-10);
        assert!((std_dev(&values).unwrap() - 1.0).abs() < 1e-10);
        assert_eq!(scaled.kind(), ColumnKind::Float);
    }

    #[test]
    fn test_minmax_scaling() {
        let col = Column::from_values("x", [10.0, 20.0, 30.0]);
        let scaled = Scaler::new(ScalerKind::MinMax).scale_column(&col);
        assert_eq!(floats(&scaled), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_robust_scaling() {
        let col = Column::from_values("x", [1.0, 2.0, 3.0, 4.0, 5.0]);
        let scaled = Scaler::new(ScalerKind::Robust).scale_column(&col);
        // median 3, IQR 4 - 2
        assert_eq!(floats(&scaled), vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_zero_spread_left_unscaled() {
        let constant = Column::from_values("c", [7i64, 7, 7]);
        for kind in [ScalerKind::Standard, ScalerKind::MinMax, ScalerKind::Robust] {
            assert_eq!(Scaler::new(kind).scale_column(&constant), constant);
        }

        // IQR is zero even though the column is not constant
        let spiky = Column::from_values("s", [1.0, 1.0, 1.0, 1.0, 9.0]);
        assert_eq!(Scaler::new(ScalerKind::Robust).scale_column(&spiky), spiky);
    }

    #[test]
    fn test_missing_and_non_numeric_untouched() {
        let col = Column::new("x", vec![Value::Float(0.0), Value::Missing, Value::Float(2.0)]);
        let scaled = Scaler::new(ScalerKind::MinMax).scale_column(&col);
        assert_eq!(scaled.values()[1], Value::Missing);
        assert_eq!(scaled.values()[2], Value::Float(1.0));

        let flags = Column::from_values("b", [true, false]);
        assert_eq!(Scaler::new(ScalerKind::Standard).scale_column(&flags), flags);
    }
}
