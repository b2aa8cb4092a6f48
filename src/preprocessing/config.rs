//! Cleaning configuration

use serde::{Deserialize, Deserializer, Serialize};

/// What to do with missing cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingStrategy {
    /// Remove every row holding a missing cell
    Drop,
    /// Fill missing cells per column
    Fill,
    /// Leave missing cells alone
    #[default]
    #[serde(other)]
    None,
}

/// Statistic used to fill missing cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    #[default]
    Mean,
    Median,
    /// Most frequent value, ties broken by first occurrence
    Mode,
    /// Unrecognized strategy; filling is skipped
    #[serde(other)]
    Unrecognized,
}

/// Scaling applied to numeric columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    /// (x - mean) / std
    Standard,
    /// (x - min) / (max - min)
    MinMax,
    /// (x - median) / IQR
    Robust,
    #[default]
    #[serde(other)]
    None,
}

/// Encoding applied to categorical columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    OneHot,
    Label,
    #[default]
    #[serde(other)]
    None,
}

/// Options for one cleaning run.
///
/// Steps always run in the order missing handling, duplicate removal,
/// scaling, encoding. Absent, null or unrecognized values disable their step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningOptions {
    /// Drop incomplete rows, fill them, or leave them
    #[serde(default, deserialize_with = "null_as_default")]
    pub handle_missing: MissingStrategy,
    /// Statistic used when `handle_missing` is `fill`
    #[serde(default, deserialize_with = "null_as_default")]
    pub fill_strategy: FillStrategy,
    /// Drop exact duplicate rows, keeping the first
    #[serde(default, deserialize_with = "null_as_default")]
    pub remove_duplicates: bool,
    /// Scaling applied to numeric columns
    #[serde(default, deserialize_with = "null_as_default")]
    pub scaler: ScalerKind,
    /// Encoding applied to categorical columns
    #[serde(default, deserialize_with = "null_as_default")]
    pub encoder: EncoderKind,
}

impl CleaningOptions {
    /// Options with every step disabled
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drop_missing(mut self) -> Self {
        self.handle_missing = MissingStrategy::Drop;
        self
    }

    pub fn with_fill(mut self, strategy: FillStrategy) -> Self {
        self.handle_missing = MissingStrategy::Fill;
        self.fill_strategy = strategy;
        self
    }

    pub fn with_remove_duplicates(mut self, remove: bool) -> Self {
        self.remove_duplicates = remove;
        self
    }

    pub fn with_scaler(mut self, scaler: ScalerKind) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderKind) -> Self {
        self.encoder = encoder;
        self
    }

    /// True when no step would touch the dataset
    pub fn is_noop(&self) -> bool {
        self.handle_missing == MissingStrategy::None
            && !self.remove_duplicates
            && self.scaler == ScalerKind::None
            && self.encoder == EncoderKind::None
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let opts: CleaningOptions = serde_json::from_str(
            r#"{"handleMissing":"fill","fillStrategy":"median","removeDuplicates":true,"scaler":"minmax","encoder":"onehot"}"#,
        )
        .unwrap();
        assert_eq!(
            opts,
            CleaningOptions::new()
                .with_fill(FillStrategy::Median)
                .with_remove_duplicates(true)
                .with_scaler(ScalerKind::MinMax)
                .with_encoder(EncoderKind::OneHot)
        );
    }

    #[test]
    fn test_absent_and_unknown_values_are_noops() {
        let opts: CleaningOptions = serde_json::from_str(
            r#"{"handleMissing":"interpolate","scaler":"quantile","encoder":null}"#,
        )
        .unwrap();
        assert!(opts.is_noop());
        assert_eq!(opts.fill_strategy, FillStrategy::Mean);

        let empty: CleaningOptions = serde_json::from_str("{}").unwrap();
        assert!(empty.is_noop());
    }

    #[test]
    fn test_unknown_fill_strategy() {
        let opts: CleaningOptions =
            serde_json::from_str(r#"{"handleMissing":"fill","fillStrategy":"zero"}"#).unwrap();
        assert_eq!(opts.handle_missing, MissingStrategy::Fill);
        assert_eq!(opts.fill_strategy, FillStrategy::Unrecognized);
    }
}
