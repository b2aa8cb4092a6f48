//! Dataset cleaning
//!
//! Provides the cleaning engine applied to stored datasets:
//! - Missing value handling (drop rows, or fill with mean/median/mode)
//! - Duplicate row removal
//! - Feature scaling (standard, min-max, robust)
//! - Categorical encoding (one-hot, label)

mod config;
mod dedup;
mod encoder;
mod imputer;
mod pipeline;
mod scaler;

pub use config::{CleaningOptions, EncoderKind, FillStrategy, MissingStrategy, ScalerKind};
pub use dedup::remove_duplicates;
pub use encoder::Encoder;
pub(crate) use encoder::unique_name;
pub use imputer::{drop_missing, mode, Imputer};
pub use pipeline::{clean, CleanReport, CleaningPipeline, CleaningWarning};
pub use scaler::Scaler;
