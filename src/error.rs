//! Error types for the pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Dataset not found: {0}")]
    NotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Target column not found: {0}")]
    TargetNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Insufficient data in column '{column}': {reason}")]
    InsufficientData { column: String, reason: String },

    #[error("Insufficient rows: need at least {required}, got {actual}")]
    InsufficientRows { required: usize, actual: usize },

    #[error("Model {model} cannot be used for a {task} task")]
    IncompatibleTask { model: String, task: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::UnsupportedFormat(err.to_string())
    }
}

impl From<calamine::Error> for PipelineError {
    fn from(err: calamine::Error) -> Self {
        PipelineError::UnsupportedFormat(err.to_string())
    }
}

impl PipelineError {
    /// Short machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) | PipelineError::ColumnNotFound(_) => "NotFound",
            PipelineError::TargetNotFound(_) => "TargetNotFound",
            PipelineError::UnsupportedFormat(_) => "UnsupportedFormat",
            PipelineError::InsufficientData { .. } => "InsufficientData",
            PipelineError::InsufficientRows { .. } => "InsufficientRows",
            PipelineError::IncompatibleTask { .. } => "IncompatibleTask",
            PipelineError::UnknownModel(_) => "UnknownModel",
            PipelineError::NotSupported(_) => "NotSupported",
            PipelineError::Cancelled => "Cancelled",
            PipelineError::Timeout(_) => "Timeout",
            PipelineError::ShapeError { .. }
            | PipelineError::ModelNotFitted
            | PipelineError::Computation(_)
            | PipelineError::Io(_) => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::InsufficientRows { required: 5, actual: 2 };
        assert_eq!(err.to_string(), "Insufficient rows: need at least 5, got 2");
        assert_eq!(err.kind(), "InsufficientRows");
    }

    #[test]
    fn test_column_not_found_is_not_found_kind() {
        assert_eq!(PipelineError::ColumnNotFound("a".into()).kind(), "NotFound");
    }
}
