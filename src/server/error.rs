//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::PipelineError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(e) => match e {
                PipelineError::NotFound(_) | PipelineError::ColumnNotFound(_) | PipelineError::TargetNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PipelineError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                PipelineError::InsufficientData { .. } | PipelineError::InsufficientRows { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PipelineError::IncompatibleTask { .. }
                | PipelineError::UnknownModel(_)
                | PipelineError::NotSupported(_) => StatusCode::BAD_REQUEST,
                PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(detail = %self, "Internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": true,
            "message": message,
        });
        if let ServerError::Pipeline(e) = &self {
            body["kind"] = json!(e.kind());
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PipelineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PipelineError::UnsupportedFormat("x".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (
                PipelineError::InsufficientRows { required: 5, actual: 1 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (PipelineError::NotSupported("x".into()), StatusCode::BAD_REQUEST),
            (PipelineError::Timeout(1), StatusCode::GATEWAY_TIMEOUT),
            (PipelineError::Computation("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
    }
}
