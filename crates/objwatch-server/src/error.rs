//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;
use crate::pipeline::AdmissionError;

/// Errors surfaced to HTTP callers
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed ingest payload; never reaches the pipeline
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<objwatch_common::ObjwatchError> for AppError {
    fn from(err: objwatch_common::ObjwatchError) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Decode(ref message) => {
                tracing::debug!(error = %message, "Rejected ingest payload");
                (StatusCode::BAD_REQUEST, "error decoding request".to_string())
            },
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "store unavailable".to_string())
            },
            AppError::Unavailable(ref message) => (StatusCode::SERVICE_UNAVAILABLE, message.clone()),
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
