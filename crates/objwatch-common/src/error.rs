//! Error types for objwatch

use thiserror::Error;

/// Result type alias for objwatch operations
pub type Result<T> = std::result::Result<T, ObjwatchError>;

/// Main error type shared across the workspace
#[derive(Error, Debug)]
pub enum ObjwatchError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid object id: {0}")]
    InvalidObjectId(String),
}
