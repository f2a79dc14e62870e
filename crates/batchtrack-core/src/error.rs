//! Error types for the batch tracking core

use thiserror::Error;

/// Main error type for all batch tracking operations
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Audit logging failed: {0}")]
    Logging(String),
}

/// Result type for batch tracking operations
pub type Result<T> = std::result::Result<T, TrackError>;
