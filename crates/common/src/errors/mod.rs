//! Error types for catalog prep
//!
//! Provides:
//! - Distinct error types for configuration, credential, storage and warehouse failures
//! - Machine-readable error codes for structured logging
//! - Fatality classification for the batch runner

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    ConfigurationError,
    ValidationError,

    // Credential errors (2xxx)
    AuthError,

    // Object storage errors (3xxx)
    StorageError,

    // Warehouse errors (4xxx)
    WarehouseError,
    LoadJobFailed,
    LoadJobTimeout,

    // Transport errors (8xxx)
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ConfigurationError => 1001,
            ErrorCode::ValidationError => 1002,

            ErrorCode::AuthError => 2001,

            ErrorCode::StorageError => 3001,

            ErrorCode::WarehouseError => 4001,
            ErrorCode::LoadJobFailed => 4002,
            ErrorCode::LoadJobTimeout => 4003,

            ErrorCode::UpstreamError => 8001,

            ErrorCode::InternalError => 9001,
            ErrorCode::SerializationError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // Credential errors
    #[error("Credential error: {message}")]
    Auth { message: String },

    // Object storage errors
    #[error("Storage error for {key}: {message}")]
    Storage { key: String, message: String },

    // Warehouse errors
    #[error("Warehouse error: {message}")]
    Warehouse { message: String },

    #[error("Load job {job_id} failed: {message}")]
    LoadJobFailed { job_id: String, message: String },

    #[error("Load job {job_id} not done after {timeout_secs}s")]
    LoadJobTimeout { job_id: String, timeout_secs: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Auth { .. } => ErrorCode::AuthError,
            AppError::Storage { .. } => ErrorCode::StorageError,
            AppError::Warehouse { .. } => ErrorCode::WarehouseError,
            AppError::LoadJobFailed { .. } => ErrorCode::LoadJobFailed,
            AppError::LoadJobTimeout { .. } => ErrorCode::LoadJobTimeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Whether the error only affects a single record.
    ///
    /// Object storage failures are per-record: the row is kept with a null
    /// image reference. Everything else aborts the batch.
    pub fn is_record_scoped(&self) -> bool {
        matches!(self, AppError::Storage { .. })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation {
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Auth {
            message: format!("Failed to sign token assertion: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::LoadJobFailed {
            job_id: "job_1".into(),
            message: "invalid row".into(),
        };
        assert_eq!(err.code(), ErrorCode::LoadJobFailed);
        assert_eq!(err.code().as_code(), 4002);
        assert!(!err.is_record_scoped());
    }

    #[test]
    fn test_storage_error_is_record_scoped() {
        let err = AppError::Storage {
            key: "products/a.jpg".into(),
            message: "403 Forbidden".into(),
        };
        assert!(err.is_record_scoped());
        assert_eq!(err.to_string(), "Storage error for products/a.jpg: 403 Forbidden");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: AppError = config::ConfigError::NotFound("gcp.project_id".into()).into();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }
}
