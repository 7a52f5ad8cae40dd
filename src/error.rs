//! Error types for dataset-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (auth, validation, resolution, persistence)
//! - A coarse [`ErrorKind`] taxonomy shared by every error
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::DatasetId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for dataset-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dataset-dl
///
/// Every failure is scoped to a single request; nothing here is fatal to the host process.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "recovery.storage_dir")
        key: Option<String>,
    },

    /// Bad or missing action token
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A required request field is missing or invalid
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Download resolution failed
    #[error("{0}")]
    Resolve(#[from] ResolveError),

    /// A usage store write failed
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The external identity service is not reachable or not configured
    #[error("identity service unavailable: {0}")]
    ExternalService(String),

    /// An HTTP collaborator answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Token verification failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was supplied
    #[error("missing token")]
    MissingToken,

    /// The token did not verify for the requested action
    #[error("invalid token")]
    InvalidToken,
}

/// Missing or malformed request input
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No user identifier was supplied
    #[error("no user ID provided")]
    MissingUser,

    /// A required field is absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Errors produced while resolving a dataset to a file location
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The dataset does not exist
    #[error("dataset {dataset_id} not found")]
    DatasetNotFound {
        /// Requested dataset
        dataset_id: DatasetId,
    },

    /// The dataset only carries a cached legacy URL, which is never served directly
    #[error("failed to get the file url for dataset {dataset_id}")]
    FailedToResolve {
        /// Requested dataset
        dataset_id: DatasetId,
    },

    /// No local file and no legacy origin to look the file up with
    #[error("dataset {dataset_id} has no local file and no legacy origin")]
    NoLegacyOrigin {
        /// Requested dataset
        dataset_id: DatasetId,
    },

    /// The legacy archive could not be reached or answered with garbage
    #[error("failed to get the original dataset {dataset_id} from the legacy archive: {reason}")]
    ArchiveUnavailable {
        /// Requested dataset
        dataset_id: DatasetId,
        /// Transport, status or parse failure description
        reason: String,
    },

    /// The legacy archive answered but carries no download URL
    #[error("the legacy archive has no media for dataset {dataset_id}")]
    ArchiveMediaMissing {
        /// Requested dataset
        dataset_id: DatasetId,
    },
}

/// Usage store write failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A counter (total or monthly bucket) could not be persisted
    #[error("unable to persist {counter} counter for dataset {dataset_id}: {reason}")]
    CounterPersist {
        /// Dataset whose counter failed
        dataset_id: DatasetId,
        /// Which counter ("total" or "monthly")
        counter: &'static str,
        /// Underlying failure
        reason: String,
    },

    /// The per-user history document could not be persisted
    #[error("unable to persist download history for user {user_id}: {reason}")]
    HistoryPersist {
        /// Owner of the history
        user_id: String,
        /// Underlying failure
        reason: String,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Coarse error taxonomy shared by every error in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing token
    Auth,
    /// Missing required field
    Validation,
    /// No resolvable file anywhere
    NotFound,
    /// Legacy archive or another remote collaborator failed
    Upstream,
    /// Store write failed
    Persistence,
    /// Anything else
    Internal,
}

impl Error {
    /// Classify this error into the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Resolve(ResolveError::DatasetNotFound { .. })
            | Error::Resolve(ResolveError::NoLegacyOrigin { .. })
            | Error::Resolve(ResolveError::FailedToResolve { .. })
            | Error::NotFound(_) => ErrorKind::NotFound,
            Error::Resolve(ResolveError::ArchiveUnavailable { .. })
            | Error::Resolve(ResolveError::ArchiveMediaMissing { .. })
            | Error::ExternalService(_)
            | Error::HttpStatus { .. }
            | Error::Network(_) => ErrorKind::Upstream,
            Error::Persistence(_) | Error::Database(_) | Error::Sqlx(_) => {
                ErrorKind::Persistence
            }
            Error::Config { .. }
            | Error::Io(_)
            | Error::ShuttingDown
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }
}

/// API error response format
///
/// Machine-readable error code, human-readable message and optional details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "archive_media_missing",
///     "message": "the legacy archive has no media for dataset 42",
///     "details": {
///       "dataset_id": 42
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "invalid_token", "missing_user")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Auth(AuthError::MissingToken) => 401,
            Error::Auth(AuthError::InvalidToken) => 403,

            Error::Validation(_) => 400,
            Error::Config { .. } => 400,

            Error::Resolve(ResolveError::DatasetNotFound { .. }) => 404,
            Error::Resolve(ResolveError::NoLegacyOrigin { .. }) => 404,
            Error::NotFound(_) => 404,

            // Cached legacy URL present: a data-integrity fault, not a client error
            Error::Resolve(ResolveError::FailedToResolve { .. }) => 500,

            Error::Resolve(ResolveError::ArchiveUnavailable { .. }) => 502,
            Error::Resolve(ResolveError::ArchiveMediaMissing { .. }) => 502,
            Error::HttpStatus { .. } => 502,
            Error::Network(_) => 502,

            Error::ExternalService(_) => 503,
            Error::ShuttingDown => 503,

            Error::Persistence(_) => 500,
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Auth(AuthError::MissingToken) => "missing_token",
            Error::Auth(AuthError::InvalidToken) => "invalid_token",
            Error::Validation(ValidationError::MissingUser) => "missing_user",
            Error::Validation(ValidationError::MissingField(_)) => "missing_field",
            Error::Resolve(e) => match e {
                ResolveError::DatasetNotFound { .. } => "dataset_not_found",
                ResolveError::FailedToResolve { .. } => "failed_to_resolve",
                ResolveError::NoLegacyOrigin { .. } => "no_legacy_origin",
                ResolveError::ArchiveUnavailable { .. } => "archive_unavailable",
                ResolveError::ArchiveMediaMissing { .. } => "archive_media_missing",
            },
            Error::Persistence(e) => match e {
                PersistenceError::CounterPersist { .. } => "counter_persist_error",
                PersistenceError::HistoryPersist { .. } => "history_persist_error",
            },
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::ExternalService(_) => "external_service_unavailable",
            Error::HttpStatus { .. } => "upstream_status",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<&Error> for ErrorDetail {
    fn from(error: &Error) -> Self {
        let details = match error {
            Error::Resolve(
                ResolveError::DatasetNotFound { dataset_id }
                | ResolveError::FailedToResolve { dataset_id }
                | ResolveError::NoLegacyOrigin { dataset_id }
                | ResolveError::ArchiveMediaMissing { dataset_id },
            ) => Some(serde_json::json!({ "dataset_id": dataset_id })),
            Error::Resolve(ResolveError::ArchiveUnavailable { dataset_id, reason }) => {
                Some(serde_json::json!({
                    "dataset_id": dataset_id,
                    "reason": reason,
                }))
            }
            Error::Persistence(PersistenceError::CounterPersist {
                dataset_id,
                counter,
                ..
            }) => Some(serde_json::json!({
                "dataset_id": dataset_id,
                "counter": counter,
            })),
            Error::Persistence(PersistenceError::HistoryPersist { user_id, .. }) => {
                Some(serde_json::json!({ "user_id": user_id }))
            }
            Error::Validation(ValidationError::MissingField(field)) => {
                Some(serde_json::json!({ "field": field }))
            }
            Error::HttpStatus { url, status } => Some(serde_json::json!({
                "url": url,
                "status": status,
            })),
            _ => None,
        };

        ErrorDetail {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError {
            error: ErrorDetail::from(&error),
        }
    }
}
