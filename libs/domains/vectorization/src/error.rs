use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;

use crate::models::Namespace;

#[derive(Debug, Error)]
pub enum VectorizationError {
    #[error("Projection failed for record {record_id} in '{namespace}': {reason}")]
    Projection {
        record_id: i64,
        namespace: Namespace,
        reason: String,
    },

    /// Provider failed permanently or ran out of retries
    #[error("Embedding provider unavailable after {attempts} attempt(s): {message}")]
    EmbeddingUnavailable { attempts: u32, message: String },

    /// Single provider call failure, classified for the retry loop
    #[error("Embedding provider error: {message}")]
    EmbeddingProvider { message: String, transient: bool },

    #[error("Input of ~{tokens} tokens exceeds the limit of {limit}")]
    InputTooLong { tokens: usize, limit: usize },

    #[error("Vector index error: {0}")]
    IndexStore(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Sync already in progress for namespace '{0}'")]
    SyncInProgress(Namespace),

    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Record source error: {0}")]
    Source(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type VectorizationResult<T> = Result<T, VectorizationError>;

impl VectorizationError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            VectorizationError::EmbeddingProvider { transient, .. } => *transient,
            VectorizationError::Timeout { .. } | VectorizationError::IndexStore(_) => true,
            _ => false,
        }
    }

    pub fn timeout(operation: &'static str, timeout: std::time::Duration) -> Self {
        VectorizationError::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

/// Run `future` under `timeout`, mapping expiry to [`VectorizationError::Timeout`]
pub(crate) async fn with_timeout<T>(
    operation: &'static str,
    timeout: std::time::Duration,
    future: impl std::future::Future<Output = VectorizationResult<T>>,
) -> VectorizationResult<T> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| VectorizationError::timeout(operation, timeout))?
}

impl From<qdrant_client::QdrantError> for VectorizationError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        VectorizationError::IndexStore(err.to_string())
    }
}

impl From<reqwest::Error> for VectorizationError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect() || err.is_request();
        VectorizationError::EmbeddingProvider {
            message: err.to_string(),
            transient,
        }
    }
}

impl From<sea_orm::DbErr> for VectorizationError {
    fn from(err: sea_orm::DbErr) -> Self {
        VectorizationError::Source(err.to_string())
    }
}

impl From<database::DatabaseError> for VectorizationError {
    fn from(err: database::DatabaseError) -> Self {
        VectorizationError::Source(err.to_string())
    }
}

impl From<std::io::Error> for VectorizationError {
    fn from(err: std::io::Error) -> Self {
        VectorizationError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for VectorizationError {
    fn from(err: serde_json::Error) -> Self {
        VectorizationError::Storage(format!("JSON error: {err}"))
    }
}

impl From<core_config::ConfigError> for VectorizationError {
    fn from(err: core_config::ConfigError) -> Self {
        VectorizationError::Config(err.to_string())
    }
}

/// Convert to AppError for standardized HTTP error responses
impl From<VectorizationError> for AppError {
    fn from(err: VectorizationError) -> Self {
        match err {
            VectorizationError::InvalidQuery(msg) => AppError::Validation {
                message: msg,
                details: None,
            },
            VectorizationError::Projection { .. } | VectorizationError::InputTooLong { .. } => {
                AppError::UnprocessableEntity(err.to_string())
            }
            VectorizationError::SyncInProgress(_) => AppError::Conflict(err.to_string()),
            VectorizationError::EmbeddingUnavailable { .. }
            | VectorizationError::EmbeddingProvider { .. }
            | VectorizationError::SearchUnavailable(_)
            | VectorizationError::Source(_) => AppError::ServiceUnavailable(err.to_string()),
            VectorizationError::Timeout { .. } => AppError::GatewayTimeout(err.to_string()),
            VectorizationError::IndexStore(_)
            | VectorizationError::Storage(_)
            | VectorizationError::Config(_)
            | VectorizationError::Internal(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl IntoResponse for VectorizationError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
