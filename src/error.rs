use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::cache::CacheError;
use crate::db::repository::StoreError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("parameters required")]
    ParamsRequired,

    #[error("bad format: {0}")]
    BadFormat(String),

    #[error("post text too long")]
    TooLong,

    #[error("not found")]
    NotFound,

    #[error("resource duplicated")]
    Duplicate,

    #[error("invalid jwt token")]
    Unauthorized,

    #[error("login failed")]
    LoginFailed,

    #[error("account suspended")]
    Suspended,

    #[error("forbidden")]
    Forbidden,

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The write committed but the cached snapshot could not be refreshed.
    #[error("Stale cache entry {key}: {source}")]
    StaleCache { key: String, source: BoxError },

    /// The first half of a two-sided edge update landed and the second did not.
    #[error("{operation} incomplete (compensated: {compensated}): {source}")]
    GraphConsistency {
        operation: &'static str,
        compensated: bool,
        source: StoreError,
    },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound,
            StoreError::Duplicate(_) => AppError::Duplicate,
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let internal = "internal server error".to_string();
        let (status, message) = match &self {
            AppError::ParamsRequired
            | AppError::NotFound
            | AppError::Duplicate
            | AppError::Unauthorized
            | AppError::LoginFailed
            | AppError::Suspended
            | AppError::Forbidden
            | AppError::TooLong => (self.status(), self.to_string()),
            AppError::BadFormat(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Cache(e) => {
                tracing::error!("Cache error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, internal)
            }
            AppError::StaleCache { key, source } => {
                tracing::error!(key = %key, "Cache refresh failed after write: {}", source);
                (StatusCode::INTERNAL_SERVER_ERROR, internal)
            }
            AppError::GraphConsistency {
                operation,
                compensated,
                source,
            } => {
                tracing::error!(
                    operation = *operation,
                    compensated = *compensated,
                    "Relationship update incomplete: {}",
                    source
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "relationship update incomplete".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, internal)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, internal)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, internal)
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ParamsRequired | AppError::BadFormat(_) => StatusCode::BAD_REQUEST,
            AppError::TooLong => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Duplicate => StatusCode::CONFLICT,
            AppError::Unauthorized | AppError::LoginFailed => StatusCode::UNAUTHORIZED,
            AppError::Suspended | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Cache(_)
            | AppError::StaleCache { .. }
            | AppError::GraphConsistency { .. }
            | AppError::Store(_)
            | AppError::Json(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
