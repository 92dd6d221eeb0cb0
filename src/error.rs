use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    TooLong(String),

    #[error("Invalid key name: {0}")]
    ReservedName(String),

    #[error("{0}")]
    InvalidType(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("You must be an admin.")]
    PermissionDenied,

    #[error("Access Denied.")]
    Unauthorized,

    #[error("Record was modified concurrently, retry the operation")]
    ConcurrentModification,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A multi-key batch reported errors after some commands may have applied.
    #[error("Batch partially failed, record may be inconsistent: {0}")]
    BatchFailed(String),

    #[error("Stored record is corrupt: {0}")]
    CorruptRecord(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl AppError {
    /// True when the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentModification)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidFormat(_)
            | AppError::TooLong(_)
            | AppError::ReservedName(_)
            | AppError::InvalidType(_)
            | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) | AppError::ConcurrentModification => StatusCode::CONFLICT,
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BatchFailed(_)
            | AppError::CorruptRecord(_)
            | AppError::Backend(_)
            | AppError::PasswordHash(_)
            | AppError::TaskJoin(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Extractor rejections become 400s carrying axum's explanation

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

/// Implement IntoResponse to convert AppError into the response envelope
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status.is_server_error() {
            tracing::error!("{}: {:?}", status, self);
            match self {
                AppError::BackendUnavailable(_) | AppError::BatchFailed(_) => self.to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            tracing::warn!("Request rejected ({}): {}", status, self);
            self.to_string()
        };

        let body = Json(json!({
            "success": "false",
            "message": message,
            "data": {}
        }));

        if status == StatusCode::UNAUTHORIZED {
            return (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"bsapi\"")],
                body,
            )
                .into_response();
        }

        (status, body).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
