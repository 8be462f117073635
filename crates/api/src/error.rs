use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use model::ModelError;
use serde_json::json;
use storage::StoreError;
use tracing::{error, info};
use venue_binance::VenueError;

pub const REDACTED_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Transient store failure that outlived the retry budget.
    #[error("{0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::StoreUnavailable(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => ApiError::StoreUnavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<VenueError> for ApiError {
    fn from(err: VenueError) -> Self {
        match err {
            VenueError::OutOfRange(msg) => ApiError::Validation(msg),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

/// Rendered `{success:false, error}` envelope.
#[derive(Debug)]
pub struct ErrorReply {
    status: StatusCode,
    message: String,
}

impl ErrorReply {
    /// In hardened mode server-side failures never echo internal detail.
    pub fn new(err: ApiError, hardened: bool) -> Self {
        let status = err.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %err, "request failed");
        } else {
            info!(status = status.as_u16(), error = %err, "request rejected");
        }
        let message = if hardened && status.is_server_error() {
            REDACTED_MESSAGE.to_string()
        } else {
            err.to_string()
        };
        Self { status, message }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}
