//! HTTP error mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};
use ferrocd_services::Error;

/// Errors surfaced by handlers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    /// No subscription slot or the transport is down.
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotAuthorized { .. } => ApiError::Forbidden(err.to_string()),
            Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            Error::Conflict(msg) => ApiError::Conflict(msg.clone()),
            Error::Transport(msg) => ApiError::Unavailable(msg.clone()),
            _ => ApiError::Internal(err),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
