//! Error responses for the JSON endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::auth::oauth::OAuthError;

/// Error type for route handlers.
///
/// The callback route never produces one of these; it always redirects.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The OAuth flow failed.
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller did not present a usable session token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::OAuth(err) => match err {
                OAuthError::InvalidSignature | OAuthError::InvalidSessionToken { .. } => {
                    StatusCode::UNAUTHORIZED
                }
                OAuthError::InvalidState(_) | OAuthError::Malformed { .. } => {
                    StatusCode::BAD_REQUEST
                }
                OAuthError::ExchangeFailed { .. } | OAuthError::NetworkError { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                OAuthError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::OAuth(err) => match err {
                OAuthError::InvalidSessionToken { .. } => "Invalid session token".to_string(),
                OAuthError::Malformed { reason } => reason.clone(),
                OAuthError::ExchangeFailed { .. } | OAuthError::NetworkError { .. } => {
                    "Token exchange failed".to_string()
                }
                OAuthError::StorageUnavailable(_) => "Storage unavailable".to_string(),
                OAuthError::InvalidSignature => "Invalid signature".to_string(),
                OAuthError::InvalidState(_) => "Invalid state".to_string(),
            },
            Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(_) | Self::Unauthorized(_) | Self::BadRequest(_) => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "retryable": matches!(&self, Self::OAuth(err) if err.is_retryable()),
        });
        (status, Json(body)).into_response()
    }
}
