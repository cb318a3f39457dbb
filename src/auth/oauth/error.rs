//! Error types for the OAuth onboarding flow.
//!
//! Each layer has its own error: [`StateError`](super::StateError) from the
//! state codec, [`ExchangeError`](super::ExchangeError) from the token
//! endpoint, and [`StoreError`](crate::merchant::StoreError) from the
//! merchant store. They fold into [`OAuthError`], which the callback handler
//! maps to one of four public [`FailureReason`] codes.
//!
//! # Example
//!
//! ```rust
//! use shopify_onboarding::auth::oauth::{FailureReason, OAuthError, StateError};
//!
//! let error: OAuthError = StateError::InvalidSignature.into();
//! assert_eq!(error.failure_reason(), FailureReason::InvalidState);
//! assert_eq!(error.failure_reason().as_str(), "invalid_state");
//! assert!(!error.is_retryable());
//! ```

use std::fmt;

use thiserror::Error;

use crate::auth::oauth::{ExchangeError, StateError};
use crate::merchant::StoreError;

/// Errors that end an OAuth flow.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The callback's `hmac` parameter is missing or does not match.
    ///
    /// Possible forgery; never retried.
    #[error("HMAC signature validation failed")]
    InvalidSignature,

    /// The state parameter is missing, unsigned, malformed or expired.
    ///
    /// Possible replay or CSRF; never retried.
    #[error("Invalid state: {0}")]
    InvalidState(#[from] StateError),

    /// Shopify rejected the authorization code or session token.
    #[error("Token exchange failed with status {status}: {message}")]
    ExchangeFailed {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Response body or parse failure, for server-side logs only.
        message: String,
    },

    /// The token endpoint could not be reached or timed out.
    #[error("Network error during token exchange: {message}")]
    NetworkError {
        /// Underlying transport error.
        message: String,
    },

    /// The merchant store failed or timed out.
    #[error(transparent)]
    StorageUnavailable(#[from] StoreError),

    /// A required request parameter is missing or unparseable.
    #[error("Malformed request: {reason}")]
    Malformed {
        /// What was wrong with the input.
        reason: String,
    },

    /// An App Bridge session token failed validation.
    #[error("Invalid session token: {reason}")]
    InvalidSessionToken {
        /// Why the token was rejected.
        reason: String,
    },
}

// Verify OAuthError is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OAuthError>();
};

impl OAuthError {
    /// Maps this error to the code placed in the frontend redirect.
    #[must_use]
    pub const fn failure_reason(&self) -> FailureReason {
        match self {
            Self::InvalidSignature => FailureReason::InvalidHmac,
            Self::InvalidState(_) => FailureReason::InvalidState,
            Self::ExchangeFailed { .. }
            | Self::NetworkError { .. }
            | Self::Malformed { .. }
            | Self::InvalidSessionToken { .. } => FailureReason::ExchangeFailed,
            Self::StorageUnavailable(_) => FailureReason::StorageUnavailable,
        }
    }

    /// Returns `true` if repeating the same request might succeed.
    ///
    /// Only transport and storage failures qualify. Nothing in this crate
    /// retries automatically; this is a hint for the client.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError { .. } | Self::StorageUnavailable(_))
    }
}

impl From<ExchangeError> for OAuthError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::ExchangeFailed { status, body } => Self::ExchangeFailed {
                status,
                message: body,
            },
            ExchangeError::Network { message } => Self::NetworkError { message },
            ExchangeError::InvalidSubjectToken => Self::InvalidSessionToken {
                reason: "Session token was rejected by token exchange".to_string(),
            },
        }
    }
}

/// Public error codes carried in the `error` redirect parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// `invalid_hmac`
    InvalidHmac,
    /// `invalid_state`
    InvalidState,
    /// `exchange_failed`
    ExchangeFailed,
    /// `storage_unavailable`
    StorageUnavailable,
}

impl FailureReason {
    /// Returns the wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidHmac => "invalid_hmac",
            Self::InvalidState => "invalid_state",
            Self::ExchangeFailed => "exchange_failed",
            Self::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
