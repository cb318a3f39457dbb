//! Signed, time-boxed OAuth state tokens.
//!
//! The state parameter is round-tripped through Shopify's authorize redirect.
//! It carries the conversation that started the flow and proves, through an
//! HMAC-SHA256 signature, that this service issued it recently. Nothing is
//! stored server-side.
//!
//! # Format
//!
//! ```text
//! base64url(JSON {conversation_id, issued_at, nonce}) "." hex(HMAC-SHA256(payload))
//! ```
//!
//! The base64url payload has no padding, so the token contains only
//! URL-safe characters plus the separating `.`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use shopify_onboarding::auth::oauth::StateTokenCodec;
//! use shopify_onboarding::StateSecret;
//!
//! let secret = StateSecret::new("0123456789abcdef0123456789abcdef").unwrap();
//! let codec = StateTokenCodec::new(secret, Duration::from_secs(300));
//!
//! let state = codec.encode("conv-42");
//! let claims = codec.decode(&state).unwrap();
//! assert_eq!(claims.conversation_id, "conv-42");
//! ```

use std::time::Duration;

use base64::prelude::*;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::oauth::hmac::{compute_signature, constant_time_compare};
use crate::config::StateSecret;

/// Tokens issued up to this far in the future are still accepted.
const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Errors returned when decoding a state token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The signature does not match the payload.
    #[error("State signature is invalid")]
    InvalidSignature,

    /// The token is outside its validity window.
    #[error("State expired ({age_secs}s old)")]
    Expired {
        /// Token age in seconds at decode time. Negative when the token was
        /// issued in the future.
        age_secs: i64,
    },

    /// The token could not be split or its payload could not be parsed.
    #[error("Malformed state: {reason}")]
    Malformed {
        /// What was wrong with the token.
        reason: String,
    },
}

/// The signed contents of a state token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    /// The conversation that started the OAuth flow.
    pub conversation_id: String,
    /// When the token was issued, serialized as unix seconds.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    /// Random 15-character alphanumeric value, so two tokens for the same
    /// conversation in the same second differ.
    pub nonce: String,
}

/// Encodes and decodes signed state tokens.
///
/// `StateTokenCodec` holds only the secret and the validity window; it is
/// cheap to clone and safe to share across tasks.
#[derive(Clone, Debug)]
pub struct StateTokenCodec {
    secret: StateSecret,
    ttl: Duration,
}

// Verify StateTokenCodec is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<StateTokenCodec>();
};

impl StateTokenCodec {
    const NONCE_LENGTH: usize = 15;

    /// Creates a codec with the given signing secret and validity window.
    #[must_use]
    pub const fn new(secret: StateSecret, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    /// Returns the validity window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a state token for `conversation_id`, stamped with the current time.
    #[must_use]
    pub fn encode(&self, conversation_id: &str) -> String {
        self.encode_at(conversation_id, Utc::now())
    }

    /// Issues a state token stamped with `now`.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // String and timestamp fields only, so serialization never fails
    pub fn encode_at(&self, conversation_id: &str, now: DateTime<Utc>) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::NONCE_LENGTH)
            .map(char::from)
            .collect();

        let claims = StateClaims {
            conversation_id: conversation_id.to_string(),
            issued_at: now,
            nonce,
        };
        let json = serde_json::to_vec(&claims).expect("state claims serialize to JSON");
        let payload = BASE64_URL_SAFE_NO_PAD.encode(json);
        let signature = compute_signature(&payload, self.secret.as_ref());

        format!("{payload}.{signature}")
    }

    /// Verifies and decodes a state token against the current time.
    ///
    /// # Errors
    ///
    /// See [`decode_at`](Self::decode_at).
    pub fn decode(&self, state: &str) -> Result<StateClaims, StateError> {
        self.decode_at(state, Utc::now())
    }

    /// Verifies and decodes a state token as of `now`.
    ///
    /// The signature is checked before the payload is parsed, so a forged
    /// payload reports [`StateError::InvalidSignature`] rather than
    /// [`StateError::Malformed`].
    ///
    /// # Errors
    ///
    /// - [`StateError::Malformed`] if there is no `.` separator or the
    ///   payload is not base64url JSON
    /// - [`StateError::InvalidSignature`] if the signature does not match
    /// - [`StateError::Expired`] if the token is older than the window, or
    ///   was issued more than 30 seconds after `now`. The 30 second skew
    ///   allowance is fixed and independent of the window.
    pub fn decode_at(&self, state: &str, now: DateTime<Utc>) -> Result<StateClaims, StateError> {
        let (payload, signature) = state.rsplit_once('.').ok_or_else(|| StateError::Malformed {
            reason: "missing signature separator".to_string(),
        })?;

        let expected = compute_signature(payload, self.secret.as_ref());
        if !constant_time_compare(&expected, signature) {
            return Err(StateError::InvalidSignature);
        }

        let json = BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| StateError::Malformed {
                reason: format!("payload is not base64url: {e}"),
            })?;
        let claims: StateClaims =
            serde_json::from_slice(&json).map_err(|e| StateError::Malformed {
                reason: format!("payload is not valid JSON: {e}"),
            })?;

        let age_secs = (now - claims.issued_at).num_seconds();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        if age_secs > ttl_secs || age_secs < -MAX_CLOCK_SKEW_SECS {
            return Err(StateError::Expired { age_secs });
        }

        Ok(claims)
    }
}
