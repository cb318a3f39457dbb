//! App Bridge session token (JWT) validation.
//!
//! An embedded app can skip the redirect flow entirely: App Bridge hands the
//! frontend a short-lived session token, which this service validates and
//! then exchanges for an access token.
//!
//! # Claims
//!
//! - `iss`: issuer, e.g. `https://shop.myshopify.com/admin`
//! - `dest`: destination shop, e.g. `https://shop.myshopify.com`
//! - `aud`: the app's API key
//! - `sub`: user ID (optional)
//! - `exp`, `nbf`, `iat`: validated with 10 seconds of leeway
//! - `jti`, `sid`: token and session identifiers
//!
//! Tokens are HS256-signed with the API secret. The previous secret is
//! tried when the current one fails, matching callback HMAC validation.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::auth::oauth::OAuthError;
use crate::config::{OnboardingConfig, ShopDomain};

const JWT_LEEWAY_SECS: u64 = 10;

/// Validated claims of a Shopify session token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwtPayload {
    /// Issuer.
    pub iss: String,
    /// Destination shop URL.
    pub dest: String,
    /// Audience; always equal to the app's API key after validation.
    pub aud: String,
    /// Subject (user ID), if any.
    pub sub: Option<String>,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// Not-before, unix seconds.
    pub nbf: i64,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Token ID.
    pub jti: String,
    /// Session ID, if any.
    pub sid: Option<String>,
}

// Verify JwtPayload is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<JwtPayload>();
};

impl JwtPayload {
    /// Decodes and validates a session token.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidSessionToken`] if the signature fails
    /// with every configured secret, a time claim is out of range, or `aud`
    /// is not the API key.
    pub fn decode(token: &str, config: &OnboardingConfig) -> Result<Self, OAuthError> {
        let payload = match Self::decode_with_key(token, config.api_secret_key().as_ref()) {
            Ok(payload) => payload,
            Err(primary_err) => config
                .old_api_secret_key()
                .and_then(|old| Self::decode_with_key(token, old.as_ref()).ok())
                .ok_or_else(|| OAuthError::InvalidSessionToken {
                    reason: format!("Error decoding session token: {primary_err}"),
                })?,
        };

        if payload.aud != config.api_key().as_ref() {
            return Err(OAuthError::InvalidSessionToken {
                reason: "Session token had invalid API key".to_string(),
            });
        }

        Ok(payload)
    }

    /// Decodes a session token and checks that it was issued for `shop`.
    ///
    /// # Errors
    ///
    /// As [`decode`](Self::decode), plus [`OAuthError::InvalidSessionToken`]
    /// if `dest` names a different shop.
    pub fn decode_for_shop(
        token: &str,
        config: &OnboardingConfig,
        shop: &ShopDomain,
    ) -> Result<Self, OAuthError> {
        let payload = Self::decode(token, config)?;
        if payload.shop() != shop.as_ref() {
            return Err(OAuthError::InvalidSessionToken {
                reason: format!("Session token was issued for '{}'", payload.shop()),
            });
        }
        Ok(payload)
    }

    fn decode_with_key(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = JWT_LEEWAY_SECS;
        validation.validate_nbf = true;
        // Audience is compared against the API key after decoding
        validation.validate_aud = false;

        let key = DecodingKey::from_secret(secret.as_bytes());
        Ok(decode::<Self>(token, &key, &validation)?.claims)
    }

    /// Returns the shop host from the `dest` claim.
    #[must_use]
    pub fn shop(&self) -> &str {
        self.dest
            .strip_prefix("https://")
            .unwrap_or(self.dest.as_str())
    }
}
