//! HMAC-SHA256 signing and verification.
//!
//! Shopify signs every OAuth callback query string with the app's API secret.
//! The same primitive signs the state tokens this service issues, so both
//! paths share [`compute_signature`] and [`constant_time_compare`].
//!
//! # Security
//!
//! All signature comparisons are constant-time. Callback validation falls
//! back to the previous API secret when one is configured, so callbacks
//! signed just before a key rotation still validate.
//!
//! # Example
//!
//! ```rust
//! use shopify_onboarding::auth::oauth::hmac::compute_signature;
//!
//! let message = "code=abc123&shop=example.myshopify.com&timestamp=1700000000";
//! let signature = compute_signature(message, "my-api-secret");
//! assert_eq!(signature.len(), 64);
//! assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::auth::oauth::CallbackQuery;
use crate::config::OnboardingConfig;

type HmacSha256 = Hmac<Sha256>;

/// Computes an HMAC-SHA256 signature, returned as lowercase hex.
///
/// This is the format Shopify uses for the `hmac` callback parameter.
///
/// # Example
///
/// ```rust
/// use shopify_onboarding::auth::oauth::hmac::compute_signature;
///
/// let sig = compute_signature("test-message", "secret-key");
/// assert_eq!(sig.len(), 64);
/// ```
#[must_use]
#[allow(clippy::missing_panics_doc)] // HMAC accepts any key size, so this never panics
pub fn compute_signature(message: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Compares two strings in constant time.
///
/// Strings of different lengths compare unequal without leaking where they
/// differ.
#[must_use]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Validates the `hmac` parameter of an OAuth callback.
///
/// Returns `false` when the parameter is missing. The primary API secret is
/// tried first, then the previous secret if one is configured.
///
/// # Example
///
/// ```rust
/// use shopify_onboarding::auth::oauth::{hmac, CallbackQuery};
/// use shopify_onboarding::{ApiKey, ApiSecretKey, HostUrl, OnboardingConfig, StateSecret};
///
/// let config = OnboardingConfig::builder()
///     .api_key(ApiKey::new("key").unwrap())
///     .api_secret_key(ApiSecretKey::new("secret").unwrap())
///     .state_secret(StateSecret::new("0123456789abcdef0123456789abcdef").unwrap())
///     .app_url(HostUrl::new("https://auth.example.com").unwrap())
///     .frontend_url(HostUrl::new("https://chat.example.com").unwrap())
///     .build()
///     .unwrap();
///
/// let mut query = CallbackQuery::from_pairs([("code", "abc"), ("shop", "s.myshopify.com")]);
/// let signature = hmac::compute_signature(&query.to_signable_string(), "secret");
/// query.insert("hmac", signature);
///
/// assert!(hmac::validate_hmac(&query, &config));
/// ```
#[must_use]
pub fn validate_hmac(query: &CallbackQuery, config: &OnboardingConfig) -> bool {
    let Some(received) = query.hmac() else {
        return false;
    };
    let signable = query.to_signable_string();

    let computed = compute_signature(&signable, config.api_secret_key().as_ref());
    if constant_time_compare(&computed, received) {
        return true;
    }

    config.old_api_secret_key().is_some_and(|old_secret| {
        let computed_old = compute_signature(&signable, old_secret.as_ref());
        constant_time_compare(&computed_old, received)
    })
}
