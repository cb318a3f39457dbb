//! OAuth authorization URL generation.
//!
//! [`begin_auth`] is the first step of the authorization code flow: it
//! issues a signed state token carrying the conversation ID and builds the
//! Shopify authorize URL the browser is redirected to. Shopify later calls
//! back with the same state, which the callback handler verifies.
//!
//! # Example
//!
//! ```rust
//! use shopify_onboarding::auth::oauth::{begin_auth, StateTokenCodec};
//! use shopify_onboarding::{ApiKey, ApiSecretKey, HostUrl, OnboardingConfig, ShopDomain, StateSecret};
//!
//! let config = OnboardingConfig::builder()
//!     .api_key(ApiKey::new("your-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("your-secret").unwrap())
//!     .state_secret(StateSecret::new("0123456789abcdef0123456789abcdef").unwrap())
//!     .app_url(HostUrl::new("https://auth.example.com").unwrap())
//!     .frontend_url(HostUrl::new("https://chat.example.com").unwrap())
//!     .scopes("read_products".parse().unwrap())
//!     .build()
//!     .unwrap();
//! let codec = StateTokenCodec::new(config.state_secret().clone(), config.state_ttl());
//!
//! let shop = ShopDomain::new("example-shop").unwrap();
//! let result = begin_auth(&config, &codec, &shop, "conv-1", false);
//!
//! assert!(result
//!     .auth_url
//!     .starts_with("https://example-shop.myshopify.com/admin/oauth/authorize?"));
//! assert_eq!(codec.decode(&result.state).unwrap().conversation_id, "conv-1");
//! ```

use crate::auth::oauth::StateTokenCodec;
use crate::config::{OnboardingConfig, ShopDomain};

/// The authorize URL and the state token embedded in it.
#[derive(Clone, Debug)]
pub struct BeginAuthResult {
    /// Where to redirect the merchant's browser.
    pub auth_url: String,
    /// The signed state token, already included in `auth_url`.
    pub state: String,
}

// Verify BeginAuthResult is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<BeginAuthResult>();
};

/// Builds the Shopify authorize URL for `shop`.
///
/// The URL carries `client_id`, `scope`, `redirect_uri` and `state`, plus
/// `grant_options[]=per-user` when `is_online` requests a user-scoped token.
/// Every key and value is percent-encoded.
#[must_use]
pub fn begin_auth(
    config: &OnboardingConfig,
    codec: &StateTokenCodec,
    shop: &ShopDomain,
    conversation_id: &str,
    is_online: bool,
) -> BeginAuthResult {
    let state = codec.encode(conversation_id);

    let mut params = vec![
        ("client_id", config.api_key().as_ref().to_string()),
        ("scope", config.scopes().to_string()),
        ("redirect_uri", config.redirect_uri()),
        ("state", state.clone()),
    ];
    if is_online {
        params.push(("grant_options[]", "per-user".to_string()));
    }

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let auth_url = format!("https://{shop}/admin/oauth/authorize?{query_string}");

    BeginAuthResult { auth_url, state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, ApiSecretKey, HostUrl, StateSecret};

    fn config() -> OnboardingConfig {
        OnboardingConfig::builder()
            .api_key(ApiKey::new("test-api-key").unwrap())
            .api_secret_key(ApiSecretKey::new("test-secret").unwrap())
            .state_secret(StateSecret::new("0123456789abcdef0123456789abcdef").unwrap())
            .app_url(HostUrl::new("https://myapp.example.com").unwrap())
            .frontend_url(HostUrl::new("https://chat.example.com").unwrap())
            .scopes("read_products,write_orders".parse().unwrap())
            .build()
            .unwrap()
    }

    fn codec(config: &OnboardingConfig) -> StateTokenCodec {
        StateTokenCodec::new(config.state_secret().clone(), config.state_ttl())
    }

    fn shop() -> ShopDomain {
        ShopDomain::new("test-shop").unwrap()
    }

    #[test]
    fn test_url_includes_all_required_params() {
        let config = config();
        let result = begin_auth(&config, &codec(&config), &shop(), "conv-1", false);

        assert!(result
            .auth_url
            .starts_with("https://test-shop.myshopify.com/admin/oauth/authorize?"));
        assert!(result.auth_url.contains("client_id=test-api-key"));
        assert!(result
            .auth_url
            .contains("scope=read_orders%2Cread_products%2Cwrite_orders"));
        assert!(result
            .auth_url
            .contains("redirect_uri=https%3A%2F%2Fmyapp.example.com%2Foauth%2Fcallback"));
        assert!(result.auth_url.contains(&format!("state={}", result.state)));
        assert!(!result.auth_url.contains("grant_options"));
    }

    #[test]
    fn test_online_adds_per_user_grant_option() {
        let config = config();
        let result = begin_auth(&config, &codec(&config), &shop(), "conv-1", true);
        assert!(result
            .auth_url
            .contains("grant_options%5B%5D=per-user"));
    }

    #[test]
    fn test_state_carries_conversation_id() {
        let config = config();
        let codec = codec(&config);
        let result = begin_auth(&config, &codec, &shop(), "conv & co", false);
        assert_eq!(codec.decode(&result.state).unwrap().conversation_id, "conv & co");
    }

    #[test]
    fn test_each_call_issues_a_fresh_state() {
        let config = config();
        let codec = codec(&config);
        let a = begin_auth(&config, &codec, &shop(), "c", false);
        let b = begin_auth(&config, &codec, &shop(), "c", false);
        assert_ne!(a.state, b.state);
    }
}
