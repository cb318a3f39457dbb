//! Configuration types for the onboarding service.
//!
//! # Overview
//!
//! - [`OnboardingConfig`]: everything the OAuth flow needs (credentials,
//!   signing secrets, URLs, timeouts)
//! - [`OnboardingConfigBuilder`]: a builder for [`OnboardingConfig`]
//! - [`ServerConfig`]: the binary's environment-driven configuration
//! - Validated newtypes: [`ApiKey`], [`ApiSecretKey`], [`StateSecret`],
//!   [`ShopDomain`], [`HostUrl`]
//!
//! # Example
//!
//! ```rust
//! use shopify_onboarding::{OnboardingConfig, ApiKey, ApiSecretKey, StateSecret, HostUrl};
//!
//! let config = OnboardingConfig::builder()
//!     .api_key(ApiKey::new("my-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("my-secret").unwrap())
//!     .state_secret(StateSecret::new("0123456789abcdef0123456789abcdef").unwrap())
//!     .app_url(HostUrl::new("https://auth.example.com").unwrap())
//!     .frontend_url(HostUrl::new("https://chat.example.com").unwrap())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.state_ttl().as_secs(), 300);
//! ```

mod env;
mod newtypes;

pub use env::{LogFormat, ServerConfig};
pub use newtypes::{ApiKey, ApiSecretKey, HostUrl, ShopDomain, StateSecret};

use std::time::Duration;

use crate::auth::AuthScopes;
use crate::error::ConfigError;

/// Default lifetime of an OAuth state token.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default bound on outbound HTTP and storage calls.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Default path Shopify redirects back to.
pub const DEFAULT_CALLBACK_PATH: &str = "/oauth/callback";

/// Configuration for the OAuth onboarding flow.
///
/// # Key Rotation
///
/// `old_api_secret_key` lets callbacks and session tokens signed with the
/// previous Shopify secret validate while a rotation is in flight.
#[derive(Clone, Debug)]
pub struct OnboardingConfig {
    api_key: ApiKey,
    api_secret_key: ApiSecretKey,
    old_api_secret_key: Option<ApiSecretKey>,
    state_secret: StateSecret,
    scopes: AuthScopes,
    app_url: HostUrl,
    frontend_url: HostUrl,
    callback_path: String,
    state_ttl: Duration,
    http_timeout: Duration,
    store_timeout: Duration,
    merchant_ttl: Option<Duration>,
    token_endpoint_base: Option<HostUrl>,
}

impl OnboardingConfig {
    /// Creates a new builder for constructing an `OnboardingConfig`.
    #[must_use]
    pub fn builder() -> OnboardingConfigBuilder {
        OnboardingConfigBuilder::new()
    }

    /// Returns the API key.
    #[must_use]
    pub const fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the API secret key.
    #[must_use]
    pub const fn api_secret_key(&self) -> &ApiSecretKey {
        &self.api_secret_key
    }

    /// Returns the previous API secret key, if a rotation is in progress.
    #[must_use]
    pub const fn old_api_secret_key(&self) -> Option<&ApiSecretKey> {
        self.old_api_secret_key.as_ref()
    }

    /// Returns the state signing secret.
    #[must_use]
    pub const fn state_secret(&self) -> &StateSecret {
        &self.state_secret
    }

    /// Returns the OAuth scopes requested at install time.
    #[must_use]
    pub const fn scopes(&self) -> &AuthScopes {
        &self.scopes
    }

    /// Returns the public base URL of this service.
    #[must_use]
    pub const fn app_url(&self) -> &HostUrl {
        &self.app_url
    }

    /// Returns the frontend URL the browser is sent back to.
    #[must_use]
    pub const fn frontend_url(&self) -> &HostUrl {
        &self.frontend_url
    }

    /// Returns the callback path registered with Shopify.
    #[must_use]
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    /// Returns the absolute `redirect_uri` sent to Shopify.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.app_url.trimmed(), self.callback_path)
    }

    /// Returns how long an issued state token stays valid.
    #[must_use]
    pub const fn state_ttl(&self) -> Duration {
        self.state_ttl
    }

    /// Returns the timeout applied to token exchange requests.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Returns the timeout applied to merchant store calls.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Returns the merchant record TTL, refreshed on every write.
    #[must_use]
    pub const fn merchant_ttl(&self) -> Option<Duration> {
        self.merchant_ttl
    }

    /// Returns the token endpoint base override, if any.
    ///
    /// When unset, tokens are exchanged against `https://{shop}`.
    #[must_use]
    pub const fn token_endpoint_base(&self) -> Option<&HostUrl> {
        self.token_endpoint_base.as_ref()
    }
}

// Verify OnboardingConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OnboardingConfig>();
};

/// Builder for [`OnboardingConfig`].
///
/// Required fields are `api_key`, `api_secret_key`, `state_secret`,
/// `app_url` and `frontend_url`.
///
/// # Defaults
///
/// - `scopes`: empty
/// - `callback_path`: `/oauth/callback`
/// - `state_ttl`: 5 minutes
/// - `http_timeout`, `store_timeout`: 10 seconds
/// - `merchant_ttl`: `None` (records never lapse)
/// - `token_endpoint_base`: `None`
#[derive(Debug, Default)]
pub struct OnboardingConfigBuilder {
    api_key: Option<ApiKey>,
    api_secret_key: Option<ApiSecretKey>,
    old_api_secret_key: Option<ApiSecretKey>,
    state_secret: Option<StateSecret>,
    scopes: Option<AuthScopes>,
    app_url: Option<HostUrl>,
    frontend_url: Option<HostUrl>,
    callback_path: Option<String>,
    state_ttl: Option<Duration>,
    http_timeout: Option<Duration>,
    store_timeout: Option<Duration>,
    merchant_ttl: Option<Duration>,
    token_endpoint_base: Option<HostUrl>,
}

impl OnboardingConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key (required).
    #[must_use]
    pub fn api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets the API secret key (required).
    #[must_use]
    pub fn api_secret_key(mut self, key: ApiSecretKey) -> Self {
        self.api_secret_key = Some(key);
        self
    }

    /// Sets the old API secret key for key rotation support.
    #[must_use]
    pub fn old_api_secret_key(mut self, key: ApiSecretKey) -> Self {
        self.old_api_secret_key = Some(key);
        self
    }

    /// Sets the state signing secret (required).
    #[must_use]
    pub fn state_secret(mut self, secret: StateSecret) -> Self {
        self.state_secret = Some(secret);
        self
    }

    /// Sets the OAuth scopes.
    #[must_use]
    pub fn scopes(mut self, scopes: AuthScopes) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Sets the public base URL of this service (required).
    #[must_use]
    pub fn app_url(mut self, url: HostUrl) -> Self {
        self.app_url = Some(url);
        self
    }

    /// Sets the frontend URL (required).
    #[must_use]
    pub fn frontend_url(mut self, url: HostUrl) -> Self {
        self.frontend_url = Some(url);
        self
    }

    /// Sets the callback path.
    #[must_use]
    pub fn callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = Some(path.into());
        self
    }

    /// Sets the state token lifetime.
    #[must_use]
    pub const fn state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = Some(ttl);
        self
    }

    /// Sets the token exchange timeout.
    #[must_use]
    pub const fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets the merchant store timeout.
    #[must_use]
    pub const fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Sets the merchant record TTL.
    #[must_use]
    pub const fn merchant_ttl(mut self, ttl: Duration) -> Self {
        self.merchant_ttl = Some(ttl);
        self
    }

    /// Points token exchange at a different base URL (mock server, egress proxy).
    #[must_use]
    pub fn token_endpoint_base(mut self, base: HostUrl) -> Self {
        self.token_endpoint_base = Some(base);
        self
    }

    /// Builds the [`OnboardingConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] if a required field is
    /// not set.
    pub fn build(self) -> Result<OnboardingConfig, ConfigError> {
        let api_key = self
            .api_key
            .ok_or(ConfigError::MissingRequiredField { field: "api_key" })?;
        let api_secret_key = self
            .api_secret_key
            .ok_or(ConfigError::MissingRequiredField {
                field: "api_secret_key",
            })?;
        let state_secret = self.state_secret.ok_or(ConfigError::MissingRequiredField {
            field: "state_secret",
        })?;
        let app_url = self
            .app_url
            .ok_or(ConfigError::MissingRequiredField { field: "app_url" })?;
        let frontend_url = self.frontend_url.ok_or(ConfigError::MissingRequiredField {
            field: "frontend_url",
        })?;

        let callback_path = match self.callback_path {
            Some(path) if path.starts_with('/') => path,
            Some(path) => format!("/{path}"),
            None => DEFAULT_CALLBACK_PATH.to_string(),
        };

        Ok(OnboardingConfig {
            api_key,
            api_secret_key,
            old_api_secret_key: self.old_api_secret_key,
            state_secret,
            scopes: self.scopes.unwrap_or_default(),
            app_url,
            frontend_url,
            callback_path,
            state_ttl: self.state_ttl.unwrap_or(DEFAULT_STATE_TTL),
            http_timeout: self.http_timeout.unwrap_or(DEFAULT_IO_TIMEOUT),
            store_timeout: self.store_timeout.unwrap_or(DEFAULT_IO_TIMEOUT),
            merchant_ttl: self.merchant_ttl,
            token_endpoint_base: self.token_endpoint_base,
        })
    }
}
