//! Access token exchange against Shopify's token endpoint.
//!
//! Two grants trade a short-lived artifact for an access token:
//!
//! - [`ExchangeGrant::AuthorizationCode`]: the `code` from an OAuth callback
//! - [`ExchangeGrant::SessionToken`]: an App Bridge session token (JWT),
//!   exchanged per RFC 8693
//!
//! Both are a single `POST https://{shop}/admin/oauth/access_token`. The
//! response is parsed into an explicit struct; a non-2xx status, an
//! unparseable body or a missing `access_token` are all
//! [`ExchangeError::ExchangeFailed`]. Transport failures and timeouts are
//! [`ExchangeError::Network`]. Nothing is retried here.
//!
//! # RFC 8693 Token Types
//!
//! - Grant type: `urn:ietf:params:oauth:grant-type:token-exchange`
//! - Subject token type: `urn:ietf:params:oauth:token-type:id_token`
//! - Requested token types:
//!   - Online: `urn:shopify:params:oauth:token-type:online-access-token`
//!   - Offline: `urn:shopify:params:oauth:token-type:offline-access-token`
//!
//! # Example
//!
//! ```rust,ignore
//! use shopify_onboarding::auth::oauth::{ExchangeGrant, TokenExchangeClient};
//! use shopify_onboarding::ShopDomain;
//!
//! let client = TokenExchangeClient::new(&config)?;
//! let shop = ShopDomain::new("my-store")?;
//! let token = client
//!     .exchange(&ExchangeGrant::AuthorizationCode("abc".into()), &shop)
//!     .await?;
//! println!("granted scopes: {}", token.scope);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::auth::AuthScopes;
use crate::config::{ApiKey, ApiSecretKey, HostUrl, OnboardingConfig, ShopDomain};
use crate::error::ConfigError;

const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";

const TOKEN_PATH: &str = "/admin/oauth/access_token";

/// What is being exchanged for an access token.
#[derive(Clone, PartialEq, Eq)]
pub enum ExchangeGrant {
    /// The `code` parameter from an OAuth callback.
    AuthorizationCode(String),
    /// An App Bridge session token.
    SessionToken {
        /// The raw JWT.
        token: String,
        /// Request a user-scoped online token instead of an offline one.
        online: bool,
    },
}

impl fmt::Debug for ExchangeGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthorizationCode(_) => f.write_str("AuthorizationCode(*****)"),
            Self::SessionToken { online, .. } => f
                .debug_struct("SessionToken")
                .field("token", &"*****")
                .field("online", online)
                .finish(),
        }
    }
}

/// An access token returned by Shopify.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer token for the Admin API.
    pub access_token: String,
    /// Scopes Shopify actually granted.
    pub scope: AuthScopes,
    /// Lifetime in seconds for online tokens; `None` for offline tokens.
    pub expires_in: Option<u64>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"*****")
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Errors from the token endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Non-2xx status, unparseable body or missing `access_token`.
    #[error("Token endpoint returned {status}: {body}")]
    ExchangeFailed {
        /// HTTP status code.
        status: u16,
        /// Response body or parse error, for server-side logs.
        body: String,
    },

    /// Connection failure or timeout.
    #[error("Network error: {message}")]
    Network {
        /// Underlying transport error.
        message: String,
    },

    /// Shopify rejected the session token (`invalid_subject_token`).
    #[error("Session token was rejected by token exchange")]
    InvalidSubjectToken,
}

#[derive(Serialize)]
struct AuthorizationCodeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    subject_token: &'a str,
    subject_token_type: &'a str,
    requested_token_type: &'a str,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
}

/// HTTP client for the token endpoint.
///
/// Holds the app credentials and a `reqwest::Client` with the configured
/// timeout. Clone it freely; clones share the connection pool.
#[derive(Clone)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
    api_key: ApiKey,
    api_secret_key: ApiSecretKey,
    base_override: Option<HostUrl>,
}

impl fmt::Debug for TokenExchangeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchangeClient")
            .field("api_key", &self.api_key)
            .field("base_override", &self.base_override)
            .finish_non_exhaustive()
    }
}

// Verify TokenExchangeClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TokenExchangeClient>();
};

impl TokenExchangeClient {
    /// Creates a client from the onboarding configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be
    /// initialised.
    pub fn new(config: &OnboardingConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_key: config.api_key().clone(),
            api_secret_key: config.api_secret_key().clone(),
            base_override: config.token_endpoint_base().cloned(),
        })
    }

    /// Returns the token endpoint URL for `shop`.
    ///
    /// `shop` is already validated by [`ShopDomain`], so interpolating it
    /// cannot redirect the request to another host.
    #[must_use]
    pub fn token_url(&self, shop: &ShopDomain) -> String {
        match &self.base_override {
            Some(base) => format!("{}{TOKEN_PATH}", base.trimmed()),
            None => format!("https://{shop}{TOKEN_PATH}"),
        }
    }

    /// Exchanges `grant` for an access token.
    ///
    /// # Errors
    ///
    /// - [`ExchangeError::ExchangeFailed`] on a non-2xx status or a response
    ///   without a usable `access_token`
    /// - [`ExchangeError::InvalidSubjectToken`] if Shopify rejects a session
    ///   token
    /// - [`ExchangeError::Network`] on connection failure or timeout
    pub async fn exchange(
        &self,
        grant: &ExchangeGrant,
        shop: &ShopDomain,
    ) -> Result<AccessToken, ExchangeError> {
        let url = self.token_url(shop);
        let client_id = self.api_key.as_ref();
        let client_secret = self.api_secret_key.as_ref();

        let request = match grant {
            ExchangeGrant::AuthorizationCode(code) => {
                self.http.post(&url).json(&AuthorizationCodeRequest {
                    client_id,
                    client_secret,
                    code,
                })
            }
            ExchangeGrant::SessionToken { token, online } => {
                self.http.post(&url).json(&TokenExchangeRequest {
                    client_id,
                    client_secret,
                    grant_type: TOKEN_EXCHANGE_GRANT_TYPE,
                    subject_token: token,
                    subject_token_type: ID_TOKEN_TYPE,
                    requested_token_type: requested_token_type(*online),
                })
            }
        };

        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ExchangeError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ExchangeError::Network {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let is_rejected_session_token = status.as_u16() == 400
                && matches!(grant, ExchangeGrant::SessionToken { .. })
                && serde_json::from_str::<TokenErrorResponse>(&body)
                    .ok()
                    .and_then(|r| r.error)
                    .as_deref()
                    == Some("invalid_subject_token");
            if is_rejected_session_token {
                return Err(ExchangeError::InvalidSubjectToken);
            }

            return Err(ExchangeError::ExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        parse_access_token(status.as_u16(), &body)
    }
}

const fn requested_token_type(online: bool) -> &'static str {
    if online {
        "urn:shopify:params:oauth:token-type:online-access-token"
    } else {
        "urn:shopify:params:oauth:token-type:offline-access-token"
    }
}

fn parse_access_token(status: u16, body: &str) -> Result<AccessToken, ExchangeError> {
    let failed = |reason: String| ExchangeError::ExchangeFailed { status, body: reason };

    let response: AccessTokenResponse = serde_json::from_str(body)
        .map_err(|e| failed(format!("Failed to parse token response: {e}")))?;

    if response.access_token.trim().is_empty() {
        return Err(failed("Token response is missing access_token".to_string()));
    }

    let (scope, rejected) = AuthScopes::parse_lenient(&response.scope);
    if !rejected.is_empty() {
        warn!(?rejected, "ignoring invalid scopes in token response");
    }

    Ok(AccessToken {
        access_token: response.access_token,
        scope,
        expires_in: response.expires_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateSecret;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base: Option<&str>) -> OnboardingConfig {
        let mut builder = OnboardingConfig::builder()
            .api_key(ApiKey::new("test-api-key").unwrap())
            .api_secret_key(ApiSecretKey::new("test-secret").unwrap())
            .state_secret(StateSecret::new("0123456789abcdef0123456789abcdef").unwrap())
            .app_url(HostUrl::new("https://auth.example.com").unwrap())
            .frontend_url(HostUrl::new("https://chat.example.com").unwrap())
            .http_timeout(Duration::from_secs(2));
        if let Some(base) = base {
            builder = builder.token_endpoint_base(HostUrl::new(base).unwrap());
        }
        builder.build().unwrap()
    }

    fn shop() -> ShopDomain {
        ShopDomain::new("test-shop").unwrap()
    }

    fn code() -> ExchangeGrant {
        ExchangeGrant::AuthorizationCode("auth-code".to_string())
    }

    #[test]
    fn test_token_url_uses_shop_domain_by_default() {
        let client = TokenExchangeClient::new(&config_for(None)).unwrap();
        assert_eq!(
            client.token_url(&shop()),
            "https://test-shop.myshopify.com/admin/oauth/access_token"
        );
    }

    #[test]
    fn test_token_url_honours_override() {
        let client = TokenExchangeClient::new(&config_for(Some("http://127.0.0.1:9/"))).unwrap();
        assert_eq!(
            client.token_url(&shop()),
            "http://127.0.0.1:9/admin/oauth/access_token"
        );
    }

    #[test]
    fn test_debug_masks_tokens() {
        let grant = ExchangeGrant::AuthorizationCode("super-secret-code".to_string());
        assert!(!format!("{grant:?}").contains("super-secret-code"));

        let token = AccessToken {
            access_token: "shpat_secret".to_string(),
            scope: AuthScopes::new(),
            expires_in: None,
        };
        assert!(!format!("{token:?}").contains("shpat_secret"));

        let client = TokenExchangeClient::new(&config_for(None)).unwrap();
        assert!(!format!("{client:?}").contains("test-secret"));
    }

    #[tokio::test]
    async fn test_authorization_code_exchange_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/oauth/access_token"))
            .and(body_json(serde_json::json!({
                "client_id": "test-api-key",
                "client_secret": "test-secret",
                "code": "auth-code"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "shpat_123",
                "scope": "write_products,read_orders",
                "unknown_field": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        let token = client.exchange(&code(), &shop()).await.unwrap();

        assert_eq!(token.access_token, "shpat_123");
        assert_eq!(token.scope.to_string(), "read_orders,read_products,write_products");
        assert_eq!(token.expires_in, None);
    }

    #[tokio::test]
    async fn test_session_token_exchange_sends_rfc8693_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/oauth/access_token"))
            .and(body_json(serde_json::json!({
                "client_id": "test-api-key",
                "client_secret": "test-secret",
                "grant_type": TOKEN_EXCHANGE_GRANT_TYPE,
                "subject_token": "jwt",
                "subject_token_type": ID_TOKEN_TYPE,
                "requested_token_type": "urn:shopify:params:oauth:token-type:online-access-token"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "shpua_online",
                "scope": "read_products",
                "expires_in": 86399
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        let grant = ExchangeGrant::SessionToken {
            token: "jwt".to_string(),
            online: true,
        };
        let token = client.exchange(&grant, &shop()).await.unwrap();

        assert_eq!(token.access_token, "shpua_online");
        assert_eq!(token.expires_in, Some(86399));
    }

    #[tokio::test]
    async fn test_unauthorized_response_is_exchange_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        let result = client.exchange(&code(), &shop()).await;

        assert_eq!(
            result,
            Err(ExchangeError::ExchangeFailed {
                status: 401,
                body: "invalid_client".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_missing_access_token_is_exchange_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"scope": "read_products"})),
            )
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        let result = client.exchange(&code(), &shop()).await;

        assert!(matches!(
            result,
            Err(ExchangeError::ExchangeFailed { status: 200, ref body }) if body.contains("access_token")
        ));
    }

    #[tokio::test]
    async fn test_invalid_scope_entry_does_not_discard_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "shpat_abc",
                "scope": "read_products,read orders!"
            })))
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        let token = client.exchange(&code(), &shop()).await.unwrap();

        assert_eq!(token.access_token, "shpat_abc");
        assert_eq!(token.scope.to_string(), "read_products");
    }

    #[tokio::test]
    async fn test_non_json_body_is_exchange_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        assert!(matches!(
            client.exchange(&code(), &shop()).await,
            Err(ExchangeError::ExchangeFailed { status: 200, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_subject_token_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_subject_token"})),
            )
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        let grant = ExchangeGrant::SessionToken {
            token: "jwt".to_string(),
            online: false,
        };
        assert_eq!(
            client.exchange(&grant, &shop()).await,
            Err(ExchangeError::InvalidSubjectToken)
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop a listener to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{addr}");
        let client = TokenExchangeClient::new(&config_for(Some(&base))).unwrap();

        assert!(matches!(
            client.exchange(&code(), &shop()).await,
            Err(ExchangeError::Network { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(serde_json::json!({"access_token": "late"})),
            )
            .mount(&server)
            .await;

        let client = TokenExchangeClient::new(&config_for(Some(&server.uri()))).unwrap();
        assert!(matches!(
            client.exchange(&code(), &shop()).await,
            Err(ExchangeError::Network { .. })
        ));
    }
}
