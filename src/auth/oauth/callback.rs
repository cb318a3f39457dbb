//! The OAuth callback state machine.
//!
//! [`OAuthCallbackHandler::handle`] drives one callback through
//!
//! ```text
//! Received → SignatureVerified → StateDecoded → TokenExchanged
//!          → MerchantUpserted → RedirectBuilt
//! ```
//!
//! and stops at `Failed(reason)` on the first error. Either way the result
//! is a frontend redirect URL; the browser never sees a raw error.
//!
//! | failing step                    | `error=`              |
//! |---------------------------------|-----------------------|
//! | `hmac` missing or wrong         | `invalid_hmac`        |
//! | `state` missing or undecodable  | `invalid_state`       |
//! | `shop`/`code` invalid, exchange | `exchange_failed`     |
//! | store error or timeout          | `storage_unavailable` |
//!
//! The merchant upsert runs on its own task. If the HTTP request is dropped
//! mid-flow (client disconnect), the write still completes. The store timeout
//! bounds how long the caller waits, not the write: a timed-out upsert is
//! reported as `storage_unavailable` but may still commit afterwards, and a
//! retried flow then sees the merchant as returning.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::oauth::hmac::validate_hmac;
use crate::auth::oauth::jwt_payload::JwtPayload;
use crate::auth::oauth::{
    begin_auth, AccessToken, BeginAuthResult, CallbackQuery, ExchangeGrant, OAuthError,
    StateError, StateTokenCodec, TokenExchangeClient,
};
use crate::config::{OnboardingConfig, ShopDomain};
use crate::error::ConfigError;
use crate::merchant::{Merchant, MerchantStore, StoreError, UpsertOutcome};
use crate::redirect::{RedirectParams, RedirectUrlBuilder};

/// Progress of a callback through the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackStage {
    /// Request arrived; nothing checked yet.
    Received,
    /// Shopify's HMAC matched.
    SignatureVerified,
    /// The state token decoded and is fresh.
    StateDecoded,
    /// An access token was obtained.
    TokenExchanged,
    /// The merchant record was written.
    MerchantUpserted,
    /// The success redirect was built.
    RedirectBuilt,
    /// The flow stopped with an error.
    Failed,
}

impl CallbackStage {
    /// Returns a stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::SignatureVerified => "signature_verified",
            Self::StateDecoded => "state_decoded",
            Self::TokenExchanged => "token_exchanged",
            Self::MerchantUpserted => "merchant_upserted",
            Self::RedirectBuilt => "redirect_built",
            Self::Failed => "failed",
        }
    }
}

/// Result of handling one callback.
#[derive(Debug)]
pub struct CallbackOutcome {
    /// Terminal stage: [`CallbackStage::RedirectBuilt`] or [`CallbackStage::Failed`].
    pub stage: CallbackStage,
    /// The parameters placed on the redirect.
    pub params: RedirectParams,
    /// The absolute frontend URL to redirect to.
    pub redirect_url: String,
    /// The error that stopped the flow, if any.
    pub error: Option<OAuthError>,
}

impl CallbackOutcome {
    /// Returns `true` if the merchant was stored.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.stage, CallbackStage::RedirectBuilt)
    }
}

/// Orchestrates the OAuth flow: install redirect, callback, and session
/// token exchange.
///
/// Cheap to share behind an `Arc`; it holds no per-request state.
pub struct OAuthCallbackHandler {
    config: OnboardingConfig,
    codec: StateTokenCodec,
    exchange: TokenExchangeClient,
    store: Arc<dyn MerchantStore>,
    redirects: RedirectUrlBuilder,
}

impl std::fmt::Debug for OAuthCallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCallbackHandler")
            .field("config", &self.config)
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

// Verify OAuthCallbackHandler is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<OAuthCallbackHandler>();
};

impl OAuthCallbackHandler {
    /// Wires the handler from configuration and a store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the token exchange client
    /// cannot be built.
    pub fn new(config: OnboardingConfig, store: Arc<dyn MerchantStore>) -> Result<Self, ConfigError> {
        let codec = StateTokenCodec::new(config.state_secret().clone(), config.state_ttl());
        let exchange = TokenExchangeClient::new(&config)?;
        let redirects = RedirectUrlBuilder::new(config.frontend_url().clone());

        Ok(Self {
            config,
            codec,
            exchange,
            store,
            redirects,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    /// Returns the state codec.
    #[must_use]
    pub const fn codec(&self) -> &StateTokenCodec {
        &self.codec
    }

    /// Starts an install: issues a state token and builds the authorize URL.
    #[must_use]
    pub fn begin(&self, shop: &ShopDomain, conversation_id: &str, online: bool) -> BeginAuthResult {
        let result = begin_auth(&self.config, &self.codec, shop, conversation_id, online);
        info!(shop = %shop, conversation_id, online, "OAuth install started");
        result
    }

    /// Handles a Shopify OAuth callback.
    ///
    /// Never fails: every error is folded into a redirect carrying an
    /// `error` code. Details go to the server log only.
    pub async fn handle(&self, query: &CallbackQuery) -> CallbackOutcome {
        let mut stage = CallbackStage::Received;
        let mut conversation_id = None;

        match self.run(query, &mut stage, &mut conversation_id).await {
            Ok(outcome) => {
                let params = RedirectParams::Success {
                    is_new: outcome.is_new,
                    merchant_id: outcome.merchant.id.clone(),
                    shop: outcome.merchant.shop_domain.to_string(),
                    conversation_id,
                };
                let redirect_url = self.redirects.build(&params);
                info!(
                    stage = CallbackStage::RedirectBuilt.as_str(),
                    shop = %outcome.merchant.shop_domain,
                    merchant_id = %outcome.merchant.id,
                    is_new = outcome.is_new,
                    "OAuth callback completed"
                );
                CallbackOutcome {
                    stage: CallbackStage::RedirectBuilt,
                    params,
                    redirect_url,
                    error: None,
                }
            }
            Err(err) => {
                let reason = err.failure_reason();
                warn!(
                    failed_after = stage.as_str(),
                    reason = reason.as_str(),
                    retryable = err.is_retryable(),
                    shop = query.shop().unwrap_or_default(),
                    error = %err,
                    "OAuth callback failed"
                );
                let params = RedirectParams::Failure {
                    reason,
                    conversation_id,
                };
                let redirect_url = self.redirects.build(&params);
                CallbackOutcome {
                    stage: CallbackStage::Failed,
                    params,
                    redirect_url,
                    error: Some(err),
                }
            }
        }
    }

    async fn run(
        &self,
        query: &CallbackQuery,
        stage: &mut CallbackStage,
        conversation_id: &mut Option<String>,
    ) -> Result<UpsertOutcome, OAuthError> {
        if !validate_hmac(query, &self.config) {
            return Err(OAuthError::InvalidSignature);
        }
        *stage = CallbackStage::SignatureVerified;
        debug!(stage = stage.as_str(), "callback signature verified");

        let state = query.state().ok_or_else(|| StateError::Malformed {
            reason: "missing state parameter".to_string(),
        })?;
        let claims = self.codec.decode(state)?;
        *conversation_id = Some(claims.conversation_id);
        *stage = CallbackStage::StateDecoded;
        debug!(stage = stage.as_str(), conversation_id = ?conversation_id, "state decoded");

        let shop = parse_shop(query.shop())?;
        let code = query.code().ok_or_else(|| OAuthError::Malformed {
            reason: "missing code parameter".to_string(),
        })?;
        let token = self
            .exchange
            .exchange(&ExchangeGrant::AuthorizationCode(code.to_string()), &shop)
            .await?;
        *stage = CallbackStage::TokenExchanged;
        debug!(stage = stage.as_str(), shop = %shop, scope = %token.scope, "token exchanged");

        let outcome = self.upsert_detached(shop, token).await?;
        *stage = CallbackStage::MerchantUpserted;
        debug!(stage = stage.as_str(), is_new = outcome.is_new, "merchant upserted");

        Ok(outcome)
    }

    /// Exchanges an App Bridge session token and stores the merchant.
    ///
    /// # Errors
    ///
    /// - [`OAuthError::Malformed`] if `shop` is not a valid shop domain
    /// - [`OAuthError::InvalidSessionToken`] if the JWT fails validation,
    ///   names another shop, or is rejected by Shopify
    /// - [`OAuthError::ExchangeFailed`] / [`OAuthError::NetworkError`] from
    ///   the token endpoint
    /// - [`OAuthError::StorageUnavailable`] if the write fails or times out
    pub async fn handle_session_token(
        &self,
        shop: &str,
        session_token: &str,
        online: bool,
    ) -> Result<UpsertOutcome, OAuthError> {
        let shop = parse_shop(Some(shop))?;
        JwtPayload::decode_for_shop(session_token, &self.config, &shop)?;

        let grant = ExchangeGrant::SessionToken {
            token: session_token.to_string(),
            online,
        };
        let token = self.exchange.exchange(&grant, &shop).await?;
        let outcome = self.upsert_detached(shop, token).await?;

        info!(
            shop = %outcome.merchant.shop_domain,
            merchant_id = %outcome.merchant.id,
            is_new = outcome.is_new,
            online,
            "session token exchanged"
        );
        Ok(outcome)
    }

    /// Checks that `session_token` is a valid App Bridge token issued for
    /// `shop`.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidSessionToken`] if the token fails
    /// validation or names another shop.
    pub fn authorize_shop(
        &self,
        session_token: &str,
        shop: &ShopDomain,
    ) -> Result<(), OAuthError> {
        JwtPayload::decode_for_shop(session_token, &self.config, shop)?;
        Ok(())
    }

    /// Looks up a merchant, bounded by the store timeout.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::StorageUnavailable`] on store failure or timeout.
    pub async fn merchant(&self, shop: &ShopDomain) -> Result<Option<Merchant>, OAuthError> {
        let timeout = self.config.store_timeout();
        tokio::time::timeout(timeout, self.store.get(shop))
            .await
            .map_err(|_| StoreError::Timeout { after: timeout })?
            .map_err(OAuthError::from)
    }

    /// Checks that the store answers within the store timeout.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or [`StoreError::Timeout`].
    pub async fn ping_store(&self) -> Result<(), StoreError> {
        let timeout = self.config.store_timeout();
        tokio::time::timeout(timeout, self.store.ping())
            .await
            .map_err(|_| StoreError::Timeout { after: timeout })?
    }

    async fn upsert_detached(
        &self,
        shop: ShopDomain,
        token: AccessToken,
    ) -> Result<UpsertOutcome, OAuthError> {
        let store = Arc::clone(&self.store);
        let timeout = self.config.store_timeout();

        let task = tokio::spawn(async move {
            store
                .upsert(&shop, &token.access_token, &token.scope)
                .await
        });

        // On timeout the handle is dropped but the write keeps running
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join_err)) => Err(StoreError::Unavailable {
                message: format!("upsert task failed: {join_err}"),
            }
            .into()),
            Err(_elapsed) => {
                warn!(
                    after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "merchant upsert timed out; write continues in the background"
                );
                Err(StoreError::Timeout { after: timeout }.into())
            }
        }
    }
}

fn parse_shop(raw: Option<&str>) -> Result<ShopDomain, OAuthError> {
    let raw = raw.ok_or_else(|| OAuthError::Malformed {
        reason: "missing shop parameter".to_string(),
    })?;
    if !raw.trim().to_ascii_lowercase().ends_with(".myshopify.com") {
        return Err(OAuthError::Malformed {
            reason: format!("shop must be a myshopify.com domain: '{raw}'"),
        });
    }
    ShopDomain::new(raw).map_err(|e| OAuthError::Malformed {
        reason: e.to_string(),
    })
}
