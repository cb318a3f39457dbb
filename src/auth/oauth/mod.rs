//! Shopify OAuth onboarding.
//!
//! Two ways for a merchant to connect:
//!
//! - **Authorization code flow**: [`begin_auth`] builds the authorize URL
//!   with a signed state token; Shopify redirects back to the callback,
//!   which [`OAuthCallbackHandler::handle`] verifies, exchanges and stores.
//! - **Session token exchange**: an embedded app posts its App Bridge JWT
//!   to [`OAuthCallbackHandler::handle_session_token`].
//!
//! # Security
//!
//! - Callback HMACs and state signatures are compared in constant time
//! - State tokens expire after a configurable window (5 minutes by default)
//! - Shop domains are validated before being interpolated into any URL
//! - The previous API secret is accepted during key rotation
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shopify_onboarding::auth::oauth::{CallbackQuery, OAuthCallbackHandler};
//! use shopify_onboarding::merchant::SqliteMerchantStore;
//!
//! let store = SqliteMerchantStore::connect("sqlite://onboarding.db?mode=rwc", None).await?;
//! store.migrate().await?;
//! let handler = OAuthCallbackHandler::new(config, Arc::new(store))?;
//!
//! // On GET /oauth/callback
//! let outcome = handler.handle(&query).await;
//! // respond 302 with Location: outcome.redirect_url
//! ```

mod begin_auth;
mod callback;
mod callback_query;
mod error;
pub mod hmac;
mod jwt_payload;
mod state;
mod token_exchange;

pub use begin_auth::{begin_auth, BeginAuthResult};
pub use callback::{CallbackOutcome, CallbackStage, OAuthCallbackHandler};
pub use callback_query::CallbackQuery;
pub use error::{FailureReason, OAuthError};
pub use jwt_payload::JwtPayload;
pub use state::{StateClaims, StateError, StateTokenCodec};
pub use token_exchange::{AccessToken, ExchangeError, ExchangeGrant, TokenExchangeClient};
