//! # Shopify Onboarding
//!
//! Connects Shopify merchants to a conversational assistant through OAuth.
//!
//! ## Overview
//!
//! A chat conversation sends the merchant to `/oauth/install`; Shopify asks
//! them to approve the app and calls back to `/oauth/callback`; the service
//! verifies the callback, exchanges the code for an access token, records
//! the merchant and sends the browser back to the chat frontend with the
//! outcome in the query string.
//!
//! This crate provides:
//! - Type-safe configuration via [`OnboardingConfig`] and [`ServerConfig`]
//! - Validated newtypes for credentials, shop domains and URLs
//! - Signed, time-boxed state tokens via [`auth::oauth::StateTokenCodec`]
//! - Authorization-code and session-token exchange via
//!   [`auth::oauth::TokenExchangeClient`]
//! - Merchant persistence via [`merchant::MerchantStore`] (SQLite)
//! - The callback state machine via [`auth::oauth::OAuthCallbackHandler`]
//! - Deterministic frontend redirects via [`redirect::RedirectUrlBuilder`]
//! - An axum HTTP surface via [`server::router`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use shopify_onboarding::auth::oauth::OAuthCallbackHandler;
//! use shopify_onboarding::merchant::InMemoryMerchantStore;
//! use shopify_onboarding::{ApiKey, ApiSecretKey, HostUrl, OnboardingConfig, ShopDomain, StateSecret};
//!
//! let config = OnboardingConfig::builder()
//!     .api_key(ApiKey::new("your-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("your-api-secret").unwrap())
//!     .state_secret(StateSecret::new("0123456789abcdef0123456789abcdef").unwrap())
//!     .app_url(HostUrl::new("https://auth.example.com").unwrap())
//!     .frontend_url(HostUrl::new("https://chat.example.com").unwrap())
//!     .scopes("read_products,read_orders".parse().unwrap())
//!     .build()
//!     .unwrap();
//!
//! let handler = OAuthCallbackHandler::new(config, Arc::new(InMemoryMerchantStore::new())).unwrap();
//! let install = handler.begin(&ShopDomain::new("my-store").unwrap(), "conv-1", false);
//! assert!(install.auth_url.contains("client_id=your-api-key"));
//! ```
//!
//! ## Design Principles
//!
//! - **No global state**: everything hangs off an explicitly built handler
//! - **Fail-fast validation**: newtypes validate on construction
//! - **Always redirect**: callback failures become an `error=` code, never
//!   a raw error page
//! - **Thread-safe**: all public types are `Send + Sync`

pub mod auth;
pub mod config;
pub mod error;
pub mod merchant;
pub mod redirect;
pub mod server;

// Re-export public types at crate root for convenience
pub use auth::AuthScopes;
pub use config::{
    ApiKey, ApiSecretKey, HostUrl, LogFormat, OnboardingConfig, OnboardingConfigBuilder,
    ServerConfig, ShopDomain, StateSecret,
};
pub use error::ConfigError;

// Re-export OAuth types for convenience
pub use auth::oauth::{
    CallbackOutcome, CallbackQuery, FailureReason, OAuthCallbackHandler, OAuthError,
    StateTokenCodec, TokenExchangeClient,
};
pub use merchant::{Merchant, MerchantStore, StoreError, UpsertOutcome};
pub use redirect::{RedirectParams, RedirectUrlBuilder};
