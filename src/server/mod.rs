//! HTTP surface for the onboarding flow.
//!
//! # Routes
//!
//! | method | path                   | handler                        |
//! |--------|------------------------|--------------------------------|
//! | GET    | `/oauth/install`       | redirect to Shopify's consent  |
//! | GET    | callback path          | verify, exchange, redirect     |
//! | POST   | `/oauth/session-token` | embedded app token exchange    |
//! | GET    | `/merchants/{shop}`    | merchant lookup, bearer token  |
//! | GET    | `/health`              | liveness                       |
//! | GET    | `/health/ready`        | store reachability             |
//!
//! The callback path comes from [`OnboardingConfig::callback_path`] so it
//! always matches the `redirect_uri` sent to Shopify.
//!
//! [`OnboardingConfig::callback_path`]: crate::config::OnboardingConfig::callback_path

mod error;
mod handlers;

pub use error::ApiError;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::oauth::OAuthCallbackHandler;

/// Shared application state.
///
/// Cheap to clone; handlers receive a copy per request.
#[derive(Clone, Debug)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    handler: OAuthCallbackHandler,
}

impl AppState {
    /// Wraps a fully wired callback handler.
    #[must_use]
    pub fn new(handler: OAuthCallbackHandler) -> Self {
        Self {
            inner: Arc::new(AppStateInner { handler }),
        }
    }

    /// Returns the OAuth handler.
    #[must_use]
    pub fn handler(&self) -> &OAuthCallbackHandler {
        &self.inner.handler
    }
}

/// Builds the router with request tracing applied.
pub fn router(state: AppState) -> Router {
    let callback_path = state.handler().config().callback_path().to_string();

    Router::new()
        .route("/oauth/install", get(handlers::install))
        .route(&callback_path, get(handlers::callback))
        .route("/oauth/session-token", post(handlers::session_token))
        .route("/merchants/{shop}", get(handlers::merchant))
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::ready))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
