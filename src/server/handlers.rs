//! Route handlers.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::{ApiError, AppState};
use crate::auth::oauth::CallbackQuery;
use crate::auth::AuthScopes;
use crate::config::ShopDomain;

/// Query for `GET /oauth/install`.
#[derive(Debug, Deserialize)]
pub struct InstallParams {
    shop: String,
    conversation_id: String,
    #[serde(default)]
    online: bool,
}

/// Body for `POST /oauth/session-token`.
#[derive(Debug, Deserialize)]
pub struct SessionTokenRequest {
    shop: String,
    session_token: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    online: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionTokenResponse {
    merchant_id: String,
    shop: String,
    is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
}

/// Public view of a merchant. Never carries the access token.
#[derive(Debug, Serialize)]
pub struct MerchantView {
    merchant_id: String,
    shop: String,
    scopes: AuthScopes,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    /// `false` when the app now asks for scopes this merchant never granted.
    scopes_current: bool,
    missing_scopes: Vec<String>,
}

/// Redirects the merchant to Shopify's consent screen.
pub async fn install(
    State(state): State<AppState>,
    Query(params): Query<InstallParams>,
) -> Result<Response, ApiError> {
    let shop = ShopDomain::new(&params.shop).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if params.conversation_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "conversation_id must not be empty".to_string(),
        ));
    }

    let result = state
        .handler()
        .begin(&shop, &params.conversation_id, params.online);
    found(&result.auth_url).ok_or_else(|| {
        ApiError::Internal("authorize URL is not a valid header value".to_string())
    })
}

/// Handles Shopify's redirect back after consent.
///
/// Always answers 302 to the frontend unless the Location header itself
/// cannot be built.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let outcome = state.handler().handle(&query).await;

    found(&outcome.redirect_url).unwrap_or_else(|| {
        error!(stage = outcome.stage.as_str(), "redirect URL is not a valid header value");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    })
}

/// Exchanges an App Bridge session token for an offline or online token.
pub async fn session_token(
    State(state): State<AppState>,
    Json(request): Json<SessionTokenRequest>,
) -> Result<Json<SessionTokenResponse>, ApiError> {
    let outcome = state
        .handler()
        .handle_session_token(&request.shop, &request.session_token, request.online)
        .await?;

    Ok(Json(SessionTokenResponse {
        merchant_id: outcome.merchant.id,
        shop: outcome.merchant.shop_domain.to_string(),
        is_new: outcome.is_new,
        conversation_id: request.conversation_id,
    }))
}

/// Looks up a merchant by shop domain or shop name.
///
/// Requires `Authorization: Bearer <session token>`, where the App Bridge
/// session token was issued for the same shop.
pub async fn merchant(
    State(state): State<AppState>,
    Path(shop): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MerchantView>, ApiError> {
    let shop = ShopDomain::new(&shop).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("missing bearer session token".to_string()))?;
    state.handler().authorize_shop(token, &shop)?;

    let merchant = state
        .handler()
        .merchant(&shop)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("merchant for {shop}")))?;

    let required = state.handler().config().scopes();
    Ok(Json(MerchantView {
        scopes_current: merchant.scopes.covers(required),
        missing_scopes: merchant.scopes.missing_from(required),
        merchant_id: merchant.id,
        shop: merchant.shop_domain.to_string(),
        scopes: merchant.scopes,
        created_at: merchant.created_at,
        last_seen: merchant.last_seen,
        expires_at: merchant.expires_at,
    }))
}

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness check: the merchant store must answer.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.handler().ping_store().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(err) => {
            warn!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn found(location: &str) -> Option<Response> {
    let location = HeaderValue::from_str(location).ok()?;
    Some((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}
