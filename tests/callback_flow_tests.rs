//! End-to-end tests for the OAuth callback flow.
//!
//! Each test drives `OAuthCallbackHandler::handle` against a wiremock token
//! endpoint and a real merchant store, then inspects the redirect URL and
//! the store contents.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shopify_onboarding::auth::oauth::hmac::compute_signature;
use shopify_onboarding::auth::oauth::{CallbackQuery, CallbackStage, OAuthCallbackHandler};
use shopify_onboarding::merchant::{InMemoryMerchantStore, MerchantStore, SqliteMerchantStore};
use shopify_onboarding::{
    ApiKey, ApiSecretKey, FailureReason, HostUrl, OAuthError, OnboardingConfig, RedirectParams,
    ShopDomain, StateSecret,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_SECRET: &str = "callback-test-secret";
const SHOP: &str = "cool-shoes.myshopify.com";

fn config(token_base: &str) -> OnboardingConfig {
    OnboardingConfig::builder()
        .api_key(ApiKey::new("callback-test-key").unwrap())
        .api_secret_key(ApiSecretKey::new(API_SECRET).unwrap())
        .state_secret(StateSecret::new("state-secret-state-secret-state-secret").unwrap())
        .app_url(HostUrl::new("https://auth.example.com").unwrap())
        .frontend_url(HostUrl::new("https://chat.example.com/").unwrap())
        .scopes("read_products,read_orders".parse().unwrap())
        .token_endpoint_base(HostUrl::new(token_base).unwrap())
        .http_timeout(Duration::from_secs(2))
        .store_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

/// Builds a callback query the way Shopify would, signed with `API_SECRET`.
fn callback_query(state: &str, code: &str) -> CallbackQuery {
    let mut query = CallbackQuery::from_pairs([
        ("code", code),
        ("shop", SHOP),
        ("state", state),
        ("timestamp", "1700000000"),
        ("host", "YWRtaW4uc2hvcGlmeS5jb20vc3RvcmUvY29vbC1zaG9lcw"),
    ]);
    let signature = compute_signature(&query.to_signable_string(), API_SECRET);
    query.insert("hmac", signature);
    query
}

async fn token_endpoint(status: u16, body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn granted() -> serde_json::Value {
    serde_json::json!({
        "access_token": "shpat_first",
        "scope": "read_products,read_orders"
    })
}

async fn sqlite_store() -> Arc<SqliteMerchantStore> {
    let store = SqliteMerchantStore::connect("sqlite::memory:", None)
        .await
        .unwrap();
    store.migrate().await.unwrap();
    Arc::new(store)
}

fn shop() -> ShopDomain {
    ShopDomain::new(SHOP).unwrap()
}

#[tokio::test]
async fn test_new_then_returning_merchant() {
    let server = token_endpoint(200, granted()).await;
    let store = sqlite_store().await;
    let handler = OAuthCallbackHandler::new(config(&server.uri()), store.clone()).unwrap();

    // First install: a new merchant
    let state = handler.codec().encode("conv-a");
    let first = handler.handle(&callback_query(&state, "code-a")).await;

    assert_eq!(first.stage, CallbackStage::RedirectBuilt, "{:?}", first.error);
    assert_eq!(
        first.redirect_url,
        "https://chat.example.com/?oauth=complete&is_new=true&merchant_id=merchant_cool_shoes&shop=cool-shoes.myshopify.com&conversation_id=conv-a"
    );
    let created = store.get(&shop()).await.unwrap().unwrap();
    assert_eq!(created.access_token, "shpat_first");

    // Second install for the same shop: returning, same merchant_id
    server.reset().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .and(body_string_contains("code-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "shpat_second",
            "scope": "read_products,read_orders,read_customers"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = handler.codec().encode("conv-b");
    let second = handler.handle(&callback_query(&state, "code-b")).await;

    let RedirectParams::Success {
        is_new,
        merchant_id,
        conversation_id,
        ..
    } = &second.params
    else {
        panic!("expected success, got {:?}", second.error);
    };
    assert!(!is_new);
    assert_eq!(merchant_id, "merchant_cool_shoes");
    assert_eq!(conversation_id.as_deref(), Some("conv-b"));
    assert!(second.redirect_url.contains("is_new=false"));

    let updated = store.get(&shop()).await.unwrap().unwrap();
    assert_eq!(updated.access_token, "shpat_second");
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.last_seen >= created.last_seen);
    assert!(updated.scopes.iter().any(|s| s == "read_customers"));
}

#[tokio::test]
async fn test_tampered_hmac_stops_before_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(granted()))
        .expect(0)
        .mount(&server)
        .await;
    let store = Arc::new(InMemoryMerchantStore::new());
    let handler = OAuthCallbackHandler::new(config(&server.uri()), store.clone()).unwrap();

    let state = handler.codec().encode("conv-c");
    let mut query = callback_query(&state, "code-c");
    let mut forged = query.hmac().unwrap().to_string();
    let last = if forged.ends_with('0') { "1" } else { "0" };
    forged.replace_range(forged.len() - 1.., last);
    query.insert("hmac", forged);

    let outcome = handler.handle(&query).await;

    assert!(matches!(outcome.error, Some(OAuthError::InvalidSignature)));
    assert_eq!(
        outcome.redirect_url,
        "https://chat.example.com/?oauth=complete&error=invalid_hmac"
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_parameter_changed_after_signing_is_rejected() {
    let server = token_endpoint(200, granted()).await;
    let store = Arc::new(InMemoryMerchantStore::new());
    let handler = OAuthCallbackHandler::new(config(&server.uri()), store.clone()).unwrap();

    let state = handler.codec().encode("conv-c");
    let mut query = callback_query(&state, "code-c");
    query.insert("shop", "someone-else.myshopify.com");

    let outcome = handler.handle(&query).await;

    assert!(outcome.redirect_url.contains("error=invalid_hmac"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_state_older_than_window_is_invalid_state() {
    let server = token_endpoint(200, granted()).await;
    let store = Arc::new(InMemoryMerchantStore::new());
    let handler = OAuthCallbackHandler::new(config(&server.uri()), store.clone()).unwrap();

    let issued = Utc::now() - chrono::Duration::minutes(6);
    let state = handler.codec().encode_at("conv-d", issued);
    let outcome = handler.handle(&callback_query(&state, "code-d")).await;

    assert_eq!(
        outcome.params,
        RedirectParams::Failure {
            reason: FailureReason::InvalidState,
            conversation_id: None,
        }
    );
    assert!(outcome.redirect_url.contains("error=invalid_state"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_state_signed_with_another_secret_is_invalid_state() {
    let server = token_endpoint(200, granted()).await;
    let handler = OAuthCallbackHandler::new(
        config(&server.uri()),
        Arc::new(InMemoryMerchantStore::new()),
    )
    .unwrap();
    let other = OAuthCallbackHandler::new(
        OnboardingConfig::builder()
            .api_key(ApiKey::new("callback-test-key").unwrap())
            .api_secret_key(ApiSecretKey::new(API_SECRET).unwrap())
            .state_secret(StateSecret::new("another-state-secret-another-state").unwrap())
            .app_url(HostUrl::new("https://auth.example.com").unwrap())
            .frontend_url(HostUrl::new("https://chat.example.com").unwrap())
            .build()
            .unwrap(),
        Arc::new(InMemoryMerchantStore::new()),
    )
    .unwrap();

    let state = other.codec().encode("conv-x");
    let outcome = handler.handle(&callback_query(&state, "code-x")).await;

    assert!(matches!(outcome.error, Some(OAuthError::InvalidState(_))));
    assert!(outcome.redirect_url.contains("error=invalid_state"));
}

#[tokio::test]
async fn test_exchange_rejected_leaves_store_untouched() {
    let server = token_endpoint(
        401,
        serde_json::json!({ "errors": "[API] Invalid API key or access token" }),
    )
    .await;
    let store = sqlite_store().await;
    let handler = OAuthCallbackHandler::new(config(&server.uri()), store.clone()).unwrap();

    let state = handler.codec().encode("conv-e");
    let outcome = handler.handle(&callback_query(&state, "code-e")).await;

    assert!(matches!(
        outcome.error,
        Some(OAuthError::ExchangeFailed { status: 401, .. })
    ));
    assert_eq!(
        outcome.redirect_url,
        "https://chat.example.com/?oauth=complete&error=exchange_failed&conversation_id=conv-e"
    );
    // The provider's body never reaches the browser
    assert!(!outcome.redirect_url.contains("API"));
    assert!(store.get(&shop()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unreachable_token_endpoint_is_retryable_exchange_failure() {
    let handler = OAuthCallbackHandler::new(
        config("http://127.0.0.1:1"),
        Arc::new(InMemoryMerchantStore::new()),
    )
    .unwrap();

    let state = handler.codec().encode("conv-n");
    let outcome = handler.handle(&callback_query(&state, "code-n")).await;

    let error = outcome.error.expect("flow should fail");
    assert!(matches!(error, OAuthError::NetworkError { .. }));
    assert!(error.is_retryable());
    assert!(outcome.redirect_url.contains("error=exchange_failed"));
}

#[tokio::test]
async fn test_unavailable_store_is_storage_unavailable() {
    let server = token_endpoint(200, granted()).await;
    let store = Arc::new(InMemoryMerchantStore::new());
    store.set_unavailable(true);
    let handler = OAuthCallbackHandler::new(config(&server.uri()), store.clone()).unwrap();

    let state = handler.codec().encode("conv-s");
    let outcome = handler.handle(&callback_query(&state, "code-s")).await;

    assert!(matches!(
        outcome.error,
        Some(OAuthError::StorageUnavailable(_))
    ));
    assert!(outcome
        .redirect_url
        .ends_with("error=storage_unavailable&conversation_id=conv-s"));
}

#[tokio::test]
async fn test_concurrent_callbacks_for_one_shop_create_one_merchant() {
    let server = token_endpoint(200, granted()).await;
    let store = sqlite_store().await;
    let handler = Arc::new(OAuthCallbackHandler::new(config(&server.uri()), store).unwrap());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let state = handler.codec().encode(&format!("conv-{i}"));
                handler.handle(&callback_query(&state, &format!("code-{i}"))).await
            })
        })
        .collect();

    let mut new_count = 0;
    for task in tasks {
        let outcome = task.await.unwrap();
        assert!(outcome.is_success(), "{:?}", outcome.error);
        if outcome.redirect_url.contains("is_new=true") {
            new_count += 1;
        }
    }
    assert_eq!(new_count, 1);
}
