//! Shopify onboarding service.
//!
//! Reads configuration from the environment (see [`ServerConfig`]), opens the
//! SQLite merchant store and serves the OAuth routes until Ctrl+C or SIGTERM.

use std::error::Error;
use std::sync::Arc;

use shopify_onboarding::config::{LogFormat, ServerConfig};
use shopify_onboarding::merchant::SqliteMerchantStore;
use shopify_onboarding::server::{self, AppState};
use shopify_onboarding::OAuthCallbackHandler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format);

    let addr = config.socket_addr();
    let onboarding = config.onboarding;
    let store =
        SqliteMerchantStore::connect(&config.database_url, onboarding.merchant_ttl()).await?;
    store.migrate().await?;
    tracing::info!(database_url = %config.database_url, "merchant store ready");

    let handler = OAuthCallbackHandler::new(onboarding, Arc::new(store))?;
    let app = server::router(AppState::new(handler));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("onboarding service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopify_onboarding=info,tower_http=info".into());

    let json_layer = (format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (format == LogFormat::Text).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
