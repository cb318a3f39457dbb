//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPIFY_API_KEY` - OAuth client ID
//! - `SHOPIFY_API_SECRET` - OAuth client secret, also the callback HMAC key
//! - `OAUTH_STATE_SECRET` - state token signing secret (min 32 bytes)
//! - `APP_URL` - public base URL of this service
//! - `FRONTEND_URL` - where the browser lands after the flow
//!
//! ## Optional
//! - `SHOPIFY_API_SECRET_OLD` - previous secret during key rotation
//! - `SHOPIFY_SCOPES` - comma-separated scopes requested at install
//! - `OAUTH_STATE_TTL_SECS` - state lifetime (default: 300)
//! - `HTTP_TIMEOUT_SECS` - token exchange and storage timeout (default: 10)
//! - `MERCHANT_TTL_SECS` - merchant record TTL (default: none)
//! - `DATABASE_URL` - SQLite URL (default: `sqlite://onboarding.db?mode=rwc`)
//! - `HOST` - bind address (default: 127.0.0.1)
//! - `PORT` - listen port (default: 8000)
//! - `LOG_FORMAT` - `json` or `text` (default: text)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use super::{ApiKey, ApiSecretKey, HostUrl, OnboardingConfig, StateSecret};
use crate::auth::AuthScopes;
use crate::error::ConfigError;

const DEFAULT_DATABASE_URL: &str = "sqlite://onboarding.db?mode=rwc";
const DEFAULT_PORT: u16 = 8000;

/// Log output format for the binary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidEnvVar {
                name: "LOG_FORMAT",
                reason: format!("expected 'json' or 'text', got '{other}'"),
            }),
        }
    }
}

/// Full configuration for the server binary.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// OAuth flow configuration.
    pub onboarding: OnboardingConfig,
    /// SQLite connection URL.
    pub database_url: String,
    /// Address to bind.
    pub host: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Loads configuration from the process environment, reading a `.env`
    /// file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is not an error
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnvVar { name })
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut builder = OnboardingConfig::builder()
            .api_key(ApiKey::new(required("SHOPIFY_API_KEY")?)?)
            .api_secret_key(ApiSecretKey::new(required("SHOPIFY_API_SECRET")?)?)
            .state_secret(StateSecret::new(required("OAUTH_STATE_SECRET")?)?)
            .app_url(HostUrl::new(required("APP_URL")?)?)
            .frontend_url(HostUrl::new(required("FRONTEND_URL")?)?);

        if let Some(old) = optional("SHOPIFY_API_SECRET_OLD") {
            builder = builder.old_api_secret_key(ApiSecretKey::new(old)?);
        }
        if let Some(scopes) = optional("SHOPIFY_SCOPES") {
            builder = builder.scopes(scopes.parse::<AuthScopes>()?);
        }
        if let Some(secs) = optional("OAUTH_STATE_TTL_SECS") {
            builder = builder.state_ttl(parse_secs("OAUTH_STATE_TTL_SECS", &secs)?);
        }
        if let Some(secs) = optional("HTTP_TIMEOUT_SECS") {
            let timeout = parse_secs("HTTP_TIMEOUT_SECS", &secs)?;
            builder = builder.http_timeout(timeout).store_timeout(timeout);
        }
        if let Some(secs) = optional("MERCHANT_TTL_SECS") {
            builder = builder.merchant_ttl(parse_secs("MERCHANT_TTL_SECS", &secs)?);
        }

        let host = match optional("HOST") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidEnvVar {
                name: "HOST",
                reason: format!("{e}"),
            })?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        let port = match optional("PORT") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidEnvVar {
                name: "PORT",
                reason: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };
        let log_format = optional("LOG_FORMAT")
            .map(|raw| raw.parse())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            onboarding: builder.build()?,
            database_url: optional("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            host,
            port,
            log_format,
        })
    }

    /// Returns the socket address to bind.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_secs(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidEnvVar {
        name,
        reason: format!("{e}"),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("SHOPIFY_API_KEY", "key".to_string()),
            ("SHOPIFY_API_SECRET", "secret".to_string()),
            (
                "OAUTH_STATE_SECRET",
                "0123456789abcdef0123456789abcdef".to_string(),
            ),
            ("APP_URL", "https://auth.example.com".to_string()),
            ("FRONTEND_URL", "https://chat.example.com".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<ServerConfig, ConfigError> {
        ServerConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn test_minimal_environment_uses_defaults() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.onboarding.state_ttl(), Duration::from_secs(300));
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8000");
    }

    #[test]
    fn test_missing_required_variable_is_named() {
        let mut env = base_env();
        env.remove("OAUTH_STATE_SECRET");

        assert!(matches!(
            load(&env),
            Err(ConfigError::MissingEnvVar {
                name: "OAUTH_STATE_SECRET"
            })
        ));
    }

    #[test]
    fn test_blank_required_variable_counts_as_missing() {
        let mut env = base_env();
        env.insert("FRONTEND_URL", "   ".to_string());

        assert!(matches!(
            load(&env),
            Err(ConfigError::MissingEnvVar {
                name: "FRONTEND_URL"
            })
        ));
    }

    #[test]
    fn test_optional_variables_are_applied() {
        let mut env = base_env();
        env.insert("SHOPIFY_API_SECRET_OLD", "old".to_string());
        env.insert("SHOPIFY_SCOPES", "read_products".to_string());
        env.insert("OAUTH_STATE_TTL_SECS", "120".to_string());
        env.insert("HTTP_TIMEOUT_SECS", "5".to_string());
        env.insert("MERCHANT_TTL_SECS", "3600".to_string());
        env.insert("DATABASE_URL", "sqlite::memory:".to_string());
        env.insert("HOST", "0.0.0.0".to_string());
        env.insert("PORT", "9090".to_string());
        env.insert("LOG_FORMAT", "JSON".to_string());

        let config = load(&env).unwrap();

        assert!(config.onboarding.old_api_secret_key().is_some());
        assert_eq!(config.onboarding.state_ttl(), Duration::from_secs(120));
        assert_eq!(config.onboarding.http_timeout(), Duration::from_secs(5));
        assert_eq!(config.onboarding.store_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.onboarding.merchant_ttl(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:9090");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut env = base_env();
        env.insert("PORT", "eighty".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::InvalidEnvVar { name: "PORT", .. })
        ));

        let mut env = base_env();
        env.insert("OAUTH_STATE_TTL_SECS", "0".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::InvalidEnvVar {
                name: "OAUTH_STATE_TTL_SECS",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        let mut env = base_env();
        env.insert("LOG_FORMAT", "xml".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::InvalidEnvVar {
                name: "LOG_FORMAT",
                ..
            })
        ));
    }
}
