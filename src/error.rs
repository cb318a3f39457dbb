//! Configuration error types for the onboarding service.
//!
//! All configuration constructors return `Result<T, ConfigError>` to enable
//! fail-fast validation at startup. Error messages are designed to be clear
//! and actionable.
//!
//! # Example
//!
//! ```rust
//! use shopify_onboarding::{ApiKey, ConfigError};
//!
//! let result = ApiKey::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyApiKey)));
//! ```

use thiserror::Error;

/// Errors that can occur while building or loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// API key cannot be empty.
    #[error("API key cannot be empty. Please provide a valid Shopify API key.")]
    EmptyApiKey,

    /// API secret key cannot be empty.
    #[error("API secret key cannot be empty. Please provide a valid Shopify API secret key.")]
    EmptyApiSecretKey,

    /// State signing secret is too short to be useful as an HMAC key.
    #[error("State secret must be at least {min} bytes long.")]
    WeakStateSecret {
        /// The minimum accepted length.
        min: usize,
    },

    /// Shop domain is invalid.
    #[error("Invalid shop domain '{domain}'. Expected format: 'shop-name' or 'shop-name.myshopify.com'.")]
    InvalidShopDomain {
        /// The invalid domain that was provided.
        domain: String,
    },

    /// Scopes are invalid.
    #[error("Invalid scopes: {reason}")]
    InvalidScopes {
        /// The reason the scopes are invalid.
        reason: String,
    },

    /// A required field is missing.
    #[error("Missing required field: '{field}'. This field must be set before building the configuration.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// Host URL is invalid.
    #[error("Invalid URL '{url}'. Please provide a valid URL with scheme (e.g., 'https://myapp.example.com').")]
    InvalidHostUrl {
        /// The invalid URL that was provided.
        url: String,
    },

    /// A required environment variable is not set.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// The variable name.
        name: &'static str,
    },

    /// An environment variable is set but cannot be parsed.
    #[error("Invalid environment variable {name}: {reason}")]
    InvalidEnvVar {
        /// The variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The outbound HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {reason}")]
    HttpClient {
        /// The underlying builder error.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_api_key_error_message() {
        let error = ConfigError::EmptyApiKey;
        let message = error.to_string();
        assert!(message.contains("API key cannot be empty"));
        assert!(message.contains("valid Shopify API key"));
    }

    #[test]
    fn test_invalid_shop_domain_error_message() {
        let error = ConfigError::InvalidShopDomain {
            domain: "bad domain!".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("bad domain!"));
        assert!(message.contains("Expected format"));
    }

    #[test]
    fn test_weak_state_secret_mentions_minimum() {
        let error = ConfigError::WeakStateSecret { min: 32 };
        assert!(error.to_string().contains("32"));
    }

    #[test]
    fn test_env_errors_name_the_variable() {
        let missing = ConfigError::MissingEnvVar {
            name: "SHOPIFY_API_KEY",
        };
        assert!(missing.to_string().contains("SHOPIFY_API_KEY"));

        let invalid = ConfigError::InvalidEnvVar {
            name: "PORT",
            reason: "not a number".to_string(),
        };
        assert!(invalid.to_string().contains("PORT"));
        assert!(invalid.to_string().contains("not a number"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let error = ConfigError::EmptyApiKey;
        let _: &dyn std::error::Error = &error;
    }
}
