//! Authentication for the onboarding service.
//!
//! # Overview
//!
//! - [`AuthScopes`]: a set of OAuth scopes with implied scope handling
//! - [`oauth`]: the OAuth authorization code flow, state tokens, token
//!   exchange and the callback state machine
//!
//! # Example
//!
//! ```rust
//! use shopify_onboarding::AuthScopes;
//!
//! let requested: AuthScopes = "write_products".parse().unwrap();
//! let granted: AuthScopes = "read_products".parse().unwrap();
//!
//! // write_products implies read_products, but not the reverse
//! assert!(requested.covers(&granted));
//! assert_eq!(granted.missing_from(&requested), vec!["write_products"]);
//! ```

pub mod oauth;
mod scopes;

pub use scopes::AuthScopes;
