//! Merchant records and their storage.
//!
//! A [`Merchant`] exists once per shop domain. It is created on the first
//! successful OAuth flow for a shop and refreshed (new access token, new
//! `last_seen`) on every later one. [`MerchantStore::upsert`] decides
//! "new or returning" atomically, so two concurrent callbacks for the same
//! shop never both see `is_new == true`.
//!
//! # Backends
//!
//! - [`SqliteMerchantStore`]: the production backend; one atomic
//!   `INSERT … ON CONFLICT … RETURNING` statement per upsert
//! - [`InMemoryMerchantStore`]: process-local, for tests and local runs

mod memory;
mod sqlite;

pub use memory::InMemoryMerchantStore;
pub use sqlite::SqliteMerchantStore;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthScopes;
use crate::config::ShopDomain;

/// A merchant that has completed the OAuth flow.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Merchant {
    /// Stable identifier, `merchant_<shop slug>`.
    pub id: String,
    /// The shop's `*.myshopify.com` domain; unique.
    pub shop_domain: ShopDomain,
    /// Admin API token from the latest exchange.
    #[serde(skip)]
    pub access_token: String,
    /// Scopes granted with that token.
    pub scopes: AuthScopes,
    /// First successful authentication. Never changes.
    pub created_at: DateTime<Utc>,
    /// Latest successful authentication.
    pub last_seen: DateTime<Utc>,
    /// When the record lapses, if the store has a TTL.
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Merchant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Merchant")
            .field("id", &self.id)
            .field("shop_domain", &self.shop_domain)
            .field("access_token", &"*****")
            .field("scopes", &self.scopes)
            .field("created_at", &self.created_at)
            .field("last_seen", &self.last_seen)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Derives the merchant ID for a shop.
///
/// The shop name is lowercased with every character outside `[a-z0-9]`
/// replaced by `_`.
///
/// ```rust
/// use shopify_onboarding::merchant::merchant_id_for;
/// use shopify_onboarding::ShopDomain;
///
/// let shop = ShopDomain::new("cool-shoes-42").unwrap();
/// assert_eq!(merchant_id_for(&shop), "merchant_cool_shoes_42");
/// ```
#[must_use]
pub fn merchant_id_for(shop: &ShopDomain) -> String {
    let slug: String = shop
        .shop_name()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("merchant_{slug}")
}

/// Result of [`MerchantStore::upsert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// The record as written.
    pub merchant: Merchant,
    /// `true` if this call created the record.
    pub is_new: bool,
}

/// Storage failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend returned an error or could not be reached.
    #[error("Merchant store unavailable: {message}")]
    Unavailable {
        /// Backend error text.
        message: String,
    },

    /// The call did not complete within the configured bound.
    #[error("Merchant store timed out after {after:?}")]
    Timeout {
        /// The bound that was exceeded.
        after: Duration,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}

/// Persistence for merchant records, keyed by shop domain.
#[async_trait]
pub trait MerchantStore: Send + Sync {
    /// Looks up a merchant. Expired records read as absent.
    async fn get(&self, shop: &ShopDomain) -> Result<Option<Merchant>, StoreError>;

    /// Creates or refreshes the merchant for `shop`.
    ///
    /// A new record gets `created_at = last_seen = now`. An existing one
    /// keeps `id` and `created_at` and has its token, scopes and `last_seen`
    /// replaced. An expired record is replaced as if new. The existence
    /// check and the write are one atomic step.
    async fn upsert(
        &self,
        shop: &ShopDomain,
        access_token: &str,
        scopes: &AuthScopes,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

fn expiry_from(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .and_then(|ttl| now.checked_add_signed(ttl))
}
