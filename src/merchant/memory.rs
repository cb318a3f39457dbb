//! Process-local [`MerchantStore`] for tests and local development.
//!
//! Records live in a `HashMap` behind a mutex, so they vanish on restart and
//! are not shared between instances. The server binary always uses
//! [`SqliteMerchantStore`](super::SqliteMerchantStore).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{expiry_from, merchant_id_for, Merchant, MerchantStore, StoreError, UpsertOutcome};
use crate::auth::AuthScopes;
use crate::config::ShopDomain;

/// In-memory implementation of [`MerchantStore`].
///
/// The mutex is held across the whole check-and-write, which gives the same
/// per-shop atomicity as the SQLite backend.
#[derive(Debug, Default)]
pub struct InMemoryMerchantStore {
    merchants: Mutex<HashMap<ShopDomain, Merchant>>,
    ttl: Option<Duration>,
    unavailable: AtomicBool,
}

impl InMemoryMerchantStore {
    /// Creates an empty store with no TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose records lapse after `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    ///
    /// Lets tests exercise the storage failure path.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of records, expired ones included.
    pub async fn len(&self) -> usize {
        self.merchants.lock().await.len()
    }

    /// Returns `true` if no record has ever been written.
    pub async fn is_empty(&self) -> bool {
        self.merchants.lock().await.is_empty()
    }

    /// Upserts a merchant as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store was marked unavailable.
    pub async fn upsert_at(
        &self,
        shop: &ShopDomain,
        access_token: &str,
        scopes: &AuthScopes,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        self.check_available()?;
        let expires_at = expiry_from(now, self.ttl);

        let mut merchants = self.merchants.lock().await;
        let live = merchants
            .get_mut(shop)
            .filter(|existing| existing.expires_at.map_or(true, |at| at > now));

        if let Some(existing) = live {
            existing.access_token = access_token.to_string();
            existing.scopes = scopes.clone();
            existing.last_seen = now;
            existing.expires_at = expires_at;
            return Ok(UpsertOutcome {
                merchant: existing.clone(),
                is_new: false,
            });
        }

        let merchant = Merchant {
            id: merchant_id_for(shop),
            shop_domain: shop.clone(),
            access_token: access_token.to_string(),
            scopes: scopes.clone(),
            created_at: now,
            last_seen: now,
            expires_at,
        };
        merchants.insert(shop.clone(), merchant.clone());

        Ok(UpsertOutcome {
            merchant,
            is_new: true,
        })
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MerchantStore for InMemoryMerchantStore {
    async fn get(&self, shop: &ShopDomain) -> Result<Option<Merchant>, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        Ok(self
            .merchants
            .lock()
            .await
            .get(shop)
            .filter(|m| m.expires_at.map_or(true, |at| at > now))
            .cloned())
    }

    async fn upsert(
        &self,
        shop: &ShopDomain,
        access_token: &str,
        scopes: &AuthScopes,
    ) -> Result<UpsertOutcome, StoreError> {
        self.upsert_at(shop, access_token, scopes, Utc::now()).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
