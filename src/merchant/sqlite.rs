//! SQLite-backed [`MerchantStore`].
//!
//! One table, `merchants`, keyed by `shop_domain`. Every upsert is a single
//! `INSERT … ON CONFLICT(shop_domain) DO UPDATE … RETURNING` statement, so
//! the "does this shop exist?" decision and the write cannot interleave with
//! another writer. A `generation` counter is 1 on insert and incremented on
//! update; `is_new` is read back from the same statement as
//! `generation == 1`.
//!
//! # TTL
//!
//! With a TTL configured, each write sets `expires_at = now + ttl`. Reads
//! ignore expired rows, and an upsert over an expired row resets
//! `created_at` and `generation`, so the merchant counts as new again.
//!
//! Timestamps are stored as unix seconds.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{expiry_from, merchant_id_for, Merchant, MerchantStore, StoreError, UpsertOutcome};
use crate::auth::AuthScopes;
use crate::config::ShopDomain;

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS merchants (
    shop_domain  TEXT PRIMARY KEY NOT NULL,
    merchant_id  TEXT NOT NULL,
    access_token TEXT NOT NULL,
    scopes       TEXT NOT NULL DEFAULT '',
    created_at   INTEGER NOT NULL,
    last_seen    INTEGER NOT NULL,
    expires_at   INTEGER,
    generation   INTEGER NOT NULL DEFAULT 1
)
";

const UPSERT: &str = r"
INSERT INTO merchants
    (shop_domain, merchant_id, access_token, scopes, created_at, last_seen, expires_at, generation)
VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, 1)
ON CONFLICT(shop_domain) DO UPDATE SET
    access_token = excluded.access_token,
    scopes = excluded.scopes,
    last_seen = excluded.last_seen,
    expires_at = excluded.expires_at,
    created_at = CASE
        WHEN merchants.expires_at IS NOT NULL AND merchants.expires_at <= excluded.last_seen
        THEN excluded.created_at
        ELSE merchants.created_at
    END,
    generation = CASE
        WHEN merchants.expires_at IS NOT NULL AND merchants.expires_at <= excluded.last_seen
        THEN 1
        ELSE merchants.generation + 1
    END
RETURNING merchant_id, shop_domain, access_token, scopes, created_at, last_seen, expires_at, generation
";

const SELECT_ONE: &str = r"
SELECT merchant_id, shop_domain, access_token, scopes, created_at, last_seen, expires_at, generation
FROM merchants
WHERE shop_domain = ?1 AND (expires_at IS NULL OR expires_at > ?2)
";

/// SQLite implementation of [`MerchantStore`].
#[derive(Clone, Debug)]
pub struct SqliteMerchantStore {
    pool: SqlitePool,
    ttl: Option<Duration>,
}

impl SqliteMerchantStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool, ttl: Option<Duration>) -> Self {
        Self { pool, ttl }
    }

    /// Opens a pool for `database_url`, creating the file if needed.
    ///
    /// In-memory URLs get a single long-lived connection, since every
    /// SQLite `:memory:` connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is invalid or the
    /// database cannot be opened.
    pub async fn connect(database_url: &str, ttl: Option<Duration>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        Ok(Self::new(pool, ttl))
    }

    /// Creates the `merchants` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Looks up a merchant as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on any database error.
    pub async fn get_at(
        &self,
        shop: &ShopDomain,
        now: DateTime<Utc>,
    ) -> Result<Option<Merchant>, StoreError> {
        let row = sqlx::query(SELECT_ONE)
            .bind(shop.as_ref())
            .bind(now.timestamp())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| merchant_from_row(&row).map(|(merchant, _)| merchant))
            .transpose()
    }

    /// Upserts a merchant as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] on any database error.
    pub async fn upsert_at(
        &self,
        shop: &ShopDomain,
        access_token: &str,
        scopes: &AuthScopes,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let expires_at = expiry_from(now, self.ttl).map(|t| t.timestamp());

        let row = sqlx::query(UPSERT)
            .bind(shop.as_ref())
            .bind(merchant_id_for(shop))
            .bind(access_token)
            .bind(scopes.to_string())
            .bind(now.timestamp())
            .bind(expires_at)
            .fetch_one(&self.pool)
            .await?;

        let (merchant, generation) = merchant_from_row(&row)?;
        Ok(UpsertOutcome {
            merchant,
            is_new: generation == 1,
        })
    }
}

#[async_trait]
impl MerchantStore for SqliteMerchantStore {
    async fn get(&self, shop: &ShopDomain) -> Result<Option<Merchant>, StoreError> {
        self.get_at(shop, Utc::now()).await
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
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn merchant_from_row(row: &SqliteRow) -> Result<(Merchant, i64), StoreError> {
    let corrupt = |what: &str| StoreError::Unavailable {
        message: format!("corrupt merchant row: {what}"),
    };

    let shop_domain: String = row.try_get("shop_domain")?;
    let scopes: String = row.try_get("scopes")?;
    let created_at: i64 = row.try_get("created_at")?;
    let last_seen: i64 = row.try_get("last_seen")?;
    let expires_at: Option<i64> = row.try_get("expires_at")?;

    let merchant = Merchant {
        id: row.try_get("merchant_id")?,
        shop_domain: ShopDomain::new(shop_domain).map_err(|_| corrupt("shop_domain"))?,
        access_token: row.try_get("access_token")?,
        scopes: scopes.parse().map_err(|_| corrupt("scopes"))?,
        created_at: DateTime::from_timestamp(created_at, 0).ok_or_else(|| corrupt("created_at"))?,
        last_seen: DateTime::from_timestamp(last_seen, 0).ok_or_else(|| corrupt("last_seen"))?,
        expires_at: expires_at
            .map(|ts| DateTime::from_timestamp(ts, 0).ok_or_else(|| corrupt("expires_at")))
            .transpose()?,
    };

    Ok((merchant, row.try_get("generation")?))
}
