//! Read-through response cache.
//!
//! Rendered views are stored as JSON strings under deterministic keys, one
//! TTL per resource class. The cache is best-effort: a backend failure is
//! logged at `warn` and the caller recomputes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use thiserror::Error;

use ecommerce_api_core::AccountId;

use crate::config::CacheConfig;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cached entry could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the operation.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key-value store for rendered views.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Arc<str>>, CacheError>;

    async fn set(&self, key: &str, value: Arc<str>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Clone)]
struct Entry {
    value: Arc<str>,
    ttl: Duration,
}

struct PerEntryTtl;

impl moka::Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by `moka`.
pub struct MokaCache {
    inner: moka::future::Cache<String, Entry>,
}

impl MokaCache {
    /// Create a cache holding at most `max_capacity` entries.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl Cache for MokaCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<str>>, CacheError> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Arc<str>, ttl: Duration) -> Result<(), CacheError> {
        self.inner.insert(key.to_owned(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

/// Resource classes with their own TTL and key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClass {
    Cart,
    OrdersList,
    Order,
    Statuses,
    Addresses,
    Profile,
}

impl CacheClass {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::OrdersList => "orders",
            Self::Order => "order",
            Self::Statuses => "statuses",
            Self::Addresses => "addresses",
            Self::Profile => "profile",
        }
    }

    const fn default_ttl(self) -> Duration {
        match self {
            Self::Cart => Duration::from_secs(300),
            Self::OrdersList => Duration::from_secs(900),
            Self::Order | Self::Addresses | Self::Profile => Duration::from_secs(1800),
            Self::Statuses => Duration::from_secs(86_400),
        }
    }
}

/// Deterministic key material: hex SHA-256 of the parts, truncated.
#[must_use]
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(&hasher.finalize()[..16])
}

/// Typed, best-effort access to a [`Cache`] backend.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn Cache>,
    cart_ttl: Duration,
    /// Per-account generation of the orders list; bumping it orphans every
    /// cached page at once.
    order_generations: Arc<DashMap<AccountId, u64>>,
}

impl CacheLayer {
    #[must_use]
    pub fn new(backend: Arc<dyn Cache>, config: &CacheConfig) -> Self {
        Self {
            backend,
            cart_ttl: config.cart_ttl,
            order_generations: Arc::new(DashMap::new()),
        }
    }

    /// A layer over a fresh [`MokaCache`].
    #[must_use]
    pub fn moka(config: &CacheConfig) -> Self {
        Self::new(Arc::new(MokaCache::new(config.max_capacity)), config)
    }

    fn ttl(&self, class: CacheClass) -> Duration {
        match class {
            CacheClass::Cart => self.cart_ttl,
            other => other.default_ttl(),
        }
    }

    /// Full key for `parts` within `class`.
    #[must_use]
    pub fn key(class: CacheClass, parts: &[&str]) -> String {
        format!("{}:{}", class.prefix(), fingerprint(parts))
    }

    /// Key of one page of an account's order list at its current generation.
    #[must_use]
    pub fn orders_list_key(&self, account: AccountId, parts: &[&str]) -> String {
        let generation = self
            .order_generations
            .get(&account)
            .map_or(0, |g| *g)
            .to_string();
        let account = account.to_string();
        let mut all = vec![account.as_str(), generation.as_str()];
        all.extend_from_slice(parts);
        Self::key(CacheClass::OrdersList, &all)
    }

    /// Invalidate every cached page of an account's order list.
    pub fn bump_orders(&self, account: AccountId) {
        *self.order_generations.entry(account).or_insert(0) += 1;
    }

    /// Read and decode an entry; misses and failures both yield `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, key, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, key, "Dropping undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Encode and store an entry for the class TTL.
    pub async fn put<T: Serialize + Sync>(&self, class: CacheClass, key: &str, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, key, "Cache encode failed");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, Arc::from(encoded), self.ttl(class)).await {
            tracing::warn!(error = %e, key, "Cache write failed");
        }
    }

    /// Drop an entry.
    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            tracing::warn!(error = %e, key, "Cache delete failed");
        }
    }
}
