//! Storage collaborators.
//!
//! Every store the services talk to is a trait object so the same services
//! run against `PostgreSQL` in production and [`memory::MemoryStore`] in tests
//! and local development.
//!
//! ## Tables (`PostgreSQL`)
//!
//! - `accounts` - Customers, credentials and both addresses
//! - `sessions` - Live session tokens, keyed by token digest
//! - `products`, `variations`, `coupons` - Catalog and pricing data
//! - `carts` - One JSONB cart document per account
//! - `orders` - Placed orders with JSONB line and address snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p ecommerce-api-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;
pub mod seed;
mod timed;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use ecommerce_api_core::{AccountId, OrderId, OrderStatus, ProductId, VariationId};

use crate::models::{
    Account, Cart, Coupon, NewAccount, NewOrder, Order, OrderLine, OrderOwner, PageRequest,
    Product, TokenDigest, TokenRecord, Variation,
};

pub use timed::bounded;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Unique constraint violated; the payload names the field.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store did not answer in time or refused the connection.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Not enough stock to commit an order line.
    #[error("insufficient stock for product {product_id}: {available} available")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
    },
}

impl RepositoryError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Database(sqlx::Error::PoolTimedOut))
    }
}

/// Customer accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create an account.
    ///
    /// Fails with `Conflict("username")` or `Conflict("email")` on duplicates.
    async fn insert_account(&self, account: NewAccount) -> Result<Account, RepositoryError>;

    /// Look up by id.
    async fn account(&self, id: AccountId) -> Result<Option<Account>, RepositoryError>;

    /// Look up by username or email, case-insensitively.
    async fn account_by_login(&self, identifier: &str)
    -> Result<Option<Account>, RepositoryError>;

    /// Replace the mutable fields of an existing account.
    ///
    /// Fails with `Conflict("email")` if the new email belongs to another account.
    async fn update_account(&self, account: &Account) -> Result<(), RepositoryError>;
}

/// Read access to products and variations.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn variation(&self, id: VariationId) -> Result<Option<Variation>, RepositoryError>;
}

/// Coupon lookups.
#[async_trait]
pub trait Pricing: Send + Sync {
    /// Look up a normalized coupon code.
    async fn coupon(&self, code: &str) -> Result<Option<Coupon>, RepositoryError>;
}

/// Active carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart(&self, account: AccountId) -> Result<Option<Cart>, RepositoryError>;

    async fn save_cart(&self, cart: &Cart) -> Result<(), RepositoryError>;
}

/// Placed orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Commit an order atomically.
    ///
    /// Decrements stock for every line, inserts the order and empties the
    /// account's cart. If any line lacks stock nothing is applied and
    /// `InsufficientStock` is returned.
    async fn place_order(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders visible to `owner`, newest first, with the total count.
    async fn orders_for(
        &self,
        owner: &OrderOwner,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError>;

    /// Move a cancellable order to `cancelled` and restore its stock.
    ///
    /// Returns `None` when the order's status no longer allows cancelling at
    /// commit time.
    async fn cancel_order(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError>;
}

/// Durable copy of the session token index.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(&self, record: &TokenRecord) -> Result<(), RepositoryError>;

    async fn delete_sessions(&self, digests: &[TokenDigest]) -> Result<(), RepositoryError>;

    /// Every session not yet expired at `now`.
    async fn live_sessions(&self, now: DateTime<Utc>) -> Result<Vec<TokenRecord>, RepositoryError>;
}

/// Readiness probe.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// The set of stores one server instance talks to.
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub catalog: Arc<dyn Catalog>,
    pub pricing: Arc<dyn Pricing>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    /// Every store backed by one in-memory instance.
    #[must_use]
    pub fn memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            accounts: store.clone(),
            catalog: store.clone(),
            pricing: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            sessions: store.clone(),
            health: store,
        }
    }

    /// Every store backed by one `PostgreSQL` pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            accounts: store.clone(),
            catalog: store.clone(),
            pricing: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            sessions: store.clone(),
            health: store,
        }
    }

    /// Bound every store call by `limit`; a timeout becomes `Unavailable`.
    #[must_use]
    pub fn with_timeout(self, limit: Duration) -> Self {
        Self {
            accounts: Arc::new(timed::Timed::new(self.accounts, limit)),
            catalog: Arc::new(timed::Timed::new(self.catalog, limit)),
            pricing: Arc::new(timed::Timed::new(self.pricing, limit)),
            carts: Arc::new(timed::Timed::new(self.carts, limit)),
            orders: Arc::new(timed::Timed::new(self.orders, limit)),
            sessions: Arc::new(timed::Timed::new(self.sessions, limit)),
            health: Arc::new(timed::Timed::new(self.health, limit)),
        }
    }
}

/// Which stock counter an order line draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum StockTarget {
    Product(ProductId),
    Variation(VariationId),
}

impl StockTarget {
    fn of(line: &OrderLine) -> Self {
        line.variation_id
            .map_or(Self::Product(line.product_id), Self::Variation)
    }
}

/// Units each stock counter must give up for `lines`, with the product to
/// blame if it falls short.
///
/// Ordered so that row locks are always taken in the same order.
pub(crate) fn stock_demand(lines: &[OrderLine]) -> BTreeMap<StockTarget, (ProductId, u32)> {
    let mut demand = BTreeMap::new();
    for line in lines {
        let entry = demand
            .entry(StockTarget::of(line))
            .or_insert((line.product_id, 0_u32));
        entry.1 = entry.1.saturating_add(line.quantity);
    }
    demand
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
