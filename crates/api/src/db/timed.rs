//! Bounded store calls.
//!
//! [`Timed`] wraps any store trait object and races each call against a
//! deadline. Dropping a `PostgreSQL` call mid-transaction rolls it back, so a
//! timed-out `place_order` leaves nothing behind.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ecommerce_api_core::{AccountId, OrderId, OrderStatus, ProductId, VariationId};

use super::{
    AccountStore, CartStore, Catalog, OrderStore, Pricing, RepositoryError, SessionStore,
    StoreHealth,
};
use crate::models::{
    Account, Cart, Coupon, NewAccount, NewOrder, Order, OrderOwner, PageRequest, Product,
    TokenDigest, TokenRecord, Variation,
};

/// Run `call`, failing with `Unavailable` if it takes longer than `limit`.
///
/// # Errors
///
/// Returns the call's own error, or `RepositoryError::Unavailable` on timeout.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>> + Send,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis(), "Store call timed out");
            Err(RepositoryError::Unavailable(format!(
                "store call exceeded {}ms",
                limit.as_millis()
            )))
        }
    }
}

/// A store whose every call is bounded by `limit`.
pub struct Timed<S: ?Sized> {
    inner: Arc<S>,
    limit: Duration,
}

impl<S: ?Sized> Timed<S> {
    pub const fn new(inner: Arc<S>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl AccountStore for Timed<dyn AccountStore> {
    async fn insert_account(&self, account: NewAccount) -> Result<Account, RepositoryError> {
        bounded(self.limit, self.inner.insert_account(account)).await
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        bounded(self.limit, self.inner.account(id)).await
    }

    async fn account_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, RepositoryError> {
        bounded(self.limit, self.inner.account_by_login(identifier)).await
    }

    async fn update_account(&self, account: &Account) -> Result<(), RepositoryError> {
        bounded(self.limit, self.inner.update_account(account)).await
    }
}

#[async_trait]
impl Catalog for Timed<dyn Catalog> {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        bounded(self.limit, self.inner.product(id)).await
    }

    async fn variation(&self, id: VariationId) -> Result<Option<Variation>, RepositoryError> {
        bounded(self.limit, self.inner.variation(id)).await
    }
}

#[async_trait]
impl Pricing for Timed<dyn Pricing> {
    async fn coupon(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        bounded(self.limit, self.inner.coupon(code)).await
    }
}

#[async_trait]
impl CartStore for Timed<dyn CartStore> {
    async fn cart(&self, account: AccountId) -> Result<Option<Cart>, RepositoryError> {
        bounded(self.limit, self.inner.cart(account)).await
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), RepositoryError> {
        bounded(self.limit, self.inner.save_cart(cart)).await
    }
}

#[async_trait]
impl OrderStore for Timed<dyn OrderStore> {
    async fn place_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        bounded(self.limit, self.inner.place_order(order)).await
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        bounded(self.limit, self.inner.order(id)).await
    }

    async fn orders_for(
        &self,
        owner: &OrderOwner,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        bounded(self.limit, self.inner.orders_for(owner, status, page)).await
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        bounded(self.limit, self.inner.cancel_order(id, now)).await
    }
}

#[async_trait]
impl SessionStore for Timed<dyn SessionStore> {
    async fn save_session(&self, record: &TokenRecord) -> Result<(), RepositoryError> {
        bounded(self.limit, self.inner.save_session(record)).await
    }

    async fn delete_sessions(&self, digests: &[TokenDigest]) -> Result<(), RepositoryError> {
        bounded(self.limit, self.inner.delete_sessions(digests)).await
    }

    async fn live_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenRecord>, RepositoryError> {
        bounded(self.limit, self.inner.live_sessions(now)).await
    }
}

#[async_trait]
impl StoreHealth for Timed<dyn StoreHealth> {
    async fn ping(&self) -> Result<(), RepositoryError> {
        bounded(self.limit, self.inner.ping()).await
    }
}
