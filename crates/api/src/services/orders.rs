//! Order engine.
//!
//! Turns a cart snapshot into an immutable order through the store's atomic
//! `place_order`, and cancels orders while their status allows it. Registered
//! [`OrderObserver`]s hear about both after the store has committed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ecommerce_api_core::{AccountId, AddressType, CurrencyCode, Email, OrderId, OrderStatus, ProductId};

use crate::cache::{CacheClass, CacheLayer};
use crate::clock::Clock;
use crate::db::{OrderStore, RepositoryError};
use crate::error::add_breadcrumb;
use crate::models::{
    Address, NewOrder, Order, OrderLine, OrderOwner, OrderPage, OrderSummary, PageRequest,
    Pagination,
};
use crate::services::cart::{CartError, CartManager};
use crate::services::locks::AccountLocks;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Rejected input.
    #[error("{0}")]
    Validation(String),

    #[error("cart is empty")]
    EmptyCart,

    /// Unknown order, or one the requester may not see.
    #[error("order not found")]
    NotFound,

    #[error("order cannot be cancelled while {0}")]
    NotCancellable(OrderStatus),

    #[error("insufficient stock for product {product_id}: only {available} available")]
    InsufficientStock { product_id: ProductId, available: u32 },

    #[error("cart error: {0}")]
    Cart(#[from] CartError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Hooks run after an order change has been committed.
///
/// Observers run synchronously on the request task and cannot fail the
/// request.
pub trait OrderObserver: Send + Sync {
    fn order_placed(&self, _order: &Order) {}

    fn order_cancelled(&self, _order: &Order) {}
}

/// Records order activity as Sentry breadcrumbs.
pub struct BreadcrumbObserver;

impl OrderObserver for BreadcrumbObserver {
    fn order_placed(&self, order: &Order) {
        let id = order.id.to_string();
        let total = order.totals.total.to_string();
        add_breadcrumb(
            "order",
            "Order placed",
            Some(&[("order_id", id.as_str()), ("total", total.as_str())]),
        );
    }

    fn order_cancelled(&self, order: &Order) {
        let id = order.id.to_string();
        add_breadcrumb("order", "Order cancelled", Some(&[("order_id", id.as_str())]));
    }
}

/// Input for [`OrderEngine::create_order`].
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub billing: Address,
    #[serde(default)]
    pub shipping: Option<Address>,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub payment_method_title: Option<String>,
    #[serde(default)]
    pub customer_note: Option<String>,
}

/// One entry of the status enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub slug: String,
    pub label: String,
}

/// Order engine.
pub struct OrderEngine {
    orders: Arc<dyn OrderStore>,
    carts: Arc<CartManager>,
    locks: Arc<AccountLocks>,
    cache: CacheLayer,
    clock: Arc<dyn Clock>,
    currency: CurrencyCode,
    observers: Vec<Arc<dyn OrderObserver>>,
}

impl OrderEngine {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        carts: Arc<CartManager>,
        locks: Arc<AccountLocks>,
        cache: CacheLayer,
        clock: Arc<dyn Clock>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            orders,
            carts,
            locks,
            cache,
            clock,
            currency,
            observers: Vec::new(),
        }
    }

    /// Register an observer for committed order changes.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn OrderObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Place an order from the account's cart.
    ///
    /// Stock decrement, order insert and cart clearing happen in one store
    /// operation; on any failure nothing is applied.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyCart` for an empty cart, `Validation` for
    /// missing billing fields or payment method, and `InsufficientStock` if a
    /// line can no longer be fulfilled.
    pub async fn create_order(
        &self,
        account: AccountId,
        request: CreateOrder,
    ) -> Result<Order, OrderError> {
        let _guard = self.locks.lock(account).await;

        let cart = self.carts.cart(account).await?;
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let billing = request.billing.trimmed();
        require_fields(&billing, AddressType::Billing)?;
        let email = billing
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| OrderError::Validation(format!("billing email: {e}")))?
            .ok_or_else(|| OrderError::Validation("billing email is required".to_owned()))?;

        let shipping = match request.shipping.map(Address::trimmed) {
            Some(shipping) if !shipping.is_empty() => {
                require_fields(&shipping, AddressType::Shipping)?;
                shipping.as_shipping()
            }
            _ => billing.as_shipping(),
        };

        let payment_method = request.payment_method.trim().to_owned();
        if payment_method.is_empty() {
            return Err(OrderError::Validation("payment_method is required".to_owned()));
        }
        let payment_method_title = request
            .payment_method_title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_payment_title(&payment_method).to_owned());

        let coupons = self.carts.coupons(&cart).await?;
        let totals = cart.totals(&coupons);

        let order = self
            .orders
            .place_order(NewOrder {
                account_id: account,
                email,
                currency: self.currency,
                lines: cart.lines.iter().map(OrderLine::from).collect(),
                coupons: coupons.into_iter().map(|c| c.code).collect(),
                billing,
                shipping,
                payment_method,
                payment_method_title,
                customer_note: request.customer_note.unwrap_or_default().trim().to_owned(),
                totals,
                created_at: self.clock.now(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::InsufficientStock {
                    product_id,
                    available,
                } => OrderError::InsufficientStock {
                    product_id,
                    available,
                },
                RepositoryError::NotFound => OrderError::Validation(
                    "an item in the cart is no longer available".to_owned(),
                ),
                other => OrderError::Repository(other),
            })?;

        self.carts.invalidate(account).await;
        self.cache.bump_orders(account);
        tracing::info!(account_id = %account, order_id = %order.id, total = %order.totals.total, "Order placed");

        for observer in &self.observers {
            observer.order_placed(&order);
        }
        Ok(order)
    }

    /// Cancel an order visible to `owner`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist or is not
    /// visible, and `OrderError::NotCancellable` unless it is pending, on hold
    /// or processing.
    pub async fn cancel_order(&self, owner: &OrderOwner, id: OrderId) -> Result<Order, OrderError> {
        let _guard = self.locks.lock(owner.account_id).await;

        let order = self.owned(owner, id).await?;
        if !order.status.is_cancellable() {
            return Err(OrderError::NotCancellable(order.status));
        }

        let cancelled = self
            .orders
            .cancel_order(id, self.clock.now())
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => OrderError::NotFound,
                other => OrderError::Repository(other),
            })?;
        let Some(cancelled) = cancelled else {
            // Moved on since it was cached
            self.cache.delete(&order_key(id)).await;
            return Err(OrderError::NotCancellable(order.status));
        };

        self.cache.delete(&order_key(id)).await;
        self.cache.bump_orders(owner.account_id);
        tracing::info!(account_id = %owner.account_id, order_id = %id, "Order cancelled");

        for observer in &self.observers {
            observer.order_cancelled(&cancelled);
        }
        Ok(cancelled)
    }

    /// One order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist or is not
    /// visible to `owner`.
    pub async fn get_order(&self, owner: &OrderOwner, id: OrderId) -> Result<Order, OrderError> {
        let key = order_key(id);
        let order = match self.cache.get::<Order>(&key).await {
            Some(order) => order,
            None => {
                let order = self.orders.order(id).await?.ok_or(OrderError::NotFound)?;
                self.cache.put(CacheClass::Order, &key, &order).await;
                order
            }
        };

        if order.is_visible_to(owner) {
            Ok(order)
        } else {
            Err(OrderError::NotFound)
        }
    }

    /// A page of orders visible to `owner`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn list_orders(
        &self,
        owner: &OrderOwner,
        page: PageRequest,
        status: Option<OrderStatus>,
    ) -> Result<OrderPage, OrderError> {
        let page_no = page.page.to_string();
        let per_page = page.per_page.to_string();
        let key = self.cache.orders_list_key(
            owner.account_id,
            &[
                owner.email.as_str(),
                &page_no,
                &per_page,
                status.map_or("any", |s| s.as_str()),
            ],
        );
        if let Some(cached) = self.cache.get::<OrderPage>(&key).await {
            return Ok(cached);
        }

        let (orders, total) = self.orders.orders_for(owner, status, page).await?;
        let listing = OrderPage {
            orders: orders.iter().map(OrderSummary::from).collect(),
            pagination: Pagination::new(page, total),
        };
        self.cache.put(CacheClass::OrdersList, &key, &listing).await;
        Ok(listing)
    }

    /// The status enumeration with labels.
    pub async fn statuses(&self) -> Vec<StatusEntry> {
        let key = CacheLayer::key(CacheClass::Statuses, &["all"]);
        if let Some(cached) = self.cache.get::<Vec<StatusEntry>>(&key).await {
            return cached;
        }

        let statuses: Vec<StatusEntry> = OrderStatus::ALL
            .iter()
            .map(|status| StatusEntry {
                slug: status.as_str().to_owned(),
                label: status.label().to_owned(),
            })
            .collect();
        self.cache.put(CacheClass::Statuses, &key, &statuses).await;
        statuses
    }

    async fn owned(&self, owner: &OrderOwner, id: OrderId) -> Result<Order, OrderError> {
        self.orders
            .order(id)
            .await?
            .filter(|order| order.is_visible_to(owner))
            .ok_or(OrderError::NotFound)
    }
}

fn order_key(id: OrderId) -> String {
    CacheLayer::key(CacheClass::Order, &[&id.to_string()])
}

fn require_fields(address: &Address, kind: AddressType) -> Result<(), OrderError> {
    let missing = address.missing_fields(kind);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(OrderError::Validation(format!(
            "missing {kind} fields: {}",
            missing.join(", ")
        )))
    }
}

fn default_payment_title(method: &str) -> &str {
    match method {
        "bacs" => "Direct bank transfer",
        "cheque" => "Check payments",
        "cod" => "Cash on delivery",
        other => other,
    }
}
