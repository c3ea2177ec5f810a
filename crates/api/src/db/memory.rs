//! In-memory implementation of every store.
//!
//! All state sits behind one `parking_lot::RwLock`, so multi-step operations
//! such as `place_order` are atomic by construction. Nothing awaits while the
//! lock is held.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use ecommerce_api_core::{AccountId, OrderId, OrderStatus, ProductId, VariationId};

use super::seed::CatalogSeed;
use super::{
    AccountStore, CartStore, Catalog, OrderStore, Pricing, RepositoryError, SessionStore,
    StockTarget, StoreHealth, stock_demand,
};
use crate::models::{
    Account, Address, Cart, Coupon, NewAccount, NewOrder, Order, OrderOwner, PageRequest,
    Product, Stock, TokenDigest, TokenRecord, Variation,
};

#[derive(Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, Account>,
    products: HashMap<ProductId, Product>,
    variations: HashMap<VariationId, Variation>,
    coupons: HashMap<String, Coupon>,
    carts: HashMap<AccountId, Cart>,
    orders: BTreeMap<OrderId, Order>,
    sessions: HashMap<TokenDigest, TokenRecord>,
    last_account_id: i64,
    last_order_id: i64,
}

impl MemoryState {
    fn stock_mut(&mut self, target: StockTarget) -> Option<&mut Stock> {
        match target {
            StockTarget::Product(id) => self.products.get_mut(&id).map(|p| &mut p.stock),
            StockTarget::Variation(id) => self.variations.get_mut(&id).map(|v| &mut v.stock),
        }
    }

    fn stock(&self, target: StockTarget) -> Option<&Stock> {
        match target {
            StockTarget::Product(id) => self.products.get(&id).map(|p| &p.stock),
            StockTarget::Variation(id) => self.variations.get(&id).map(|v| &v.stock),
        }
    }

    fn login_taken(&self, username: &str, email: &str, except: Option<AccountId>) -> Option<&'static str> {
        self.accounts
            .values()
            .filter(|a| Some(a.id) != except)
            .find_map(|a| {
                if a.username.as_str().eq_ignore_ascii_case(username) {
                    Some("username")
                } else if a.email.as_str() == email {
                    Some("email")
                } else {
                    None
                }
            })
    }
}

/// Process-local store for tests and development.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with a catalog seed.
    #[must_use]
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let store = Self::new();
        for product in seed.products {
            store.put_product(product);
        }
        for variation in seed.variations {
            store.put_variation(variation);
        }
        for coupon in seed.coupons {
            store.put_coupon(coupon);
        }
        store
    }

    /// Insert or replace a product.
    pub fn put_product(&self, product: Product) {
        self.state.write().products.insert(product.id, product);
    }

    /// Insert or replace a variation.
    pub fn put_variation(&self, variation: Variation) {
        self.state.write().variations.insert(variation.id, variation);
    }

    /// Insert or replace a coupon, keyed by its normalized code.
    pub fn put_coupon(&self, coupon: Coupon) {
        let code = Coupon::normalize_code(&coupon.code);
        let coupon = Coupon {
            code: code.clone(),
            ..coupon
        };
        self.state.write().coupons.insert(code, coupon);
    }

    /// Move an order along its lifecycle, as fulfilment would.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order and `Conflict` for a transition
    /// the lifecycle does not allow.
    pub fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, RepositoryError> {
        let mut state = self.state.write();
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !order.status.can_transition_to(status) {
            return Err(RepositoryError::Conflict(format!(
                "cannot move order from {} to {status}",
                order.status
            )));
        }
        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    /// Tracked stock of a product, if managed.
    #[must_use]
    pub fn product_stock(&self, id: ProductId) -> Option<i64> {
        self.state.read().products.get(&id).and_then(|p| p.stock.quantity)
    }

    /// Tracked stock of a variation, if managed.
    #[must_use]
    pub fn variation_stock(&self, id: VariationId) -> Option<i64> {
        self.state.read().variations.get(&id).and_then(|v| v.stock.quantity)
    }

    /// Number of orders held.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state.read().orders.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, new: NewAccount) -> Result<Account, RepositoryError> {
        let mut state = self.state.write();
        if let Some(field) = state.login_taken(new.username.as_str(), new.email.as_str(), None) {
            return Err(RepositoryError::Conflict(field.to_owned()));
        }
        state.last_account_id += 1;
        let account = Account {
            id: AccountId::new(state.last_account_id),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            display_name: new.display_name,
            billing: Address::default(),
            shipping: Address::default(),
            default_address: None,
            registered_at: new.registered_at,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        Ok(self.state.read().accounts.get(&id).cloned())
    }

    async fn account_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, RepositoryError> {
        let identifier = identifier.trim();
        let lowered = identifier.to_lowercase();
        Ok(self
            .state
            .read()
            .accounts
            .values()
            .find(|a| {
                a.username.as_str().eq_ignore_ascii_case(identifier) || a.email.as_str() == lowered
            })
            .cloned())
    }

    async fn update_account(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        if !state.accounts.contains_key(&account.id) {
            return Err(RepositoryError::NotFound);
        }
        if state
            .accounts
            .values()
            .any(|a| a.id != account.id && a.email == account.email)
        {
            return Err(RepositoryError::Conflict("email".to_owned()));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.read().products.get(&id).cloned())
    }

    async fn variation(&self, id: VariationId) -> Result<Option<Variation>, RepositoryError> {
        Ok(self.state.read().variations.get(&id).cloned())
    }
}

#[async_trait]
impl Pricing for MemoryStore {
    async fn coupon(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        Ok(self.state.read().coupons.get(code).cloned())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart(&self, account: AccountId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.state.read().carts.get(&account).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), RepositoryError> {
        self.state.write().carts.insert(cart.account_id, cart.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.write();

        let wanted = stock_demand(&new.lines);

        // Check every line before touching anything
        for (target, (product_id, quantity)) in &wanted {
            let stock = state.stock(*target).ok_or(RepositoryError::NotFound)?;
            stock
                .check(*quantity)
                .map_err(|available| RepositoryError::InsufficientStock {
                    product_id: *product_id,
                    available,
                })?;
        }
        for (target, (_, quantity)) in &wanted {
            if let Some(stock) = state.stock_mut(*target)
                && let Some(on_hand) = stock.quantity.as_mut()
            {
                *on_hand -= i64::from(*quantity);
            }
        }

        state.last_order_id += 1;
        let order = Order {
            id: OrderId::new(state.last_order_id),
            account_id: Some(new.account_id),
            email: new.email,
            status: OrderStatus::Pending,
            currency: new.currency,
            lines: new.lines,
            coupons: new.coupons,
            billing: new.billing,
            shipping: new.shipping,
            payment_method: new.payment_method,
            payment_method_title: new.payment_method_title,
            customer_note: new.customer_note,
            totals: new.totals,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        state.orders.insert(order.id, order.clone());
        state
            .carts
            .insert(new.account_id, Cart::empty(new.account_id, new.created_at));

        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.read().orders.get(&id).cloned())
    }

    async fn orders_for(
        &self,
        owner: &OrderOwner,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let state = self.state.read();
        let mut visible: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| o.is_visible_to(owner))
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = visible.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let orders = visible
            .into_iter()
            .skip(offset)
            .take(page.per_page as usize)
            .cloned()
            .collect();
        Ok((orders, total))
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.write();
        let order = state.orders.get(&id).ok_or(RepositoryError::NotFound)?;
        if !order.status.is_cancellable() {
            return Ok(None);
        }
        let restock = stock_demand(&order.lines);

        for (target, (_, quantity)) in restock {
            if let Some(stock) = state.stock_mut(target)
                && let Some(on_hand) = stock.quantity.as_mut()
            {
                *on_hand += i64::from(quantity);
            }
        }

        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.status = OrderStatus::Cancelled;
        order.updated_at = now;
        Ok(Some(order.clone()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, record: &TokenRecord) -> Result<(), RepositoryError> {
        self.state
            .write()
            .sessions
            .insert(record.digest.clone(), record.clone());
        Ok(())
    }

    async fn delete_sessions(&self, digests: &[TokenDigest]) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        for digest in digests {
            state.sessions.remove(digest);
        }
        Ok(())
    }

    async fn live_sessions(&self, now: DateTime<Utc>) -> Result<Vec<TokenRecord>, RepositoryError> {
        Ok(self
            .state
            .read()
            .sessions
            .values()
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
