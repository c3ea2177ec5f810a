//! Cart manager.
//!
//! Every mutation loads the account's cart, validates against the live
//! catalog, saves it and drops the cached view, all under the account lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ecommerce_api_core::{AccountId, CurrencyCode, LineKey, Money, ProductId, VariationId};

use crate::cache::{CacheClass, CacheLayer};
use crate::clock::Clock;
use crate::db::{CartStore, Catalog, Pricing, RepositoryError};
use crate::models::cart::MAX_LINE_QUANTITY;
use crate::models::{
    Cart, CartItemView, CartLine, CartSummary, CartTotals, CartView, Coupon, ProductKind,
    RemovedLineSummary, Stock,
};
use crate::services::locks::AccountLocks;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Rejected input.
    #[error("{0}")]
    Validation(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("{0} cannot be purchased")]
    NotPurchasable(String),

    #[error("please choose product options")]
    VariationRequired,

    #[error("the chosen variation does not belong to this product")]
    InvalidVariation,

    #[error("only {available} items available")]
    InsufficientStock { available: u32 },

    #[error("cart item not found")]
    LineNotFound,

    #[error("coupon \"{0}\" does not exist")]
    InvalidCoupon(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Input for [`CartManager::add_item`].
#[derive(Debug, Clone, Deserialize)]
pub struct AddItem {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub variation_id: Option<VariationId>,
    /// Selected attribute values, e.g. `size -> m`.
    #[serde(default, alias = "variation")]
    pub options: BTreeMap<String, String>,
}

const fn default_quantity() -> i64 {
    1
}

/// Item count of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartCount {
    pub count: u64,
    pub is_empty: bool,
}

/// What a cart line resolves to in the live catalog.
struct Sellable {
    name: String,
    price: Money,
    stock: Stock,
    /// Simple products carry no attributes to select.
    has_options: bool,
}

impl Sellable {
    /// Check that `cart` may hold `quantity` on line `key` given every other
    /// line drawing on the same stock.
    fn check_stock(
        &self,
        cart: &Cart,
        product: ProductId,
        variation: Option<VariationId>,
        key: &LineKey,
        quantity: u32,
    ) -> Result<(), CartError> {
        let Some(available) = self.stock.limit() else {
            return Ok(());
        };
        let wanted = cart.units_of(product, variation, key) + u64::from(quantity);
        if wanted > u64::from(available) {
            return Err(CartError::InsufficientStock { available });
        }
        Ok(())
    }
}

/// Cart manager.
pub struct CartManager {
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn Catalog>,
    pricing: Arc<dyn Pricing>,
    locks: Arc<AccountLocks>,
    cache: CacheLayer,
    clock: Arc<dyn Clock>,
    currency: CurrencyCode,
}

impl CartManager {
    #[must_use]
    pub fn new(
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn Catalog>,
        pricing: Arc<dyn Pricing>,
        locks: Arc<AccountLocks>,
        cache: CacheLayer,
        clock: Arc<dyn Clock>,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            carts,
            catalog,
            pricing,
            locks,
            cache,
            clock,
            currency,
        }
    }

    /// The stored cart, or an empty one.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn cart(&self, account: AccountId) -> Result<Cart, CartError> {
        Ok(self
            .carts
            .cart(account)
            .await?
            .unwrap_or_else(|| Cart::empty(account, self.clock.now())))
    }

    /// The cart with totals recomputed at live prices.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn get_cart(&self, account: AccountId) -> Result<CartView, CartError> {
        let key = cart_key(account);
        if let Some(view) = self.cache.get::<CartView>(&key).await {
            return Ok(view);
        }

        // Mutations invalidate under this lock, so a view rendered here is
        // never older than the stored cart when it lands in the cache
        let _guard = self.locks.lock(account).await;
        if let Some(view) = self.cache.get::<CartView>(&key).await {
            return Ok(view);
        }
        let view = self.render(&self.cart(account).await?).await?;
        self.cache.put(CacheClass::Cart, &key, &view).await;
        Ok(view)
    }

    /// Item count without rendering the full view.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn count(&self, account: AccountId) -> Result<CartCount, CartError> {
        let cart = self.cart(account).await?;
        Ok(CartCount {
            count: cart.item_count(),
            is_empty: cart.is_empty(),
        })
    }

    /// Add a product, merging with an existing line for the same selection.
    ///
    /// # Errors
    ///
    /// Checks run in order: `Validation` for a quantity outside
    /// `1..=MAX_LINE_QUANTITY`, `ProductNotFound`, `NotPurchasable`,
    /// `VariationRequired`, `InvalidVariation`, then `InsufficientStock` for
    /// everything the cart would hold against the same stock.
    pub async fn add_item(&self, account: AccountId, mut item: AddItem) -> Result<CartLine, CartError> {
        let quantity = line_quantity(item.quantity)?;
        let _guard = self.locks.lock(account).await;

        let sellable = self.resolve(item.product_id, item.variation_id).await?;
        if !sellable.has_options {
            item.options.clear();
        }
        let key = LineKey::derive(item.product_id, item.variation_id, &item.options);

        let mut cart = self.cart(account).await?;
        let merged = cart.line(&key).map_or(quantity, |line| line.quantity + quantity);
        if merged > MAX_LINE_QUANTITY {
            return Err(too_many());
        }
        sellable.check_stock(&cart, item.product_id, item.variation_id, &key, merged)?;

        let line = if let Some(line) = cart.line_mut(&key) {
            line.quantity = merged;
            line.unit_price = sellable.price;
            line.name = sellable.name;
            line.clone()
        } else {
            let line = CartLine {
                key,
                product_id: item.product_id,
                variation_id: item.variation_id,
                options: item.options,
                name: sellable.name,
                quantity,
                unit_price: sellable.price,
            };
            cart.lines.push(line.clone());
            line
        };

        self.save(cart).await?;
        tracing::debug!(account_id = %account, product_id = %line.product_id, quantity = line.quantity, "Cart line added");
        Ok(line)
    }

    /// Set a line's quantity; zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` for an unknown key, `Validation` above
    /// `MAX_LINE_QUANTITY` and `InsufficientStock` if the cart would hold more
    /// than the managed stock.
    pub async fn update_quantity(
        &self,
        account: AccountId,
        key: &LineKey,
        quantity: i64,
    ) -> Result<CartView, CartError> {
        let _guard = self.locks.lock(account).await;
        let mut cart = self.cart(account).await?;

        let Some(line) = cart.line(key) else {
            return Err(CartError::LineNotFound);
        };

        if quantity <= 0 {
            cart.remove_line(key);
        } else {
            let quantity = line_quantity(quantity)?;
            let (product, variation) = (line.product_id, line.variation_id);
            let sellable = self.resolve(product, variation).await?;
            sellable.check_stock(&cart, product, variation, key, quantity)?;
            if let Some(line) = cart.line_mut(key) {
                line.quantity = quantity;
                line.unit_price = sellable.price;
            }
        }

        let cart = self.save(cart).await?;
        self.render(&cart).await
    }

    /// Remove one line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::LineNotFound` for an unknown key.
    pub async fn remove_item(
        &self,
        account: AccountId,
        key: &LineKey,
    ) -> Result<RemovedLineSummary, CartError> {
        let _guard = self.locks.lock(account).await;
        let mut cart = self.cart(account).await?;

        let previous_count = cart.item_count();
        let removed_item = cart.remove_line(key).ok_or(CartError::LineNotFound)?;
        let cart = self.save(cart).await?;

        Ok(RemovedLineSummary {
            removed_item,
            cart_summary: CartSummary {
                previous_count,
                current_count: cart.item_count(),
                is_empty: cart.is_empty(),
            },
            remaining_items: cart.lines,
        })
    }

    /// Empty the cart, returning the number of items removed.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn clear(&self, account: AccountId) -> Result<u64, CartError> {
        let _guard = self.locks.lock(account).await;
        let mut cart = self.cart(account).await?;
        let cleared = cart.clear();
        self.save(cart).await?;
        Ok(cleared)
    }

    /// Apply a coupon code.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidCoupon` for an unknown code and
    /// `CartError::Validation` if it is already applied.
    pub async fn apply_coupon(&self, account: AccountId, code: &str) -> Result<CartView, CartError> {
        let code = Coupon::normalize_code(code);
        if code.is_empty() {
            return Err(CartError::Validation("coupon_code is required".to_owned()));
        }

        let _guard = self.locks.lock(account).await;
        if self.pricing.coupon(&code).await?.is_none() {
            return Err(CartError::InvalidCoupon(code));
        }

        let mut cart = self.cart(account).await?;
        if cart.coupons.contains(&code) {
            return Err(CartError::Validation(format!(
                "coupon \"{code}\" is already applied"
            )));
        }
        cart.coupons.push(code);

        let cart = self.save(cart).await?;
        self.render(&cart).await
    }

    /// Remove an applied coupon code.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` if the code is not applied.
    pub async fn remove_coupon(
        &self,
        account: AccountId,
        code: &str,
    ) -> Result<CartView, CartError> {
        let code = Coupon::normalize_code(code);
        let _guard = self.locks.lock(account).await;

        let mut cart = self.cart(account).await?;
        let before = cart.coupons.len();
        cart.coupons.retain(|applied| applied != &code);
        if cart.coupons.len() == before {
            return Err(CartError::Validation(format!(
                "coupon \"{code}\" is not applied"
            )));
        }

        let cart = self.save(cart).await?;
        self.render(&cart).await
    }

    /// Resolve the applied coupon codes that still exist.
    pub(crate) async fn coupons(&self, cart: &Cart) -> Result<Vec<Coupon>, CartError> {
        let mut coupons = Vec::with_capacity(cart.coupons.len());
        for code in &cart.coupons {
            if let Some(coupon) = self.pricing.coupon(code).await? {
                coupons.push(coupon);
            }
        }
        Ok(coupons)
    }

    /// Drop the cached view of `account`'s cart.
    pub async fn invalidate(&self, account: AccountId) {
        self.cache.delete(&cart_key(account)).await;
    }

    async fn save(&self, mut cart: Cart) -> Result<Cart, CartError> {
        cart.updated_at = self.clock.now();
        self.carts.save_cart(&cart).await?;
        self.invalidate(cart.account_id).await;
        Ok(cart)
    }

    async fn resolve(
        &self,
        product_id: ProductId,
        variation_id: Option<VariationId>,
    ) -> Result<Sellable, CartError> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        if !product.purchasable || !product.stock.is_in_stock() {
            return Err(CartError::NotPurchasable(product.name));
        }

        match (product.kind, variation_id) {
            (ProductKind::Variable, None) => Err(CartError::VariationRequired),
            (ProductKind::Simple, None) => Ok(Sellable {
                name: product.name,
                price: product.price,
                stock: product.stock,
                has_options: false,
            }),
            (_, Some(variation_id)) => {
                let variation = self
                    .catalog
                    .variation(variation_id)
                    .await?
                    .filter(|v| v.product_id == product_id)
                    .ok_or(CartError::InvalidVariation)?;
                if !variation.purchasable || !variation.stock.is_in_stock() {
                    return Err(CartError::NotPurchasable(product.name));
                }
                Ok(Sellable {
                    name: product.name,
                    price: variation.price,
                    stock: variation.stock,
                    has_options: true,
                })
            }
        }
    }

    /// Current catalog price of a line, if the item still exists.
    async fn live_price(&self, line: &CartLine) -> Result<Option<Money>, CartError> {
        Ok(match line.variation_id {
            Some(variation_id) => self.catalog.variation(variation_id).await?.map(|v| v.price),
            None => self.catalog.product(line.product_id).await?.map(|p| p.price),
        })
    }

    async fn render(&self, cart: &Cart) -> Result<CartView, CartError> {
        let mut items = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let current_price = self.live_price(line).await?;
            let unit_price = current_price.unwrap_or(line.unit_price);
            items.push(CartItemView {
                key: line.key.clone(),
                product_id: line.product_id,
                variation_id: line.variation_id,
                name: line.name.clone(),
                quantity: line.quantity,
                price: line.unit_price,
                current_price,
                price_changed: current_price.is_some_and(|price| price != line.unit_price),
                line_total: unit_price * line.quantity,
                options: line.options.clone(),
            });
        }

        let coupons = self.coupons(cart).await?;
        let subtotal = items.iter().map(|item| item.line_total).sum();
        let totals = CartTotals::from_subtotal(subtotal, &coupons);

        Ok(CartView {
            items,
            item_count: cart.item_count(),
            is_empty: cart.is_empty(),
            coupons: cart.coupons.clone(),
            totals,
            currency: self.currency,
        })
    }
}

fn cart_key(account: AccountId) -> String {
    CacheLayer::key(CacheClass::Cart, &[&account.to_string()])
}

fn line_quantity(quantity: i64) -> Result<u32, CartError> {
    if quantity <= 0 {
        return Err(CartError::Validation(
            "quantity must be greater than zero".to_owned(),
        ));
    }
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q <= MAX_LINE_QUANTITY)
        .ok_or_else(too_many)
}

fn too_many() -> CartError {
    CartError::Validation(format!(
        "quantity may not exceed {MAX_LINE_QUANTITY} per item"
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::db::memory::MemoryStore;
    use crate::models::{CouponKind, Product, Variation};

    const ACCOUNT: AccountId = AccountId::new(1);

    fn product(id: i64, cents: i64, quantity: Option<i64>) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            sku: format!("SKU-{id}"),
            price: Money::from_cents(cents),
            kind: ProductKind::Simple,
            purchasable: true,
            stock: Stock {
                quantity,
                ..Stock::default()
            },
        }
    }

    fn manager() -> (CartManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.put_product(product(1, 1000, Some(10)));
        store.put_product(product(2, 250, None));
        store.put_product(Product {
            kind: ProductKind::Variable,
            ..product(3, 1500, None)
        });
        store.put_variation(Variation {
            id: VariationId::new(31),
            product_id: ProductId::new(3),
            sku: "SKU-3-M".to_owned(),
            price: Money::from_cents(1600),
            purchasable: true,
            stock: Stock {
                quantity: Some(2),
                ..Stock::default()
            },
            attributes: BTreeMap::from([("size".to_owned(), "m".to_owned())]),
        });
        store.put_coupon(Coupon {
            code: "TENOFF".to_owned(),
            kind: CouponKind::Percent,
            amount: Decimal::from(10),
        });

        let manager = CartManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(AccountLocks::new()),
            CacheLayer::moka(&CacheConfig::default()),
            Arc::new(ManualClock::default()),
            CurrencyCode::Usd,
        );
        (manager, store)
    }

    fn add(product: i64, quantity: i64) -> AddItem {
        AddItem {
            product_id: ProductId::new(product),
            quantity,
            variation_id: None,
            options: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_same_selection_merges() {
        let (carts, _) = manager();
        let first = carts.add_item(ACCOUNT, add(1, 2)).await.unwrap();
        let second = carts.add_item(ACCOUNT, add(1, 3)).await.unwrap();
        assert_eq!(first.key, second.key);
        assert_eq!(second.quantity, 5);

        let view = carts.get_cart(ACCOUNT).await.unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.totals.subtotal, Money::from_cents(5000));
    }

    #[tokio::test]
    async fn test_add_checks_in_order() {
        let (carts, store) = manager();
        assert!(matches!(
            carts.add_item(ACCOUNT, add(1, 0)).await.unwrap_err(),
            CartError::Validation(_)
        ));
        assert!(matches!(
            carts.add_item(ACCOUNT, add(99, 1)).await.unwrap_err(),
            CartError::ProductNotFound(_)
        ));
        assert!(matches!(
            carts.add_item(ACCOUNT, add(3, 1)).await.unwrap_err(),
            CartError::VariationRequired
        ));
        let wrong_variation = AddItem {
            variation_id: Some(VariationId::new(31)),
            ..add(1, 1)
        };
        assert!(matches!(
            carts.add_item(ACCOUNT, wrong_variation).await.unwrap_err(),
            CartError::InvalidVariation
        ));
        assert!(matches!(
            carts.add_item(ACCOUNT, add(1, 11)).await.unwrap_err(),
            CartError::InsufficientStock { available: 10 }
        ));

        store.put_product(Product {
            purchasable: false,
            ..product(2, 250, None)
        });
        assert!(matches!(
            carts.add_item(ACCOUNT, add(2, 1)).await.unwrap_err(),
            CartError::NotPurchasable(_)
        ));
        assert!(carts.cart(ACCOUNT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_variation_uses_own_price_and_stock() {
        let (carts, _) = manager();
        let item = AddItem {
            variation_id: Some(VariationId::new(31)),
            options: BTreeMap::from([("size".to_owned(), "m".to_owned())]),
            ..add(3, 2)
        };
        let line = carts.add_item(ACCOUNT, item.clone()).await.unwrap();
        assert_eq!(line.unit_price, Money::from_cents(1600));
        assert!(matches!(
            carts.add_item(ACCOUNT, AddItem { quantity: 1, ..item }).await.unwrap_err(),
            CartError::InsufficientStock { available: 2 }
        ));
    }

    #[tokio::test]
    async fn test_update_to_zero_removes_line() {
        let (carts, _) = manager();
        let line = carts.add_item(ACCOUNT, add(1, 2)).await.unwrap();

        let view = carts.update_quantity(ACCOUNT, &line.key, 0).await.unwrap();
        assert!(view.is_empty);
        assert_eq!(view.totals.total, Money::ZERO);
        assert!(matches!(
            carts.update_quantity(ACCOUNT, &line.key, 1).await.unwrap_err(),
            CartError::LineNotFound
        ));
    }

    #[tokio::test]
    async fn test_update_checks_stock_and_recaptures_price() {
        let (carts, store) = manager();
        let line = carts.add_item(ACCOUNT, add(1, 2)).await.unwrap();

        let err = carts.update_quantity(ACCOUNT, &line.key, 11).await.unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { available: 10 }));
        assert_eq!(err.to_string(), "only 10 items available");

        store.put_product(product(1, 1200, Some(10)));
        let view = carts.update_quantity(ACCOUNT, &line.key, 3).await.unwrap();
        assert_eq!(view.items[0].price, Money::from_cents(1200));
        assert_eq!(view.totals.subtotal, Money::from_cents(3600));
    }

    #[tokio::test]
    async fn test_view_flags_changed_prices() {
        let (carts, store) = manager();
        carts.add_item(ACCOUNT, add(1, 1)).await.unwrap();
        store.put_product(product(1, 900, Some(10)));
        carts.invalidate(ACCOUNT).await;

        let view = carts.get_cart(ACCOUNT).await.unwrap();
        assert!(view.items[0].price_changed);
        assert_eq!(view.items[0].current_price, Some(Money::from_cents(900)));
        assert_eq!(view.items[0].price, Money::from_cents(1000));
        assert_eq!(view.totals.subtotal, Money::from_cents(900));
    }

    #[tokio::test]
    async fn test_totals_follow_live_prices() {
        let (carts, store) = manager();
        carts.add_item(ACCOUNT, add(1, 2)).await.unwrap();
        carts.add_item(ACCOUNT, add(2, 1)).await.unwrap();
        store.put_product(product(1, 1200, Some(10)));
        carts.invalidate(ACCOUNT).await;

        let view = carts.get_cart(ACCOUNT).await.unwrap();
        assert_eq!(view.items[0].line_total, Money::from_cents(2400));
        assert_eq!(view.totals.subtotal, Money::from_cents(2650));
        assert_eq!(view.totals.total, Money::from_cents(2650));

        // Order snapshots still use the captured price
        let cart = carts.cart(ACCOUNT).await.unwrap();
        assert_eq!(cart.totals(&[]).subtotal, Money::from_cents(2250));
    }

    #[tokio::test]
    async fn test_quantity_above_line_limit_is_rejected() {
        let (carts, _) = manager();
        assert!(matches!(
            carts.add_item(ACCOUNT, add(2, i64::from(u32::MAX))).await.unwrap_err(),
            CartError::Validation(_)
        ));
        let line = carts
            .add_item(ACCOUNT, add(2, i64::from(MAX_LINE_QUANTITY)))
            .await
            .unwrap();
        assert!(matches!(
            carts.add_item(ACCOUNT, add(2, 1)).await.unwrap_err(),
            CartError::Validation(_)
        ));
        assert!(matches!(
            carts
                .update_quantity(ACCOUNT, &line.key, i64::from(MAX_LINE_QUANTITY) + 1)
                .await
                .unwrap_err(),
            CartError::Validation(_)
        ));

        carts.add_item(ACCOUNT, add(1, 1)).await.unwrap();
        let count = carts.count(ACCOUNT).await.unwrap();
        assert_eq!(count.count, u64::from(MAX_LINE_QUANTITY) + 1);
    }

    #[tokio::test]
    async fn test_stock_counts_every_line_of_a_product() {
        let (carts, _) = manager();
        let first = AddItem {
            options: BTreeMap::from([("x".to_owned(), "1".to_owned())]),
            ..add(1, 6)
        };
        let second = AddItem {
            options: BTreeMap::from([("x".to_owned(), "2".to_owned())]),
            ..add(1, 5)
        };
        // Simple products have no options, so both land on one line
        let line = carts.add_item(ACCOUNT, first).await.unwrap();
        assert!(line.options.is_empty());
        assert!(matches!(
            carts.add_item(ACCOUNT, second).await.unwrap_err(),
            CartError::InsufficientStock { available: 10 }
        ));
        assert_eq!(carts.count(ACCOUNT).await.unwrap().count, 6);
    }

    #[tokio::test]
    async fn test_variation_stock_spans_option_lines() {
        let (carts, _) = manager();
        let medium = |label: &str| AddItem {
            variation_id: Some(VariationId::new(31)),
            options: BTreeMap::from([
                ("size".to_owned(), "m".to_owned()),
                ("note".to_owned(), label.to_owned()),
            ]),
            ..add(3, 1)
        };
        let first = carts.add_item(ACCOUNT, medium("a")).await.unwrap();
        let second = carts.add_item(ACCOUNT, medium("b")).await.unwrap();
        assert_ne!(first.key, second.key);
        assert!(matches!(
            carts.add_item(ACCOUNT, medium("c")).await.unwrap_err(),
            CartError::InsufficientStock { available: 2 }
        ));
        assert!(matches!(
            carts.update_quantity(ACCOUNT, &first.key, 2).await.unwrap_err(),
            CartError::InsufficientStock { available: 2 }
        ));
    }

    #[tokio::test]
    async fn test_cache_fill_waits_for_pending_mutation() {
        let (carts, _) = manager();
        carts.add_item(ACCOUNT, add(1, 1)).await.unwrap();

        let guard = carts.locks.lock(ACCOUNT).await;
        let pending = tokio::time::timeout(Duration::from_millis(20), carts.get_cart(ACCOUNT));
        assert!(pending.await.is_err());

        drop(guard);
        let view = carts.get_cart(ACCOUNT).await.unwrap();
        assert_eq!(view.item_count, 1);
    }

    #[tokio::test]
    async fn test_remove_reports_summary() {
        let (carts, _) = manager();
        let kept = carts.add_item(ACCOUNT, add(2, 1)).await.unwrap();
        let line = carts.add_item(ACCOUNT, add(1, 2)).await.unwrap();

        let summary = carts.remove_item(ACCOUNT, &line.key).await.unwrap();
        assert_eq!(summary.removed_item.key, line.key);
        assert_eq!(summary.cart_summary.previous_count, 3);
        assert_eq!(summary.cart_summary.current_count, 1);
        assert!(!summary.cart_summary.is_empty);
        assert_eq!(summary.remaining_items[0].key, kept.key);

        assert!(matches!(
            carts.remove_item(ACCOUNT, &line.key).await.unwrap_err(),
            CartError::LineNotFound
        ));
    }

    #[tokio::test]
    async fn test_coupons() {
        let (carts, _) = manager();
        carts.add_item(ACCOUNT, add(1, 2)).await.unwrap();

        let view = carts.apply_coupon(ACCOUNT, " tenoff ").await.unwrap();
        assert_eq!(view.totals.discount, Money::from_cents(200));
        assert_eq!(view.totals.total, Money::from_cents(1800));

        assert!(matches!(
            carts.apply_coupon(ACCOUNT, "TENOFF").await.unwrap_err(),
            CartError::Validation(_)
        ));
        assert!(matches!(
            carts.apply_coupon(ACCOUNT, "bogus").await.unwrap_err(),
            CartError::InvalidCoupon(_)
        ));

        let view = carts.remove_coupon(ACCOUNT, "tenoff").await.unwrap();
        assert_eq!(view.totals.discount, Money::ZERO);
        assert!(matches!(
            carts.remove_coupon(ACCOUNT, "tenoff").await.unwrap_err(),
            CartError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_clear_and_count() {
        let (carts, _) = manager();
        carts.add_item(ACCOUNT, add(1, 2)).await.unwrap();
        carts.add_item(ACCOUNT, add(2, 3)).await.unwrap();
        assert_eq!(carts.count(ACCOUNT).await.unwrap(), CartCount { count: 5, is_empty: false });

        assert_eq!(carts.clear(ACCOUNT).await.unwrap(), 5);
        assert_eq!(carts.count(ACCOUNT).await.unwrap(), CartCount { count: 0, is_empty: true });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_do_not_lose_updates() {
        let (carts, _) = manager();
        let carts = Arc::new(carts);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let carts = carts.clone();
                tokio::spawn(async move { carts.add_item(ACCOUNT, add(2, 1)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(carts.count(ACCOUNT).await.unwrap().count, 8);
    }
}
