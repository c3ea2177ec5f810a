//! Cart domain types and total computation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecommerce_api_core::{AccountId, CurrencyCode, LineKey, Money, ProductId, VariationId};

use super::catalog::Coupon;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub key: LineKey,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub name: String,
    /// Always greater than zero; a line at zero is removed instead.
    pub quantity: u32,
    /// Unit price captured at the last mutation of this line.
    pub unit_price: Money,
}

impl CartLine {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// The active cart of one account.
///
/// Lines keep insertion order. Totals are never stored; see [`Cart::totals`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub account_id: AccountId,
    #[serde(default)]
    pub lines: Vec<CartLine>,
    /// Applied coupon codes, normalized.
    #[serde(default)]
    pub coupons: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// A cart with no lines.
    #[must_use]
    pub const fn empty(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            lines: Vec::new(),
            coupons: Vec::new(),
            updated_at: now,
        }
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Units held by every line drawing on the same stock as `product` and
    /// `variation`, except the line `skip`.
    #[must_use]
    pub fn units_of(
        &self,
        product: ProductId,
        variation: Option<VariationId>,
        skip: &LineKey,
    ) -> u64 {
        self.lines
            .iter()
            .filter(|line| &line.key != skip)
            .filter(|line| line.product_id == product && line.variation_id == variation)
            .map(|line| u64::from(line.quantity))
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Look up a line by key.
    #[must_use]
    pub fn line(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.key == key)
    }

    /// Mutable lookup by key.
    pub fn line_mut(&mut self, key: &LineKey) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|line| &line.key == key)
    }

    /// Remove a line, returning it if it existed.
    pub fn remove_line(&mut self, key: &LineKey) -> Option<CartLine> {
        let index = self.lines.iter().position(|line| &line.key == key)?;
        Some(self.lines.remove(index))
    }

    /// Drop every line and coupon, returning the number of items removed.
    pub fn clear(&mut self) -> u64 {
        let count = self.item_count();
        self.lines.clear();
        self.coupons.clear();
        count
    }

    /// Totals at the prices captured on each line.
    ///
    /// This is what an order placed from the cart is charged.
    #[must_use]
    pub fn totals(&self, coupons: &[Coupon]) -> CartTotals {
        CartTotals::from_subtotal(self.lines.iter().map(CartLine::line_total).sum(), coupons)
    }
}

/// Computed monetary totals of a cart or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub shipping: Money,
    pub total: Money,
}

impl CartTotals {
    /// Apply `coupons` to `subtotal`.
    ///
    /// `coupons` are the resolved coupons for [`Cart::coupons`]; codes that no
    /// longer resolve simply contribute nothing. Tax and shipping are not
    /// computed here and are always zero.
    #[must_use]
    pub fn from_subtotal(subtotal: Money, coupons: &[Coupon]) -> Self {
        let discount = coupons
            .iter()
            .map(|coupon| coupon.discount_on(subtotal))
            .sum::<Money>()
            .min(subtotal);
        let tax = Money::ZERO;
        let shipping = Money::ZERO;
        Self {
            subtotal,
            discount,
            tax,
            shipping,
            total: subtotal.saturating_sub(discount) + tax + shipping,
        }
    }
}

/// A cart line as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItemView {
    pub key: LineKey,
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub name: String,
    pub quantity: u32,
    /// Unit price captured at the last mutation of the line.
    pub price: Money,
    /// Live catalog price, when the product still exists.
    pub current_price: Option<Money>,
    pub price_changed: bool,
    /// Live price × quantity; the captured price when the item is gone.
    pub line_total: Money,
    pub options: BTreeMap<String, String>,
}

/// A full cart as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u64,
    pub is_empty: bool,
    pub coupons: Vec<String>,
    pub totals: CartTotals,
    pub currency: CurrencyCode,
}

/// Result of removing a line.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedLineSummary {
    pub removed_item: CartLine,
    pub cart_summary: CartSummary,
    pub remaining_items: Vec<CartLine>,
}

/// Item counts around a removal.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CartSummary {
    pub previous_count: u64,
    pub current_count: u64,
    pub is_empty: bool,
}
