//! Catalog data consumed from the product store.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ecommerce_api_core::{Money, ProductId, VariationId};

/// Whether a product is sold as-is or through its variations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    #[default]
    Simple,
    Variable,
}

impl ProductKind {
    /// Storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Variable => "variable",
        }
    }
}

/// Inventory state of a product or variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stock {
    /// Tracked quantity; `None` when stock is not managed.
    pub quantity: Option<i64>,
    /// Manual in-stock flag, used when stock is not managed.
    pub in_stock: bool,
    /// Whether orders may exceed the tracked quantity.
    pub backorders: bool,
}

impl Default for Stock {
    fn default() -> Self {
        Self {
            quantity: None,
            in_stock: true,
            backorders: false,
        }
    }
}

impl Stock {
    /// Whether at least one unit can be sold.
    #[must_use]
    pub fn is_in_stock(&self) -> bool {
        match self.quantity {
            Some(quantity) => quantity > 0 || self.backorders,
            None => self.in_stock,
        }
    }

    /// Hard cap on the quantity a single order may take, if any.
    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        match self.quantity {
            Some(quantity) if !self.backorders => {
                Some(u32::try_from(quantity.max(0)).unwrap_or(u32::MAX))
            }
            _ => None,
        }
    }

    /// Check whether `wanted` units can be sold.
    ///
    /// # Errors
    ///
    /// Returns the available count when the request exceeds it.
    pub fn check(&self, wanted: u32) -> Result<(), u32> {
        match self.limit() {
            Some(available) if wanted > available => Err(available),
            _ => Ok(()),
        }
    }
}

/// A product as the catalog reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub sku: String,
    pub price: Money,
    #[serde(default)]
    pub kind: ProductKind,
    #[serde(default = "default_true")]
    pub purchasable: bool,
    #[serde(default)]
    pub stock: Stock,
}

/// One purchasable variant of a variable product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variation {
    pub id: VariationId,
    pub product_id: ProductId,
    #[serde(default)]
    pub sku: String,
    pub price: Money,
    #[serde(default = "default_true")]
    pub purchasable: bool,
    #[serde(default)]
    pub stock: Stock,
    /// Attribute name to value, e.g. `size -> m`.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

const fn default_true() -> bool {
    true
}

/// How a coupon reduces the cart subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    /// `amount` percent off the subtotal.
    Percent,
    /// Fixed `amount` off the whole cart.
    FixedCart,
}

impl CouponKind {
    /// Storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::FixedCart => "fixed_cart",
        }
    }
}

/// A discount code known to the pricing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub kind: CouponKind,
    pub amount: Decimal,
}

impl Coupon {
    /// Canonical form of a code: trimmed and lowercased.
    #[must_use]
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_lowercase()
    }

    /// Discount this coupon grants on `subtotal`, never more than `subtotal`.
    #[must_use]
    pub fn discount_on(&self, subtotal: Money) -> Money {
        let raw = match self.kind {
            CouponKind::Percent => subtotal.percent(self.amount.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)),
            CouponKind::FixedCart => Money::new(self.amount.max(Decimal::ZERO)),
        };
        raw.min(subtotal)
    }
}
