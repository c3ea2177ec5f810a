//! Order domain types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecommerce_api_core::{
    AccountId, CurrencyCode, Email, Money, OrderId, OrderStatus, ProductId, VariationId,
};

use super::account::Address;
use super::cart::{CartLine, CartTotals};
use super::session::AuthContext;

/// One line of an order; prices are fixed at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub variation_id: Option<VariationId>,
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            variation_id: line.variation_id,
            name: line.name.clone(),
            options: line.options.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total(),
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// `None` for orders placed as a guest.
    pub account_id: Option<AccountId>,
    /// Billing email, used to match guest orders to accounts.
    pub email: Email,
    pub status: OrderStatus,
    pub currency: CurrencyCode,
    pub lines: Vec<OrderLine>,
    pub coupons: Vec<String>,
    pub billing: Address,
    pub shipping: Address,
    pub payment_method: String,
    pub payment_method_title: String,
    pub customer_note: String,
    pub totals: CartTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether `owner` may see this order.
    ///
    /// Account orders match on id; guest orders match on billing email.
    #[must_use]
    pub fn is_visible_to(&self, owner: &OrderOwner) -> bool {
        match self.account_id {
            Some(account_id) => account_id == owner.account_id,
            None => self.email == owner.email,
        }
    }

    /// Sum of line quantities.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }
}

/// An order ready to be committed by the store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub account_id: AccountId,
    pub email: Email,
    pub currency: CurrencyCode,
    pub lines: Vec<OrderLine>,
    pub coupons: Vec<String>,
    pub billing: Address,
    pub shipping: Address,
    pub payment_method: String,
    pub payment_method_title: String,
    pub customer_note: String,
    pub totals: CartTotals,
    pub created_at: DateTime<Utc>,
}

/// Who is asking for orders: an account and its email for guest matching.
#[derive(Debug, Clone)]
pub struct OrderOwner {
    pub account_id: AccountId,
    pub email: Email,
}

impl From<&AuthContext> for OrderOwner {
    fn from(context: &AuthContext) -> Self {
        Self {
            account_id: context.account_id,
            email: context.email.clone(),
        }
    }
}

/// One page of an order listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 10;
    pub const MAX_PER_PAGE: u32 = 100;

    /// Clamp client input into range.
    #[must_use]
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Rows to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// Pagination block of a listing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub per_page: u32,
    pub total_orders: u64,
    pub total_pages: u64,
}

impl Pagination {
    #[must_use]
    pub fn new(request: PageRequest, total: u64) -> Self {
        Self {
            current_page: request.page,
            per_page: request.per_page,
            total_orders: total,
            total_pages: total.div_ceil(u64::from(request.per_page)),
        }
    }
}

/// Compact order entry for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub currency: CurrencyCode,
    pub total: Money,
    pub item_count: u64,
    pub payment_method_title: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            currency: order.currency,
            total: order.totals.total,
            item_count: order.item_count(),
            payment_method_title: order.payment_method_title.clone(),
            created_at: order.created_at,
        }
    }
}

/// A page of orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    pub pagination: Pagination,
}
