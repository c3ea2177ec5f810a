//! Order queries.
//!
//! Placing and cancelling run in one transaction each. Stock rows are locked
//! with `FOR UPDATE` in [`stock_demand`] order so concurrent checkouts never
//! deadlock on each other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};

use ecommerce_api_core::{AccountId, CurrencyCode, Email, Money, OrderId, OrderStatus};

use super::{PgStore, corrupt};
use crate::db::{OrderStore, RepositoryError, StockTarget, stock_demand};
use crate::models::{
    Address, Cart, CartTotals, NewOrder, Order, OrderLine, OrderOwner, PageRequest, Stock,
};

const ORDER_COLUMNS: &str = "id, account_id, email, status, currency, lines, coupons, billing, \
     shipping, payment_method, payment_method_title, customer_note, subtotal, discount, tax, \
     shipping_total, total, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    account_id: Option<AccountId>,
    email: Email,
    status: OrderStatus,
    currency: String,
    lines: Json<Vec<OrderLine>>,
    coupons: Json<Vec<String>>,
    billing: Json<Address>,
    shipping: Json<Address>,
    payment_method: String,
    payment_method_title: String,
    customer_note: String,
    subtotal: Money,
    discount: Money,
    tax: Money,
    shipping_total: Money,
    total: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            account_id: row.account_id,
            email: row.email,
            status: row.status,
            currency: row
                .currency
                .parse::<CurrencyCode>()
                .map_err(|e| corrupt("currency", e))?,
            lines: row.lines.0,
            coupons: row.coupons.0,
            billing: row.billing.0,
            shipping: row.shipping.0,
            payment_method: row.payment_method,
            payment_method_title: row.payment_method_title,
            customer_note: row.customer_note,
            totals: CartTotals {
                subtotal: row.subtotal,
                discount: row.discount,
                tax: row.tax,
                shipping: row.shipping_total,
                total: row.total,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StockRow {
    stock_quantity: Option<i64>,
    in_stock: bool,
    backorders: bool,
}

impl From<StockRow> for Stock {
    fn from(row: StockRow) -> Self {
        Self {
            quantity: row.stock_quantity,
            in_stock: row.in_stock,
            backorders: row.backorders,
        }
    }
}

async fn lock_stock(
    tx: &mut Transaction<'_, Postgres>,
    target: StockTarget,
) -> Result<Option<Stock>, RepositoryError> {
    let (sql, id) = match target {
        StockTarget::Product(id) => (
            "SELECT stock_quantity, in_stock, backorders FROM products WHERE id = $1 FOR UPDATE",
            id.get(),
        ),
        StockTarget::Variation(id) => (
            "SELECT stock_quantity, in_stock, backorders FROM variations WHERE id = $1 FOR UPDATE",
            id.get(),
        ),
    };
    let row: Option<StockRow> = sqlx::query_as(sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(Stock::from))
}

/// Add `delta` to a managed stock counter; unmanaged counters are untouched.
async fn adjust_stock(
    tx: &mut Transaction<'_, Postgres>,
    target: StockTarget,
    delta: i64,
) -> Result<(), RepositoryError> {
    let (sql, id) = match target {
        StockTarget::Product(id) => (
            "UPDATE products SET stock_quantity = stock_quantity + $2 \
             WHERE id = $1 AND stock_quantity IS NOT NULL",
            id.get(),
        ),
        StockTarget::Variation(id) => (
            "UPDATE variations SET stock_quantity = stock_quantity + $2 \
             WHERE id = $1 AND stock_quantity IS NOT NULL",
            id.get(),
        ),
    };
    sqlx::query(sql).bind(id).bind(delta).execute(&mut **tx).await?;
    Ok(())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let wanted = stock_demand(&new.lines);
        for (target, (product_id, quantity)) in &wanted {
            let stock = lock_stock(&mut tx, *target)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            stock
                .check(*quantity)
                .map_err(|available| RepositoryError::InsufficientStock {
                    product_id: *product_id,
                    available,
                })?;
        }
        for (target, (_, quantity)) in &wanted {
            adjust_stock(&mut tx, *target, -i64::from(*quantity)).await?;
        }

        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO orders
                (account_id, email, status, currency, lines, coupons, billing, shipping,
                 payment_method, payment_method_title, customer_note, subtotal, discount,
                 tax, shipping_total, total, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(new.account_id)
        .bind(&new.email)
        .bind(OrderStatus::Pending)
        .bind(new.currency.code())
        .bind(Json(&new.lines))
        .bind(Json(&new.coupons))
        .bind(Json(&new.billing))
        .bind(Json(&new.shipping))
        .bind(&new.payment_method)
        .bind(&new.payment_method_title)
        .bind(&new.customer_note)
        .bind(new.totals.subtotal)
        .bind(new.totals.discount)
        .bind(new.totals.tax)
        .bind(new.totals.shipping)
        .bind(new.totals.total)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let emptied = Cart::empty(new.account_id, new.created_at);
        sqlx::query(
            r"
            INSERT INTO carts (account_id, document, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id) DO UPDATE
            SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(new.account_id)
        .bind(Json(&emptied))
        .bind(new.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Order::try_from).transpose()
    }

    async fn orders_for(
        &self,
        owner: &OrderOwner,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        const VISIBLE: &str = "(account_id = $1 OR (account_id IS NULL AND email = $2)) \
             AND ($3::order_status IS NULL OR status = $3)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {VISIBLE}"))
            .bind(owner.account_id)
            .bind(&owner.email)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE {VISIBLE}
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "
        ))
        .bind(owner.account_id)
        .bind(&owner.email)
        .bind(status)
        .bind(i64::from(page.per_page))
        .bind(to_i64(page.offset()))
        .fetch_all(&self.pool)
        .await?;

        let orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((orders, u64::try_from(total).unwrap_or_default()))
    }

    async fn cancel_order(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE orders
            SET status = 'cancelled', updated_at = $2
            WHERE id = $1 AND status IN ('pending', 'on-hold', 'processing')
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1::BIGINT FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            return match exists {
                Some(_) => Ok(None),
                None => Err(RepositoryError::NotFound),
            };
        };

        let order = Order::try_from(row)?;
        for (target, (_, quantity)) in stock_demand(&order.lines) {
            adjust_stock(&mut tx, target, i64::from(quantity)).await?;
        }

        tx.commit().await?;
        Ok(Some(order))
    }
}
