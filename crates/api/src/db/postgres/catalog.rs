//! Product, variation and coupon queries, plus seed import.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;

use ecommerce_api_core::{Money, ProductId, VariationId};

use super::{PgStore, corrupt};
use crate::db::seed::CatalogSeed;
use crate::db::{Catalog, Pricing, RepositoryError};
use crate::models::{Coupon, CouponKind, Product, ProductKind, Stock, Variation};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    sku: String,
    price: Money,
    kind: String,
    purchasable: bool,
    stock_quantity: Option<i64>,
    in_stock: bool,
    backorders: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "simple" => ProductKind::Simple,
            "variable" => ProductKind::Variable,
            other => return Err(corrupt("product kind", other)),
        };
        Ok(Self {
            id: row.id,
            name: row.name,
            sku: row.sku,
            price: row.price,
            kind,
            purchasable: row.purchasable,
            stock: Stock {
                quantity: row.stock_quantity,
                in_stock: row.in_stock,
                backorders: row.backorders,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariationRow {
    id: VariationId,
    product_id: ProductId,
    sku: String,
    price: Money,
    purchasable: bool,
    stock_quantity: Option<i64>,
    in_stock: bool,
    backorders: bool,
    attributes: Json<BTreeMap<String, String>>,
}

impl From<VariationRow> for Variation {
    fn from(row: VariationRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            sku: row.sku,
            price: row.price,
            purchasable: row.purchasable,
            stock: Stock {
                quantity: row.stock_quantity,
                in_stock: row.in_stock,
                backorders: row.backorders,
            },
            attributes: row.attributes.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    code: String,
    kind: String,
    amount: Decimal,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = RepositoryError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "percent" => CouponKind::Percent,
            "fixed_cart" => CouponKind::FixedCart,
            other => return Err(corrupt("coupon kind", other)),
        };
        Ok(Self {
            code: row.code,
            kind,
            amount: row.amount,
        })
    }
}

/// Counts from a seed import.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedReport {
    pub products: u64,
    pub variations: u64,
    pub coupons: u64,
}

impl PgStore {
    /// Upsert a catalog seed in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails; nothing is
    /// written in that case.
    pub async fn import_seed(&self, seed: &CatalogSeed) -> Result<SeedReport, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut report = SeedReport::default();

        for product in &seed.products {
            report.products += sqlx::query(
                r"
                INSERT INTO products
                    (id, name, sku, price, kind, purchasable, stock_quantity, in_stock, backorders)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name, sku = EXCLUDED.sku, price = EXCLUDED.price,
                    kind = EXCLUDED.kind, purchasable = EXCLUDED.purchasable,
                    stock_quantity = EXCLUDED.stock_quantity, in_stock = EXCLUDED.in_stock,
                    backorders = EXCLUDED.backorders
                ",
            )
            .bind(product.id)
            .bind(&product.name)
            .bind(&product.sku)
            .bind(product.price)
            .bind(product.kind.as_str())
            .bind(product.purchasable)
            .bind(product.stock.quantity)
            .bind(product.stock.in_stock)
            .bind(product.stock.backorders)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for variation in &seed.variations {
            report.variations += sqlx::query(
                r"
                INSERT INTO variations
                    (id, product_id, sku, price, purchasable, stock_quantity, in_stock,
                     backorders, attributes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE SET
                    product_id = EXCLUDED.product_id, sku = EXCLUDED.sku,
                    price = EXCLUDED.price, purchasable = EXCLUDED.purchasable,
                    stock_quantity = EXCLUDED.stock_quantity, in_stock = EXCLUDED.in_stock,
                    backorders = EXCLUDED.backorders, attributes = EXCLUDED.attributes
                ",
            )
            .bind(variation.id)
            .bind(variation.product_id)
            .bind(&variation.sku)
            .bind(variation.price)
            .bind(variation.purchasable)
            .bind(variation.stock.quantity)
            .bind(variation.stock.in_stock)
            .bind(variation.stock.backorders)
            .bind(Json(&variation.attributes))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        for coupon in &seed.coupons {
            report.coupons += sqlx::query(
                r"
                INSERT INTO coupons (code, kind, amount)
                VALUES ($1, $2, $3)
                ON CONFLICT (code) DO UPDATE SET kind = EXCLUDED.kind, amount = EXCLUDED.amount
                ",
            )
            .bind(Coupon::normalize_code(&coupon.code))
            .bind(coupon.kind.as_str())
            .bind(coupon.amount)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(report)
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, sku, price, kind, purchasable, stock_quantity, in_stock, backorders
            FROM products
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn variation(&self, id: VariationId) -> Result<Option<Variation>, RepositoryError> {
        let row: Option<VariationRow> = sqlx::query_as(
            r"
            SELECT id, product_id, sku, price, purchasable, stock_quantity, in_stock,
                   backorders, attributes
            FROM variations
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Variation::from))
    }
}

#[async_trait]
impl Pricing for PgStore {
    async fn coupon(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let row: Option<CouponRow> =
            sqlx::query_as("SELECT code, kind, amount FROM coupons WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Coupon::try_from).transpose()
    }
}
