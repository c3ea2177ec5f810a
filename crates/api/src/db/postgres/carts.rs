//! Cart documents.

use async_trait::async_trait;
use sqlx::types::Json;

use ecommerce_api_core::AccountId;

use super::PgStore;
use crate::db::{CartStore, RepositoryError};
use crate::models::Cart;

#[async_trait]
impl CartStore for PgStore {
    async fn cart(&self, account: AccountId) -> Result<Option<Cart>, RepositoryError> {
        let document: Option<Json<Cart>> =
            sqlx::query_scalar("SELECT document FROM carts WHERE account_id = $1")
                .bind(account)
                .fetch_optional(&self.pool)
                .await?;

        Ok(document.map(|Json(cart)| cart))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO carts (account_id, document, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id) DO UPDATE
            SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(cart.account_id)
        .bind(Json(cart))
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
