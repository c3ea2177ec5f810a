//! Account queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use ecommerce_api_core::{AccountId, AddressType, Email, Username};

use super::{PgStore, corrupt, map_unique_violation};
use crate::db::{AccountStore, RepositoryError};
use crate::models::{Account, Address, NewAccount};

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: AccountId,
    username: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    display_name: String,
    billing: Json<Address>,
    shipping: Json<Address>,
    default_address: Option<String>,
    registered_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            username: Username::parse(&row.username).map_err(|e| corrupt("username", e))?,
            email: Email::parse(&row.email).map_err(|e| corrupt("email", e))?,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            display_name: row.display_name,
            billing: row.billing.0,
            shipping: row.shipping.0,
            default_address: row
                .default_address
                .as_deref()
                .map(str::parse::<AddressType>)
                .transpose()
                .map_err(|e| corrupt("default address", e))?,
            registered_at: row.registered_at,
        })
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, new: NewAccount) -> Result<Account, RepositoryError> {
        let row: AccountRow = sqlx::query_as(
            r"
            INSERT INTO accounts
                (username, email, password_hash, first_name, last_name, display_name, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, username, email, password_hash, first_name, last_name, display_name,
                      billing, shipping, default_address, registered_at
            ",
        )
        .bind(new.username.as_str())
        .bind(new.email.as_str())
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.display_name)
        .bind(new.registered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        row.try_into()
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r"
            SELECT id, username, email, password_hash, first_name, last_name, display_name,
                   billing, shipping, default_address, registered_at
            FROM accounts
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn account_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, RepositoryError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r"
            SELECT id, username, email, password_hash, first_name, last_name, display_name,
                   billing, shipping, default_address, registered_at
            FROM accounts
            WHERE lower(username) = lower($1) OR email = lower($1)
            ORDER BY id
            LIMIT 1
            ",
        )
        .bind(identifier.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn update_account(&self, account: &Account) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET email = $2, first_name = $3, last_name = $4, display_name = $5,
                billing = $6, shipping = $7, default_address = $8, password_hash = $9,
                updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(account.id)
        .bind(account.email.as_str())
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.display_name)
        .bind(Json(&account.billing))
        .bind(Json(&account.shipping))
        .bind(account.default_address.map(|kind| kind.as_str()))
        .bind(&account.password_hash)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
