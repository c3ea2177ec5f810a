//! Session token persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ecommerce_api_core::AccountId;

use super::PgStore;
use crate::db::{RepositoryError, SessionStore};
use crate::models::{TokenDigest, TokenRecord};

#[derive(sqlx::FromRow)]
struct SessionRow {
    token_digest: String,
    account_id: AccountId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for TokenRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            digest: TokenDigest::from_stored(row.token_digest),
            account_id: row.account_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            // Usage time is kept in memory only.
            last_used_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn save_session(&self, record: &TokenRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO sessions (token_digest, account_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token_digest) DO UPDATE SET expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(record.digest.as_str())
        .bind(record.account_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_sessions(&self, digests: &[TokenDigest]) -> Result<(), RepositoryError> {
        if digests.is_empty() {
            return Ok(());
        }
        let keys: Vec<&str> = digests.iter().map(TokenDigest::as_str).collect();
        sqlx::query("DELETE FROM sessions WHERE token_digest = ANY($1)")
            .bind(&keys)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn live_sessions(&self, now: DateTime<Utc>) -> Result<Vec<TokenRecord>, RepositoryError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r"
            SELECT token_digest, account_id, created_at, expires_at
            FROM sessions
            WHERE expires_at >= $1
            ORDER BY created_at
            ",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TokenRecord::from).collect())
    }
}
