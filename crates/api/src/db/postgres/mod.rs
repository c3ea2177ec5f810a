//! `PostgreSQL` implementation of every store.
//!
//! Queries are runtime-checked (`sqlx::query_as` with `FromRow` row types)
//! and rows are converted into domain types at this boundary.

mod accounts;
mod carts;
mod catalog;
mod orders;
mod sessions;

use async_trait::async_trait;
use sqlx::PgPool;

pub use catalog::SeedReport;

use super::{RepositoryError, StoreHealth};

/// All stores over one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Map a unique violation to `Conflict` naming the offending field.
fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        let field = match db_err.constraint() {
            Some(c) if c.contains("username") => "username",
            Some(c) if c.contains("email") => "email",
            _ => "record",
        };
        return RepositoryError::Conflict(field.to_owned());
    }
    RepositoryError::Database(err)
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {err}"))
}
