//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication and profile operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] ecommerce_api_core::EmailError),

    /// Invalid username format.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] ecommerce_api_core::UsernameError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Any other rejected input.
    #[error("{0}")]
    Validation(String),

    /// Invalid credentials (wrong password or unknown account).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Missing, unknown or expired session token.
    #[error("authentication required")]
    Unauthenticated,

    /// Username or email already taken; the payload names the field.
    #[error("{0} already exists")]
    DuplicateIdentifier(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// Map a store conflict onto the duplicate field.
    pub(crate) fn from_store(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(field) => Self::DuplicateIdentifier(field),
            other => Self::Repository(other),
        }
    }
}
