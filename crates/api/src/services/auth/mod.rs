//! Authentication service.
//!
//! Password login and registration, session validation and the account
//! profile. Tokens themselves live in [`TokenStore`].

mod error;

pub use error::AuthError;

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;

use ecommerce_api_core::{AccountId, Email, Username};

use crate::cache::{CacheClass, CacheLayer};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::db::AccountStore;
use crate::models::account::display_name_for;
use crate::models::{Account, Address, AuthContext, IssuedToken, NewAccount, Profile, SessionToken};
use crate::services::addresses::addresses_key;
use crate::services::tokens::TokenStore;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Upper bound accepted for a password, to cap hashing cost.
const MAX_PASSWORD_LENGTH: usize = 1024;

/// Input for [`Authenticator::register`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Changes accepted by [`Authenticator::update_profile`]. Absent fields are
/// left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub billing: Option<Address>,
    pub shipping: Option<Address>,
    /// New password; requires `current_password` and ends every session.
    pub password: Option<String>,
    pub current_password: Option<String>,
}

/// Authentication service.
pub struct Authenticator {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<TokenStore>,
    cache: CacheLayer,
    clock: Arc<dyn Clock>,
    hasher: Argon2<'static>,
}

impl Authenticator {
    /// Create the service with Argon2id parameters from `config`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordHash` if the parameters are out of range.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<TokenStore>,
        cache: CacheLayer,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        let params = Params::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
            None,
        )
        .map_err(|_| AuthError::PasswordHash)?;

        Ok(Self {
            accounts,
            tokens,
            cache,
            clock,
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// The token store this service issues from.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Login with a username or email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown identifier or a
    /// wrong password alike. No token is issued on failure.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<(Account, IssuedToken), AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let account = self
            .accounts
            .account_by_login(identifier)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        self.verify_password(password, &account.password_hash).await?;

        let issued = self.tokens.issue(account.id).await?;
        tracing::info!(account_id = %account.id, "Login succeeded");
        Ok((account, issued))
    }

    /// Register a new account and log it in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUsername`, `InvalidEmail` or `WeakPassword`
    /// for bad input, and `AuthError::DuplicateIdentifier` if the username or
    /// email is taken.
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<(Account, IssuedToken), AuthError> {
        let username = Username::parse(&registration.username)?;
        let email = Email::parse(&registration.email)?;
        validate_password(&registration.password)?;

        let password_hash = self.hash_password(registration.password).await?;
        let first_name = registration.first_name.trim().to_owned();
        let last_name = registration.last_name.trim().to_owned();
        let display_name = display_name_for(&first_name, &last_name, &username);

        let account = self
            .accounts
            .insert_account(NewAccount {
                username,
                email,
                password_hash,
                first_name,
                last_name,
                display_name,
                registered_at: self.clock.now(),
            })
            .await
            .map_err(AuthError::from_store)?;

        let issued = self.tokens.issue(account.id).await?;
        tracing::info!(account_id = %account.id, "Account registered");
        Ok((account, issued))
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Resolve a presented token to the identity behind it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if the token is unknown, expired
    /// or its account no longer exists.
    pub async fn validate(&self, token: SessionToken) -> Result<AuthContext, AuthError> {
        let record = self
            .tokens
            .validate(&token)
            .await
            .ok_or(AuthError::Unauthenticated)?;

        let Some(account) = self.accounts.account(record.account_id).await? else {
            if let Err(e) = self.tokens.revoke_all(record.account_id).await {
                tracing::warn!(error = %e, "Failed to revoke tokens of missing account");
            }
            return Err(AuthError::Unauthenticated);
        };

        Ok(AuthContext {
            account_id: account.id,
            username: account.username,
            email: account.email,
            token,
            expires_at: record.expires_at,
        })
    }

    /// Revoke the token the request authenticated with.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the durable copy cannot be deleted.
    pub async fn logout(&self, context: &AuthContext) -> Result<(), AuthError> {
        self.tokens.revoke(context.account_id, &context.token).await?;
        tracing::info!(account_id = %context.account_id, "Logged out");
        Ok(())
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Current profile of `account`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if the account no longer exists.
    pub async fn profile(&self, account: AccountId) -> Result<Profile, AuthError> {
        let key = profile_key(account);
        if let Some(profile) = self.cache.get::<Profile>(&key).await {
            return Ok(profile);
        }

        let profile = Profile::from(&self.load(account).await?);
        self.cache.put(CacheClass::Profile, &key, &profile).await;
        Ok(profile)
    }

    /// Apply `changes` to the profile of `account`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `Validation` for bad input,
    /// `AuthError::InvalidCredentials` if a password change does not carry the
    /// current password, and `AuthError::DuplicateIdentifier` if the new email
    /// belongs to another account.
    pub async fn update_profile(
        &self,
        account: AccountId,
        changes: ProfileUpdate,
    ) -> Result<Profile, AuthError> {
        let mut current = self.load(account).await?;
        let mut password_changed = false;

        if let Some(first_name) = changes.first_name {
            current.first_name = first_name.trim().to_owned();
        }
        if let Some(last_name) = changes.last_name {
            current.last_name = last_name.trim().to_owned();
        }
        match changes.display_name.map(|d| d.trim().to_owned()) {
            Some(display_name) if !display_name.is_empty() => current.display_name = display_name,
            Some(_) => {
                return Err(AuthError::Validation("display_name cannot be empty".to_owned()));
            }
            None => {}
        }
        if let Some(email) = changes.email {
            current.email = Email::parse(&email)?;
        }
        if let Some(billing) = changes.billing {
            current.billing = billing.trimmed();
        }
        if let Some(shipping) = changes.shipping {
            current.shipping = shipping.trimmed().as_shipping();
        }
        if let Some(password) = changes.password {
            let supplied = changes.current_password.unwrap_or_default();
            self.verify_password(&supplied, &current.password_hash).await?;
            validate_password(&password)?;
            current.password_hash = self.hash_password(password).await?;
            password_changed = true;
        }

        self.accounts
            .update_account(&current)
            .await
            .map_err(AuthError::from_store)?;
        self.invalidate(account).await;

        if password_changed {
            let revoked = self.tokens.revoke_all(account).await?;
            tracing::info!(account_id = %account, revoked, "Password changed, sessions ended");
        }

        Ok(Profile::from(&current))
    }

    /// Drop cached views derived from the account record.
    pub async fn invalidate(&self, account: AccountId) {
        self.cache.delete(&profile_key(account)).await;
        self.cache.delete(&addresses_key(account)).await;
    }

    async fn load(&self, account: AccountId) -> Result<Account, AuthError> {
        self.accounts
            .account(account)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    /// Hash a password using Argon2id off the async workers.
    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|_| AuthError::PasswordHash)
        })
        .await
        .map_err(|_| AuthError::PasswordHash)?
    }

    /// Verify a password against a stored PHC string.
    async fn verify_password(&self, password: &str, hash: &str) -> Result<(), AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&hash).map_err(|_| AuthError::InvalidCredentials)?;
            hasher
                .verify_password(password.as_bytes(), &parsed_hash)
                .map_err(|_| AuthError::InvalidCredentials)
        })
        .await
        .map_err(|_| AuthError::PasswordHash)?
    }
}

pub(crate) fn profile_key(account: AccountId) -> String {
    CacheLayer::key(CacheClass::Profile, &[&account.to_string()])
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
