//! Billing and shipping address book.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ecommerce_api_core::{AccountId, AddressType, Email};

use crate::cache::{CacheClass, CacheLayer};
use crate::db::{AccountStore, RepositoryError};
use crate::models::{Account, Address};
use crate::services::auth::profile_key;
use crate::services::locks::AccountLocks;

/// Errors that can occur during address operations.
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("{0}")]
    Validation(String),

    #[error("no {0} address on file")]
    NotFound(AddressType),

    /// The account behind the session no longer exists.
    #[error("account not found")]
    AccountNotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One address with its default flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressEntry {
    #[serde(flatten)]
    pub address: Address,
    pub is_default: bool,
}

/// Both addresses of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressBookView {
    pub billing: AddressEntry,
    pub shipping: AddressEntry,
}

impl From<&Account> for AddressBookView {
    fn from(account: &Account) -> Self {
        let entry = |kind: AddressType| AddressEntry {
            address: account.address(kind).clone(),
            is_default: account.default_address == Some(kind),
        };
        Self {
            billing: entry(AddressType::Billing),
            shipping: AddressEntry {
                address: account.shipping.as_shipping(),
                ..entry(AddressType::Shipping)
            },
        }
    }
}

/// Address service.
pub struct AddressBook {
    accounts: Arc<dyn AccountStore>,
    locks: Arc<AccountLocks>,
    cache: CacheLayer,
}

impl AddressBook {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, locks: Arc<AccountLocks>, cache: CacheLayer) -> Self {
        Self {
            accounts,
            locks,
            cache,
        }
    }

    /// Both addresses with their default flags.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::AccountNotFound` if the account is gone.
    pub async fn list(&self, account: AccountId) -> Result<AddressBookView, AddressError> {
        let key = addresses_key(account);
        if let Some(view) = self.cache.get::<AddressBookView>(&key).await {
            return Ok(view);
        }

        let view = AddressBookView::from(&self.load(account).await?);
        self.cache.put(CacheClass::Addresses, &key, &view).await;
        Ok(view)
    }

    /// Create or replace the address of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::Validation` when required fields are blank or
    /// the billing email is malformed.
    pub async fn put(
        &self,
        account: AccountId,
        kind: AddressType,
        address: Address,
    ) -> Result<AddressEntry, AddressError> {
        let address = address.trimmed();
        let missing = address.missing_fields(kind);
        if !missing.is_empty() {
            return Err(AddressError::Validation(format!(
                "missing {kind} fields: {}",
                missing.join(", ")
            )));
        }
        let address = match kind {
            AddressType::Billing => {
                if let Some(email) = address.email.as_deref() {
                    Email::parse(email)
                        .map_err(|e| AddressError::Validation(format!("billing email: {e}")))?;
                }
                address
            }
            AddressType::Shipping => address.as_shipping(),
        };

        let _guard = self.locks.lock(account).await;
        let mut current = self.load(account).await?;
        *current.address_mut(kind) = address.clone();
        self.save(&current).await?;

        Ok(AddressEntry {
            address,
            is_default: current.default_address == Some(kind),
        })
    }

    /// Clear the address of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::NotFound` if nothing is on file.
    pub async fn delete(&self, account: AccountId, kind: AddressType) -> Result<(), AddressError> {
        let _guard = self.locks.lock(account).await;
        let mut current = self.load(account).await?;
        if current.address(kind).is_empty() {
            return Err(AddressError::NotFound(kind));
        }

        *current.address_mut(kind) = Address::default();
        if current.default_address == Some(kind) {
            current.default_address = None;
        }
        self.save(&current).await
    }

    /// Flag the address of `kind` as default.
    ///
    /// # Errors
    ///
    /// Returns `AddressError::NotFound` if that address has no street line.
    pub async fn set_default(
        &self,
        account: AccountId,
        kind: AddressType,
    ) -> Result<AddressBookView, AddressError> {
        let _guard = self.locks.lock(account).await;
        let mut current = self.load(account).await?;
        if current.address(kind).address_1.trim().is_empty() {
            return Err(AddressError::NotFound(kind));
        }

        current.default_address = Some(kind);
        self.save(&current).await?;
        Ok(AddressBookView::from(&current))
    }

    async fn load(&self, account: AccountId) -> Result<Account, AddressError> {
        self.accounts
            .account(account)
            .await?
            .ok_or(AddressError::AccountNotFound)
    }

    async fn save(&self, account: &Account) -> Result<(), AddressError> {
        self.accounts.update_account(account).await?;
        self.cache.delete(&addresses_key(account.id)).await;
        self.cache.delete(&profile_key(account.id)).await;
        Ok(())
    }
}

pub(crate) fn addresses_key(account: AccountId) -> String {
    CacheLayer::key(CacheClass::Addresses, &[&account.to_string()])
}
