//! Account domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecommerce_api_core::{AccountId, AddressType, Email, Username};

/// A registered customer.
#[derive(Debug, Clone)]
pub struct Account {
    /// Unique account ID.
    pub id: AccountId,
    /// Login name.
    pub username: Username,
    /// Login email, unique across accounts.
    pub email: Email,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub billing: Address,
    pub shipping: Address,
    /// Which address is flagged as default, if any.
    pub default_address: Option<AddressType>,
    pub registered_at: DateTime<Utc>,
}

impl Account {
    /// The address of the given kind.
    #[must_use]
    pub const fn address(&self, kind: AddressType) -> &Address {
        match kind {
            AddressType::Billing => &self.billing,
            AddressType::Shipping => &self.shipping,
        }
    }

    /// Mutable access to the address of the given kind.
    pub fn address_mut(&mut self, kind: AddressType) -> &mut Address {
        match kind {
            AddressType::Billing => &mut self.billing,
            AddressType::Shipping => &mut self.shipping,
        }
    }
}

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: Username,
    pub email: Email,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
}

/// A postal address.
///
/// Billing addresses also carry `email` and `phone`; both are ignored for
/// shipping addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub address_1: String,
    pub address_2: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Address {
    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of required fields that are blank.
    #[must_use]
    pub fn missing_fields(&self, kind: AddressType) -> Vec<&'static str> {
        let mut missing: Vec<&'static str> = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("address_1", &self.address_1),
            ("city", &self.city),
            ("postcode", &self.postcode),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if kind == AddressType::Billing
            && self.email.as_deref().is_none_or(|e| e.trim().is_empty())
        {
            missing.push("email");
        }
        missing
    }

    /// Copy with the billing-only fields dropped.
    #[must_use]
    pub fn as_shipping(&self) -> Self {
        Self {
            email: None,
            phone: None,
            ..self.clone()
        }
    }

    /// Trim every field.
    #[must_use]
    pub fn trimmed(self) -> Self {
        let trim = |s: String| s.trim().to_owned();
        Self {
            first_name: trim(self.first_name),
            last_name: trim(self.last_name),
            company: trim(self.company),
            address_1: trim(self.address_1),
            address_2: trim(self.address_2),
            city: trim(self.city),
            state: trim(self.state),
            postcode: trim(self.postcode),
            country: trim(self.country).to_uppercase(),
            email: self.email.map(trim).filter(|e| !e.is_empty()),
            phone: self.phone.map(trim).filter(|p| !p.is_empty()),
        }
    }
}

/// Public view of an account, as returned by login and register.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.to_string(),
            email: account.email.to_string(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            display_name: account.display_name.clone(),
            registered_at: account.registered_at,
        }
    }
}

/// Full profile including both addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
    pub billing: Address,
    pub shipping: Address,
}

impl From<&Account> for Profile {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.to_string(),
            email: account.email.to_string(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            display_name: account.display_name.clone(),
            registered_at: account.registered_at,
            billing: account.billing.clone(),
            shipping: account.shipping.as_shipping(),
        }
    }
}

/// Display name from first and last name, falling back to the username.
#[must_use]
pub fn display_name_for(first_name: &str, last_name: &str, username: &Username) -> String {
    let joined = format!("{} {}", first_name.trim(), last_name.trim());
    let joined = joined.trim();
    if joined.is_empty() {
        username.to_string()
    } else {
        joined.to_owned()
    }
}
