//! Business logic services.
//!
//! # Services
//!
//! - `tokens` - Session token index and lifecycle
//! - `auth` - Login, registration, session validation and profile
//! - `cart` - Per-account cart mutations and rendered cart views
//! - `orders` - Order placement, cancellation and listing
//! - `addresses` - Billing and shipping address book

pub mod addresses;
pub mod auth;
pub mod cart;
pub mod locks;
pub mod orders;
pub mod tokens;

pub use addresses::{AddressBook, AddressBookView, AddressEntry, AddressError};
pub use auth::{AuthError, Authenticator, ProfileUpdate, Registration};
pub use cart::{AddItem, CartCount, CartError, CartManager};
pub use locks::AccountLocks;
pub use orders::{
    BreadcrumbObserver, CreateOrder, OrderEngine, OrderError, OrderObserver, StatusEntry,
};
pub use tokens::TokenStore;
