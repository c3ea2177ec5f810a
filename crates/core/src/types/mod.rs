//! Domain types shared by the API server and the CLI.

pub mod id;
pub mod identity;
pub mod line_key;
pub mod money;
pub mod status;

pub use id::*;
pub use identity::{Email, EmailError, Username, UsernameError};
pub use line_key::LineKey;
pub use money::{CurrencyCode, Money};
pub use status::{AddressType, OrderStatus};
