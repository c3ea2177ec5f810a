//! Ecommerce API Core - Shared types library.
//!
//! This crate provides the domain types used by every workspace member:
//! - `api` - The REST API server
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP.
//! Database encoding for the types is available behind the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, identities, money, line keys and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
