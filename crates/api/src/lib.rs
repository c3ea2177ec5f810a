//! Ecommerce API - headless store backend.
//!
//! # Architecture
//!
//! - Axum REST surface under a configurable base path
//! - Opaque session tokens, indexed in process and persisted to the store
//! - Per-account carts, orders placed in one store transaction
//! - `PostgreSQL` via `sqlx`, or an in-memory store for development and tests
//! - Moka cache in front of cart, order, address and profile reads

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, Result};
pub use routes::app;
pub use state::AppState;
