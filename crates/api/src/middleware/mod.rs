//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS
//! 5. Session token auth on protected routes, including the per-account
//!    rate limit

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{Authenticated, extract_token, require_auth};
pub use rate_limit::{AccountRateLimiter, account_rate_limiter};
pub use request_id::request_id_middleware;
