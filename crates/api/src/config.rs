//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Storage
//! - `API_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`).
//!   When neither is set the server runs on the in-memory store.
//! - `API_SEED_FILE` - YAML catalog loaded into the in-memory store at start-up
//!
//! ## Server
//! - `API_HOST` - Bind address (default: 127.0.0.1)
//! - `API_PORT` - Listen port (default: 3000)
//! - `API_BASE_PATH` - Route prefix (default: /ecommerce-api/v1)
//! - `API_CORS_ORIGINS` - Comma-separated allowed origins (default: any)
//! - `STORE_TIMEOUT_MS` - Upper bound on a single store call (default: 5000)
//! - `CURRENCY` - ISO 4217 code used for orders (default: USD)
//!
//! ## Sessions
//! - `AUTH_TOKEN_TTL_DAYS` - Token lifetime (default: 30)
//! - `AUTH_MAX_TOKENS` - Live tokens per account (default: 5)
//! - `AUTH_SWEEP_INTERVAL_SECS` - Expired token sweep interval (default: 3600)
//! - `AUTH_ARGON2_MEMORY_KIB`, `AUTH_ARGON2_ITERATIONS`, `AUTH_ARGON2_PARALLELISM`
//! - `RATE_LIMIT_PER_HOUR` - Requests per account per hour, 0 disables (default: 1000)
//!
//! ## Caching
//! - `CART_CACHE_TTL_SECS` - Cart view TTL (default: 300)
//! - `CACHE_MAX_CAPACITY` - Maximum cached entries (default: 10000)
//!
//! ## Observability
//! - `LOG_FORMAT` - `json` for structured output, anything else for text
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use ecommerce_api_core::CurrencyCode;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` connection URL; `None` selects the in-memory store
    pub database_url: Option<SecretString>,
    /// Catalog seed for the in-memory store
    pub seed_file: Option<PathBuf>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Prefix every API route is nested under
    pub base_path: String,
    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,
    /// Upper bound on a single store call
    pub store_timeout: Duration,
    /// Currency recorded on new orders
    pub currency: CurrencyCode,
    /// Session token settings
    pub auth: AuthConfig,
    /// Cache settings
    pub cache: CacheConfig,
    /// Emit JSON logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Session token and password hashing settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Fixed lifetime of an issued token
    pub token_ttl: chrono::Duration,
    /// Live tokens allowed per account
    pub max_tokens: usize,
    /// Interval of the background expired-token sweep
    pub sweep_interval: Duration,
    /// Requests per account per hour; 0 disables limiting
    pub rate_limit_per_hour: u32,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    /// Argon2 time cost
    pub argon2_iterations: u32,
    /// Argon2 lanes
    pub argon2_parallelism: u32,
}

/// Cache sizing and per-class lifetimes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cart view lifetime
    pub cart_ttl: Duration,
    /// Maximum number of cached entries
    pub max_capacity: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            seed_file: None,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            base_path: "/ecommerce-api/v1".to_owned(),
            cors_origins: Vec::new(),
            store_timeout: Duration::from_millis(5000),
            currency: CurrencyCode::default(),
            auth: AuthConfig::default(),
            cache: CacheConfig::default(),
            log_json: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: chrono::Duration::days(30),
            max_tokens: 5,
            sweep_interval: Duration::from_secs(3600),
            rate_limit_per_hour: 1000,
            // argon2 crate defaults (OWASP minimum for Argon2id)
            argon2_memory_kib: 19_456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cart_ttl: Duration::from_secs(300),
            max_capacity: 10_000,
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed,
    /// or if a numeric setting is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let base_path = normalize_base_path(&get_env_or_default(
            "API_BASE_PATH",
            &defaults.base_path,
        ));

        let cors_origins = get_optional_env("API_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let store_timeout_ms: u64 = parse_env("STORE_TIMEOUT_MS", 5000)?;
        if store_timeout_ms == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "STORE_TIMEOUT_MS".to_owned(),
                "must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url: get_database_url("API_DATABASE_URL"),
            seed_file: get_optional_env("API_SEED_FILE").map(PathBuf::from),
            host: parse_env("API_HOST", defaults.host)?,
            port: parse_env("API_PORT", defaults.port)?,
            base_path,
            cors_origins,
            store_timeout: Duration::from_millis(store_timeout_ms),
            currency: parse_env("CURRENCY", defaults.currency)?,
            auth: AuthConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            log_json: get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", defaults.sentry_sample_rate)?,
            sentry_traces_sample_rate: parse_env(
                "SENTRY_TRACES_SAMPLE_RATE",
                defaults.sentry_traces_sample_rate,
            )?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl AuthConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ttl_days: i64 = parse_env("AUTH_TOKEN_TTL_DAYS", 30)?;
        if ttl_days <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "AUTH_TOKEN_TTL_DAYS".to_owned(),
                "must be at least 1".to_owned(),
            ));
        }

        let max_tokens: usize = parse_env("AUTH_MAX_TOKENS", defaults.max_tokens)?;
        if max_tokens == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "AUTH_MAX_TOKENS".to_owned(),
                "must be at least 1".to_owned(),
            ));
        }

        let sweep_secs: u64 = parse_env("AUTH_SWEEP_INTERVAL_SECS", 3600)?;

        Ok(Self {
            token_ttl: chrono::Duration::days(ttl_days),
            max_tokens,
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            rate_limit_per_hour: parse_env("RATE_LIMIT_PER_HOUR", defaults.rate_limit_per_hour)?,
            argon2_memory_kib: parse_env("AUTH_ARGON2_MEMORY_KIB", defaults.argon2_memory_kib)?,
            argon2_iterations: parse_env("AUTH_ARGON2_ITERATIONS", defaults.argon2_iterations)?,
            argon2_parallelism: parse_env("AUTH_ARGON2_PARALLELISM", defaults.argon2_parallelism)?,
        })
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cart_secs: u64 = parse_env("CART_CACHE_TTL_SECS", 300)?;
        Ok(Self {
            cart_ttl: Duration::from_secs(cart_secs),
            max_capacity: parse_env("CACHE_MAX_CAPACITY", defaults.max_capacity)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Option<SecretString> {
    get_optional_env(primary_key)
        .or_else(|| get_optional_env("DATABASE_URL"))
        .map(SecretString::from)
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_owned())
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_owned(), e.to_string()))
    })
}

/// Ensure a leading slash and no trailing slash; `/` becomes empty.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
