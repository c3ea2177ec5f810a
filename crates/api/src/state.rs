//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::CacheLayer;
use crate::clock::Clock;
use crate::config::ApiConfig;
use crate::db::Stores;
use crate::middleware::rate_limit::{AccountRateLimiter, account_rate_limiter};
use crate::services::{
    AccountLocks, AddressBook, AuthError, Authenticator, BreadcrumbObserver, CartManager,
    OrderEngine, TokenStore,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// services and the stores behind them.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    stores: Stores,
    tokens: Arc<TokenStore>,
    auth: Authenticator,
    carts: Arc<CartManager>,
    orders: OrderEngine,
    addresses: AddressBook,
    locks: Arc<AccountLocks>,
    rate_limiter: Option<Arc<AccountRateLimiter>>,
}

/// What one [`AppState::sweep`] released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub expired_tokens: usize,
    pub idle_locks: usize,
}

impl AppState {
    /// Wire every service over `stores`.
    ///
    /// Store calls are bounded by `config.store_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordHash` if the Argon2 parameters are invalid.
    pub fn new(config: ApiConfig, stores: Stores, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let stores = stores.with_timeout(config.store_timeout);
        let cache = CacheLayer::moka(&config.cache);
        let locks = Arc::new(AccountLocks::new());

        let tokens = Arc::new(TokenStore::new(
            stores.sessions.clone(),
            clock.clone(),
            config.auth.token_ttl,
            config.auth.max_tokens,
        ));
        let auth = Authenticator::new(
            stores.accounts.clone(),
            tokens.clone(),
            cache.clone(),
            clock.clone(),
            &config.auth,
        )?;
        let carts = Arc::new(CartManager::new(
            stores.carts.clone(),
            stores.catalog.clone(),
            stores.pricing.clone(),
            locks.clone(),
            cache.clone(),
            clock.clone(),
            config.currency,
        ));
        let orders = OrderEngine::new(
            stores.orders.clone(),
            carts.clone(),
            locks.clone(),
            cache.clone(),
            clock,
            config.currency,
        )
        .with_observer(Arc::new(BreadcrumbObserver));
        let addresses = AddressBook::new(stores.accounts.clone(), locks.clone(), cache);
        let rate_limiter = account_rate_limiter(config.auth.rate_limit_per_hour);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                tokens,
                auth,
                carts,
                orders,
                addresses,
                locks,
                rate_limiter,
            }),
        })
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// The (timeout-bounded) stores.
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    #[must_use]
    pub fn auth(&self) -> &Authenticator {
        &self.inner.auth
    }

    #[must_use]
    pub fn carts(&self) -> &CartManager {
        &self.inner.carts
    }

    #[must_use]
    pub fn orders(&self) -> &OrderEngine {
        &self.inner.orders
    }

    #[must_use]
    pub fn addresses(&self) -> &AddressBook {
        &self.inner.addresses
    }

    /// Per-account limiter; `None` when rate limiting is disabled.
    #[must_use]
    pub fn rate_limiter(&self) -> Option<&AccountRateLimiter> {
        self.inner.rate_limiter.as_deref()
    }

    /// Release per-account state nothing needs any more: expired tokens,
    /// unheld account locks and rate-limit buckets that have refilled.
    pub async fn sweep(&self) -> SweepReport {
        let expired_tokens = self.inner.tokens.sweep_expired().await;
        let idle_locks = self.inner.locks.prune_idle();
        if let Some(limiter) = &self.inner.rate_limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
        SweepReport {
            expired_tokens,
            idle_locks,
        }
    }

    /// Run [`Self::sweep`] every `every` until the runtime shuts down.
    #[must_use]
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let report = state.sweep().await;
                if report.expired_tokens > 0 {
                    tracing::info!(pruned = report.expired_tokens, "Swept expired session tokens");
                }
                tracing::debug!(idle_locks = report.idle_locks, "Released idle account locks");
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ecommerce_api_core::AccountId;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AuthConfig;
    use crate::db::memory::MemoryStore;
    
    fn state(clock: Arc<ManualClock>) -> AppState {
        let config = ApiConfig {
            auth: AuthConfig {
                argon2_memory_kib: 8,
                argon2_iterations: 1,
                argon2_parallelism: 1,
                ..AuthConfig::default()
            },
            ..ApiConfig::default()
        };
        AppState::new(config, Stores::memory(Arc::new(MemoryStore::new())), clock).unwrap()
    }

    #[tokio::test]
    async fn test_sweep_releases_idle_state() {
        let clock = Arc::new(ManualClock::default());
        let state = state(clock.clone());

        drop(state.inner.locks.lock(AccountId::new(1)).await);
        let held = state.inner.locks.lock(AccountId::new(2)).await;
        state.tokens().issue(AccountId::new(3)).await.unwrap();
        clock.advance(chrono::Duration::days(31));

        let report = state.sweep().await;
        assert_eq!(report.expired_tokens, 1);
        assert_eq!(report.idle_locks, 1);
        assert_eq!(state.inner.locks.len(), 1);

        drop(held);
        assert_eq!(state.sweep().await.idle_locks, 1);
        assert!(state.inner.locks.is_empty());
    }
}
