//! Per-account serialization of cart and order mutations.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use ecommerce_api_core::AccountId;

/// Lock table keyed by account.
///
/// Different accounts never contend; the map's sharding keeps lookups from
/// serializing across accounts.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account`.
    pub async fn lock(&self, account: AccountId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(account).or_default().clone();
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on, returning how many went.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        // The map's own reference is the only one left when idle
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    /// Number of accounts with a lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
