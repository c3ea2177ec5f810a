//! Session token store.
//!
//! Live tokens are indexed in process by digest, with a per-account list in
//! creation order, and written through to a [`SessionStore`] so they survive a
//! restart. Both views are updated under one lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;

use ecommerce_api_core::AccountId;

use crate::clock::Clock;
use crate::db::{RepositoryError, SessionStore};
use crate::models::{IssuedToken, SessionToken, TokenDigest, TokenRecord};

/// Random bytes per token; rendered as twice as many hex chars.
const TOKEN_BYTES: usize = 32;

#[derive(Default)]
struct TokenIndex {
    by_digest: HashMap<TokenDigest, TokenRecord>,
    /// Oldest first.
    by_account: HashMap<AccountId, VecDeque<TokenDigest>>,
}

impl TokenIndex {
    /// Add a record and evict the account's oldest tokens beyond `max`.
    fn insert(&mut self, record: TokenRecord, max: usize) -> Vec<TokenDigest> {
        let list = self.by_account.entry(record.account_id).or_default();
        list.push_back(record.digest.clone());

        let mut evicted = Vec::new();
        while list.len() > max {
            if let Some(oldest) = list.pop_front() {
                self.by_digest.remove(&oldest);
                evicted.push(oldest);
            }
        }
        self.by_digest.insert(record.digest.clone(), record);
        evicted
    }

    fn remove(&mut self, digest: &TokenDigest) -> Option<TokenRecord> {
        let record = self.by_digest.remove(digest)?;
        if let Some(list) = self.by_account.get_mut(&record.account_id) {
            list.retain(|d| d != digest);
            if list.is_empty() {
                self.by_account.remove(&record.account_id);
            }
        }
        Some(record)
    }

    fn remove_account(&mut self, account: AccountId) -> Vec<TokenDigest> {
        let digests: Vec<TokenDigest> = self
            .by_account
            .remove(&account)
            .map(Vec::from)
            .unwrap_or_default();
        for digest in &digests {
            self.by_digest.remove(digest);
        }
        digests
    }

    fn prune_account(&mut self, account: AccountId, now: DateTime<Utc>) -> Vec<TokenDigest> {
        let expired: Vec<TokenDigest> = self
            .by_account
            .get(&account)
            .into_iter()
            .flatten()
            .filter(|d| self.by_digest.get(*d).is_none_or(|r| r.is_expired(now)))
            .cloned()
            .collect();
        for digest in &expired {
            self.remove(digest);
        }
        expired
    }

    fn prune_all(&mut self, now: DateTime<Utc>) -> Vec<TokenDigest> {
        let expired: Vec<TokenDigest> = self
            .by_digest
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.digest.clone())
            .collect();
        for digest in &expired {
            self.remove(digest);
        }
        expired
    }
}

/// Issues, resolves and revokes session tokens.
pub struct TokenStore {
    index: Mutex<TokenIndex>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    max_tokens: usize,
}

impl TokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        ttl: chrono::Duration,
        max_tokens: usize,
    ) -> Self {
        Self {
            index: Mutex::new(TokenIndex::default()),
            sessions,
            clock,
            ttl,
            max_tokens: max_tokens.max(1),
        }
    }

    /// Rebuild the index from the session store.
    ///
    /// # Errors
    ///
    /// Returns the store error if live sessions cannot be read.
    pub async fn load(&self) -> Result<usize, RepositoryError> {
        let now = self.clock.now();
        let mut records = self.sessions.live_sessions(now).await?;
        records.sort_by_key(|r| r.created_at);

        let evicted = {
            let mut index = self.index.lock();
            let mut evicted = Vec::new();
            for record in records {
                evicted.extend(index.insert(record, self.max_tokens));
            }
            evicted
        };
        self.forget(&evicted).await;

        Ok(self.index.lock().by_digest.len())
    }

    /// Mint a token for `account`.
    ///
    /// Expired tokens of the account are pruned first and the oldest live
    /// tokens are evicted so the account never holds more than `max_tokens`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the token cannot be persisted; no token is
    /// issued in that case.
    pub async fn issue(&self, account: AccountId) -> Result<IssuedToken, RepositoryError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = SessionToken::new(hex::encode(bytes));

        let now = self.clock.now();
        let record = TokenRecord {
            digest: token.digest(),
            account_id: account,
            created_at: now,
            expires_at: now + self.ttl,
            last_used_at: now,
        };
        self.sessions.save_session(&record).await?;

        let stale = {
            let mut index = self.index.lock();
            let mut stale = index.prune_account(account, now);
            stale.extend(index.insert(record.clone(), self.max_tokens));
            stale
        };
        if !stale.is_empty() {
            tracing::debug!(account_id = %account, dropped = stale.len(), "Dropped old session tokens");
        }
        self.forget(&stale).await;

        Ok(IssuedToken {
            token,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
    }

    /// Look up a live token and mark it used.
    ///
    /// An expired token is purged and reported as absent.
    pub async fn validate(&self, token: &SessionToken) -> Option<TokenRecord> {
        let digest = token.digest();
        let now = self.clock.now();

        let record = {
            let mut index = self.index.lock();
            let expired = index.by_digest.get(&digest)?.is_expired(now);
            if expired {
                index.remove(&digest);
                None
            } else {
                index.by_digest.get_mut(&digest).map(|record| {
                    record.last_used_at = now;
                    record.clone()
                })
            }
        };

        if record.is_none() {
            tracing::debug!(token = digest.short(), "Purged expired session token");
            self.forget(std::slice::from_ref(&digest)).await;
        }
        record
    }

    /// Refresh `last_used_at` without extending expiry.
    pub fn touch(&self, account: AccountId, token: &SessionToken) {
        let digest = token.digest();
        let now = self.clock.now();
        let mut index = self.index.lock();
        if let Some(record) = index.by_digest.get_mut(&digest)
            && record.account_id == account
        {
            record.last_used_at = now;
        }
    }

    /// Remove one token of `account`. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns the store error if the durable copy cannot be deleted.
    pub async fn revoke(
        &self,
        account: AccountId,
        token: &SessionToken,
    ) -> Result<(), RepositoryError> {
        let digest = token.digest();
        let removed = {
            let mut index = self.index.lock();
            match index.by_digest.get(&digest) {
                Some(record) if record.account_id == account => index.remove(&digest),
                _ => None,
            }
        };
        if removed.is_some() {
            self.sessions
                .delete_sessions(std::slice::from_ref(&digest))
                .await?;
        }
        Ok(())
    }

    /// Remove every token of `account`, returning how many were live.
    ///
    /// # Errors
    ///
    /// Returns the store error if the durable copies cannot be deleted.
    pub async fn revoke_all(&self, account: AccountId) -> Result<usize, RepositoryError> {
        let digests = self.index.lock().remove_account(account);
        if !digests.is_empty() {
            self.sessions.delete_sessions(&digests).await?;
        }
        Ok(digests.len())
    }

    /// Drop expired tokens of one account.
    pub async fn prune_expired(&self, account: AccountId) -> usize {
        let now = self.clock.now();
        let expired = self.index.lock().prune_account(account, now);
        self.forget(&expired).await;
        expired.len()
    }

    /// Drop expired tokens of every account.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired = self.index.lock().prune_all(now);
        self.forget(&expired).await;
        expired.len()
    }

    /// Live tokens held by `account`.
    #[must_use]
    pub fn live_count(&self, account: AccountId) -> usize {
        let now = self.clock.now();
        let index = self.index.lock();
        index.by_account.get(&account).map_or(0, |list| {
            list.iter()
                .filter_map(|d| index.by_digest.get(d))
                .filter(|r| !r.is_expired(now))
                .count()
        })
    }

    /// Best-effort delete of durable copies.
    async fn forget(&self, digests: &[TokenDigest]) {
        if digests.is_empty() {
            return;
        }
        if let Err(e) = self.sessions.delete_sessions(digests).await {
            tracing::warn!(error = %e, count = digests.len(), "Failed to delete stale sessions");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::memory::MemoryStore;

    fn store(max_tokens: usize) -> (TokenStore, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::default());
        let sessions = Arc::new(MemoryStore::new());
        let tokens = TokenStore::new(
            sessions.clone(),
            clock.clone(),
            chrono::Duration::days(30),
            max_tokens,
        );
        (tokens, clock, sessions)
    }

    #[tokio::test]
    async fn test_issue_produces_64_hex_chars() {
        let (tokens, _, _) = store(5);
        let issued = tokens.issue(AccountId::new(1)).await.unwrap();
        let raw = issued.token.expose();
        assert_eq!(raw.len(), 64);
        assert!(raw.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(issued.expires_at - issued.created_at, chrono::Duration::days(30));
    }

    #[tokio::test]
    async fn test_oldest_token_evicted_beyond_max() {
        let (tokens, clock, _) = store(5);
        let account = AccountId::new(1);

        let mut issued = Vec::new();
        for _ in 0..6 {
            issued.push(tokens.issue(account).await.unwrap().token);
            clock.advance(chrono::Duration::seconds(1));
        }

        assert_eq!(tokens.live_count(account), 5);
        assert!(tokens.validate(&issued[0]).await.is_none());
        for token in &issued[1..] {
            assert!(tokens.validate(token).await.is_some());
        }
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_purged() {
        let (tokens, clock, _) = store(5);
        let account = AccountId::new(1);
        let token = tokens.issue(account).await.unwrap().token;

        clock.advance(chrono::Duration::days(30));
        assert!(tokens.validate(&token).await.is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(tokens.validate(&token).await.is_none());
        assert_eq!(tokens.live_count(account), 0);
    }

    #[tokio::test]
    async fn test_validate_refreshes_last_used_only() {
        let (tokens, clock, _) = store(5);
        let issued = tokens.issue(AccountId::new(1)).await.unwrap();

        clock.advance(chrono::Duration::hours(2));
        let record = tokens.validate(&issued.token).await.unwrap();
        assert_eq!(record.last_used_at, clock.now());
        assert_eq!(record.expires_at, issued.expires_at);
    }

    #[tokio::test]
    async fn test_revoke_is_scoped_and_idempotent() {
        let (tokens, _, _) = store(5);
        let alice = AccountId::new(1);
        let bob = AccountId::new(2);
        let token = tokens.issue(alice).await.unwrap().token;

        tokens.revoke(bob, &token).await.unwrap();
        assert!(tokens.validate(&token).await.is_some());

        tokens.revoke(alice, &token).await.unwrap();
        tokens.revoke(alice, &token).await.unwrap();
        assert!(tokens.validate(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_and_sweep() {
        let (tokens, clock, _) = store(5);
        let alice = AccountId::new(1);
        let bob = AccountId::new(2);
        tokens.issue(alice).await.unwrap();
        tokens.issue(alice).await.unwrap();
        tokens.issue(bob).await.unwrap();

        assert_eq!(tokens.revoke_all(alice).await.unwrap(), 2);
        assert_eq!(tokens.live_count(alice), 0);

        clock.advance(chrono::Duration::days(31));
        assert_eq!(tokens.sweep_expired().await, 1);
        assert_eq!(tokens.live_count(bob), 0);
    }

    #[tokio::test]
    async fn test_load_restores_persisted_tokens() {
        let (tokens, clock, sessions) = store(5);
        let account = AccountId::new(1);
        let token = tokens.issue(account).await.unwrap().token;

        let restarted = TokenStore::new(sessions, clock, chrono::Duration::days(30), 5);
        assert_eq!(restarted.load().await.unwrap(), 1);
        assert!(restarted.validate(&token).await.is_some());
    }
}
