//! Per-account rate limiting using governor.
//!
//! One token bucket per authenticated account: `RATE_LIMIT_PER_HOUR` requests
//! may burst at once and the bucket refills evenly over the hour.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use ecommerce_api_core::AccountId;

use crate::error::ApiError;

/// Keyed limiter over account ids.
pub type AccountRateLimiter =
    RateLimiter<AccountId, DefaultKeyedStateStore<AccountId>, DefaultClock>;

const HOUR: Duration = Duration::from_secs(3600);

/// Build the limiter; `None` when `per_hour` is zero.
#[must_use]
pub fn account_rate_limiter(per_hour: u32) -> Option<Arc<AccountRateLimiter>> {
    let burst = NonZeroU32::new(per_hour)?;
    let quota = Quota::with_period(HOUR / burst.get())?.allow_burst(burst);
    Some(Arc::new(RateLimiter::keyed(quota)))
}

/// Spend one request of `account`'s budget.
///
/// # Errors
///
/// Returns `ApiError::RateLimited` with the wait until the next request is
/// allowed.
pub fn check_account(limiter: &AccountRateLimiter, account: AccountId) -> Result<(), ApiError> {
    limiter.check_key(&account).map_err(|not_until| {
        let wait = not_until.wait_time_from(DefaultClock::default().now());
        tracing::warn!(account_id = %account, wait_secs = wait.as_secs(), "Rate limit exceeded");
        ApiError::RateLimited {
            retry_after_secs: wait.as_secs().max(1),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_disables() {
        assert!(account_rate_limiter(0).is_none());
    }

    #[test]
    fn test_budget_is_per_account() {
        let limiter = account_rate_limiter(2).unwrap();
        let alice = AccountId::new(1);
        let bob = AccountId::new(2);

        assert!(check_account(&limiter, alice).is_ok());
        assert!(check_account(&limiter, alice).is_ok());
        assert!(matches!(
            check_account(&limiter, alice),
            Err(ApiError::RateLimited { .. })
        ));
        assert!(check_account(&limiter, bob).is_ok());
    }
}
