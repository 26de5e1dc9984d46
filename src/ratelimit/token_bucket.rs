use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use super::RateDecision;

type KeyedLimiter<C> =
    RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Token bucket per key: bursts of up to `max_requests`, refilled evenly
/// over `window`.
pub struct TokenBucketLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    clock: C,
    window: Duration,
    max_requests: NonZeroU32,
}

impl TokenBucketLimiter<DefaultClock> {
    pub fn new(window: Duration, max_requests: NonZeroU32) -> Self {
        Self::with_clock(window, max_requests, DefaultClock::default())
    }
}

impl<C: Clock + Clone> TokenBucketLimiter<C> {
    pub fn with_clock(window: Duration, max_requests: NonZeroU32, clock: C) -> Self {
        let period = (window / max_requests.get()).max(Duration::from_nanos(1));
        let quota = Quota::with_period(period)
            .map(|quota| quota.allow_burst(max_requests))
            .unwrap_or_else(|| Quota::per_second(max_requests));

        Self {
            limiter: RateLimiter::dashmap_with_clock(quota, clock.clone()),
            clock,
            window,
            max_requests,
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        let key = key.to_string();
        match self.limiter.check_key(&key) {
            Ok(()) => RateDecision::allow(self.max_requests.get(), self.window),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                RateDecision::deny(self.max_requests.get(), wait)
            }
        }
    }

    /// Forget keys whose bucket has refilled completely
    pub fn purge_idle(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        before.saturating_sub(self.limiter.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }
}
