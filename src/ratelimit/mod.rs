//! Per-client admission control
//!
//! Two strategies share one interface:
//! - **fixed window** (default): up to N requests per window of length D
//! - **token bucket**: bursts of N, refilled at N/D, backed by `governor`
//!
//! A single [`RateLimiter`] is shared by every request; a janitor task
//! periodically forgets idle clients.

pub mod client_ip;
pub mod fixed_window;
pub mod token_bucket;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{RateLimitConfig, RateLimitStrategy};

pub use client_ip::{CidrParseError, IpCidr, TrustedProxies, resolve_client_ip};
pub use fixed_window::FixedWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

/// How often idle clients are purged
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Configured request limit
    pub limit: u32,
    /// When the client regains capacity
    pub reset_at: DateTime<Utc>,
    /// Zero when allowed
    pub retry_after: Duration,
}

impl RateDecision {
    pub(crate) fn allow(limit: u32, reset_in: Duration) -> Self {
        Self {
            allowed: true,
            limit,
            reset_at: reset_time(reset_in),
            retry_after: Duration::ZERO,
        }
    }

    pub(crate) fn deny(limit: u32, reset_in: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            reset_at: reset_time(reset_in),
            retry_after: reset_in,
        }
    }

    /// `Retry-After` value: whole seconds, rounded up, at least 1
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }

    /// `X-RateLimit-Reset` value in RFC 1123 form
    pub fn reset_header(&self) -> String {
        self.reset_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

fn reset_time(reset_in: Duration) -> DateTime<Utc> {
    let reset_in = chrono::Duration::from_std(reset_in).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(reset_in)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The configured admission strategy
pub enum RateLimiter {
    FixedWindow(FixedWindowLimiter),
    TokenBucket(TokenBucketLimiter),
}

impl RateLimiter {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let window = config.window.as_duration();
        info!(
            strategy = %config.strategy,
            window_secs = window.as_secs(),
            max_requests = config.max_requests,
            "Creating rate limiter"
        );

        match config.strategy {
            RateLimitStrategy::FixedWindow => {
                Self::FixedWindow(FixedWindowLimiter::new(window, config.max_requests))
            }
            RateLimitStrategy::TokenBucket => {
                let max = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
                Self::TokenBucket(TokenBucketLimiter::new(window, max))
            }
        }
    }

    pub fn is_allowed(&self, key: &str) -> RateDecision {
        match self {
            Self::FixedWindow(limiter) => limiter.check(key),
            Self::TokenBucket(limiter) => limiter.check(key),
        }
    }

    /// Forget idle clients, returning how many were dropped
    pub fn purge_idle(&self) -> usize {
        match self {
            Self::FixedWindow(limiter) => limiter.purge_idle(),
            Self::TokenBucket(limiter) => limiter.purge_idle(),
        }
    }

    pub fn tracked_keys(&self) -> usize {
        match self {
            Self::FixedWindow(limiter) => limiter.tracked_keys(),
            Self::TokenBucket(limiter) => limiter.tracked_keys(),
        }
    }

    pub fn limit(&self) -> u32 {
        match self {
            Self::FixedWindow(limiter) => limiter.max_requests(),
            Self::TokenBucket(limiter) => limiter.max_requests(),
        }
    }
}

/// Purge idle clients every `interval` until cancelled
pub fn spawn_janitor(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = limiter.purge_idle();
                    if purged > 0 {
                        debug!(purged, remaining = limiter.tracked_keys(), "Purged idle rate limit entries");
                    }
                }
            }
        }

        debug!("Rate limit janitor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_from_config_selects_strategy() {
        let mut config = RateLimitConfig::default();
        assert!(matches!(
            RateLimiter::from_config(&config),
            RateLimiter::FixedWindow(_)
        ));

        config.strategy = RateLimitStrategy::TokenBucket;
        config.max_requests = 2;
        config.window = HumanDuration::from_secs(60);
        let limiter = RateLimiter::from_config(&config);
        assert!(matches!(limiter, RateLimiter::TokenBucket(_)));
        assert_eq!(limiter.limit(), 2);

        assert!(limiter.is_allowed("a").allowed);
        assert!(limiter.is_allowed("a").allowed);
        assert!(!limiter.is_allowed("a").allowed);
    }

    #[test]
    fn test_token_bucket_on_default_clock() {
        let config = RateLimitConfig {
            strategy: RateLimitStrategy::TokenBucket,
            window: HumanDuration::from_secs(30),
            max_requests: 3,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::from_config(&config);

        let allowed = (0..5).filter(|_| limiter.is_allowed("10.0.0.9").allowed).count();
        assert_eq!(allowed, 3);
        assert_eq!(limiter.tracked_keys(), 1);

        let denied = limiter.is_allowed("10.0.0.9");
        assert!(!denied.allowed);
        assert!(denied.retry_after <= Duration::from_secs(10));
        assert!(limiter.is_allowed("10.0.0.10").allowed);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = RateDecision::deny(50, Duration::from_millis(2_100));
        assert_eq!(decision.retry_after_secs(), 3);

        let decision = RateDecision::deny(50, Duration::from_secs(4));
        assert_eq!(decision.retry_after_secs(), 4);

        let decision = RateDecision::deny(50, Duration::ZERO);
        assert_eq!(decision.retry_after_secs(), 1);
    }

    #[test]
    fn test_reset_header_format() {
        let decision = RateDecision::deny(50, Duration::from_secs(30));
        let header = decision.reset_header();

        assert!(header.ends_with(" GMT"));
        assert!(chrono::NaiveDateTime::parse_from_str(&header, "%a, %d %b %Y %H:%M:%S GMT").is_ok());
    }

    #[tokio::test]
    async fn test_janitor_stops_on_cancel() {
        let limiter = Arc::new(RateLimiter::from_config(&RateLimitConfig::default()));
        let cancel = CancellationToken::new();
        let handle = spawn_janitor(limiter, Duration::from_millis(10), cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
