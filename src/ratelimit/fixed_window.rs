use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::RateDecision;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Counts requests per key in windows of fixed length.
///
/// A window opens with a key's first request and resets once it has fully
/// elapsed; up to `max_requests` are admitted per window.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    clients: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Decide as if the current instant were `now`
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut clients = self.clients.lock();

        let state = clients.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.saturating_duration_since(state.started) > self.window {
            *state = Window {
                count: 0,
                started: now,
            };
        }

        let reset_in = (state.started + self.window).saturating_duration_since(now);

        if state.count < self.max_requests {
            state.count += 1;
            RateDecision::allow(self.max_requests, reset_in)
        } else {
            RateDecision::deny(self.max_requests, reset_in)
        }
    }

    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    /// Drop keys whose window started more than two windows ago
    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let idle_after = self.window * 2;
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, state| now.saturating_duration_since(state.started) <= idle_after);
        before - clients.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}
