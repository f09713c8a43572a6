use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const DEFAULT_MAX_REQUESTS: u32 = 60; // requests per window
const DEFAULT_WINDOW_SECONDS: u64 = 60; // 1 minute

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Fixed-window request limiter keyed by an arbitrary string (endpoint name).
///
/// Construct one per client and share it by reference; `reset` clears every
/// window.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    disabled: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_REQUESTS,
            Duration::from_secs(DEFAULT_WINDOW_SECONDS),
        )
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            disabled: false,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that lets everything through.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.disabled {
            return RateDecision::Allowed;
        }

        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        let window = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(window.started_at));
            tracing::warn!(
                "Client-side rate limit reached for {} ({} per {:?})",
                key,
                self.max_requests,
                self.window
            );
            return RateDecision::Limited { retry_after };
        }

        window.count += 1;
        RateDecision::Allowed
    }

    pub fn reset(&self) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn reset_key(&self, key: &str) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
