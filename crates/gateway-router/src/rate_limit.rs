//! Per-account sliding-window rate limiter (spec.md §4.4.2). Grounded on
//! `gateway_vid`'s per-key `Mutex`-guarded map shape, applied here to a
//! bounded timestamp deque instead of an LRU.

use gateway_core::Clock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A `maxRequests` per `windowMs` preset (spec.md §4.4.2: "the configured
/// presets are informational").
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests allowed within one window.
    pub max_requests: usize,
    /// Window width.
    pub window: Duration,
}

impl RateLimitConfig {
    /// 250 requests/second, a commonly quoted Gmail-class budget.
    pub const FAST: Self = Self { max_requests: 250, window: Duration::from_secs(1) };
    /// 60 requests/minute, a commonly quoted calendar-class budget.
    pub const SLOW: Self = Self { max_requests: 60, window: Duration::from_secs(60) };
}

struct Window {
    timestamps: VecDeque<u64>,
}

/// Sliding-window limiter keyed by real account id. `throttle` suspends
/// the caller until admission, per spec.md §4.4.2.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// Build a limiter under `config`, using `clock` for timestamps (a
    /// `FrozenClock` in tests makes window-boundary behavior deterministic).
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self { clock, config, windows: Mutex::new(HashMap::new()) }
    }

    /// Block until `account_id` is under its request budget, then record
    /// this call's timestamp.
    pub async fn throttle(&self, account_id: &str) {
        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let window = windows.entry(account_id.to_string()).or_insert_with(|| Window { timestamps: VecDeque::new() });
                let now = self.clock.now_ms();
                let window_ms = self.config.window.as_millis() as u64;
                while let Some(&oldest) = window.timestamps.front() {
                    if now.saturating_sub(oldest) >= window_ms {
                        window.timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if window.timestamps.len() < self.config.max_requests {
                    window.timestamps.push_back(now);
                    None
                } else {
                    let oldest = *window.timestamps.front().expect("len checked above");
                    Some(Duration::from_millis((oldest + window_ms).saturating_sub(now)))
                }
            };
            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::FrozenClock;
    use std::sync::Arc;

    #[tokio::test]
    async fn admits_requests_under_the_limit_without_waiting() {
        let clock = Arc::new(FrozenClock::new(0));
        let limiter = RateLimiter::new(RateLimitConfig { max_requests: 3, window: Duration::from_millis(1000) }, clock);
        for _ in 0..3 {
            limiter.throttle("acct-1").await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_until_the_window_slides() {
        let clock = Arc::new(FrozenClock::new(0));
        let limiter =
            Arc::new(RateLimiter::new(RateLimitConfig { max_requests: 1, window: Duration::from_millis(100) }, clock.clone()));

        limiter.throttle("acct-1").await;

        let limiter2 = limiter.clone();
        let clock2 = clock.clone();
        let handle = tokio::spawn(async move {
            limiter2.throttle("acct-1").await;
        });

        tokio::time::advance(Duration::from_millis(50)).await;
        clock2.advance_ms(50);
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        tokio::time::advance(Duration::from_millis(60)).await;
        clock2.advance_ms(60);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn separate_accounts_have_independent_windows() {
        let clock = Arc::new(FrozenClock::new(0));
        let limiter = RateLimiter::new(RateLimitConfig { max_requests: 1, window: Duration::from_millis(1000) }, clock);
        limiter.throttle("acct-1").await;
        limiter.throttle("acct-2").await;
    }
}
