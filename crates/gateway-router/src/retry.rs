//! Exponential backoff with jitter (spec.md §4.4.1). Grounded on
//! `orchestrator::OrchestratorService::retry`'s fixed-delay loop, widened
//! here to exponential growth with a cap and jitter, plus transient/
//! permanent error classification so only retriable failures consume an
//! attempt's delay.

use gateway_core::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Tunables for [`with_retry`]. The defaults match spec.md §4.4.1 exactly.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (non-retry) one.
    pub attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Growth factor applied to the delay after each failed attempt.
    pub multiplier: f64,
    /// Upper bound on the (pre-jitter) delay.
    pub cap: Duration,
    /// Jitter range applied multiplicatively to the delay, e.g. `0.5..=1.0`.
    pub jitter: std::ops::RangeInclusive<f64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(5),
            jitter: 0.5..=1.0,
        }
    }
}

/// Called after each failed attempt, before sleeping, for observability
/// (spec.md §4.4.1: "a retry callback is available for observability").
pub type RetryObserver<'a> = dyn Fn(u32, &GatewayError) + Send + Sync + 'a;

/// Run `f` under `policy`, retrying only `GatewayError`s for which
/// [`GatewayError::is_retriable`] is true. Any other error, or exhaustion
/// of `attempts`, returns immediately.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, observer: Option<&RetryObserver<'_>>, mut f: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retriable = e.is_retriable();
                if let Some(obs) = observer {
                    obs(attempt, &e);
                }
                if !retriable || attempt >= policy.attempts {
                    return Err(e);
                }
                let jittered = jittered_delay(delay, &policy.jitter);
                tokio::time::sleep(jittered).await;
                delay = capped_next_delay(delay, policy.multiplier, policy.cap);
            }
        }
    }
}

fn capped_next_delay(delay: Duration, multiplier: f64, cap: Duration) -> Duration {
    let next_ms = (delay.as_secs_f64() * multiplier * 1000.0).round() as u64;
    Duration::from_millis(next_ms).min(cap)
}

fn jittered_delay(delay: Duration, jitter: &std::ops::RangeInclusive<f64>) -> Duration {
    let factor = rand::thread_rng().gen_range(jitter.clone());
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
