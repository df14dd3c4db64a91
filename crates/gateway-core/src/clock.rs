//! Process-wide clock abstraction: a `Clock` trait plus a swappable
//! process-wide registry, so production code reads the registered clock
//! instead of calling `SystemTime::now()` directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock abstraction for deterministic time in test harnesses; production
/// code reads `now_ms()` rather than `SystemTime::now()` directly so tests
/// can swap in a `FrozenClock`.
pub trait Clock: Send + Sync {
    /// Milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// Production clock backed by `SystemTime`.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Deterministic clock for tests: starts at a fixed value and only advances
/// when told to.
pub struct FrozenClock {
    now: AtomicU64,
}

impl FrozenClock {
    /// Create a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self { now: AtomicU64::new(start_ms) }
    }

    /// Advance the clock by `delta_ms`.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Set the clock to an absolute value.
    pub fn set_ms(&self, value: u64) {
        self.now.store(value, Ordering::SeqCst);
    }
}

impl Clock for FrozenClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

static PROCESS_CLOCK: OnceLock<RwLock<Arc<dyn Clock>>> = OnceLock::new();

/// Get the current process-wide `Clock` (cheap `Arc` clone).
pub fn process_clock() -> Arc<dyn Clock> {
    PROCESS_CLOCK.get_or_init(|| RwLock::new(Arc::new(SystemClock))).read().expect("clock lock poisoned").clone()
}

/// Swap the process-wide clock. Used by tests that need deterministic time.
pub fn set_process_clock(clock: Arc<dyn Clock>) {
    let cell = PROCESS_CLOCK.get_or_init(|| RwLock::new(Arc::new(SystemClock)));
    *cell.write().expect("clock lock poisoned") = clock;
}
