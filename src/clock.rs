//! Monotonic-enough wall clock, injectable so queue scheduling is deterministic in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of "now", expressed as epoch milliseconds.
///
/// Every deadline in the queue engine (visibility, delay, dedup expiry,
/// retention) is computed against this trait rather than `Instant`, so a
/// test can advance time without sleeping.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as u64
    }
}

/// A settable clock for tests. Cheap to clone; all clones share the same counter.
#[derive(Clone)]
pub struct TestClock {
    millis: Arc<AtomicU64>,
}

impl TestClock {
    pub fn new(start_millis: u64) -> Self {
        TestClock {
            millis: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_millis: u64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_deterministically() {
        let clock = TestClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
        clock.set(9_999);
        assert_eq!(clock.now_millis(), 9_999);
    }
}
