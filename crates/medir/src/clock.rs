//! Monotonic clock abstraction.
//!
//! All lifecycle timing runs on raw clock ticks with a fixed
//! ticks-per-millisecond ratio resolved once at construction, so elapsed-time
//! math is a subtraction and a divide regardless of the underlying source.
//! [`FakeClock`] provides manual time control for deterministic tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic time in raw ticks.
///
/// `ticks_per_ms` must stay constant for the lifetime of the clock; callers
/// cache it once and convert tick deltas to milliseconds with it.
pub trait MonotonicClock: Send + Sync {
    /// Current tick count. Never decreases.
    fn now_ticks(&self) -> u64;

    /// Fixed number of ticks per millisecond.
    fn ticks_per_ms(&self) -> u64;
}

/// System clock backed by [`Instant`], with nanosecond ticks.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now_ticks(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn ticks_per_ms(&self) -> u64 {
        1_000_000
    }
}

/// Manually-advanced clock for deterministic tests.
///
/// Ticks are milliseconds (`ticks_per_ms` = 1). Shared freely across threads;
/// `advance`/`set` are visible to all holders immediately.
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ms: AtomicU64,
}

impl FakeClock {
    /// Create a fake clock at t = 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now_ms: AtomicU64::new(0),
        }
    }

    /// Create a fake clock at a given millisecond timestamp.
    #[must_use]
    pub fn at(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute millisecond timestamp.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Current fake time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl MonotonicClock for FakeClock {
    fn now_ticks(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn ticks_per_ms(&self) -> u64 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    mod system_clock_tests {
        use super::*;

        #[test]
        fn test_monotonic() {
            let clock = SystemClock::new();
            let a = clock.now_ticks();
            let b = clock.now_ticks();
            assert!(b >= a);
        }

        #[test]
        fn test_ticks_per_ms() {
            let clock = SystemClock::new();
            assert_eq!(clock.ticks_per_ms(), 1_000_000);
        }
    }

    mod fake_clock_tests {
        use super::*;

        #[test]
        fn test_starts_at_zero() {
            let clock = FakeClock::new();
            assert_eq!(clock.now_ticks(), 0);
        }

        #[test]
        fn test_advance() {
            let clock = FakeClock::new();
            clock.advance(150);
            clock.advance(50);
            assert_eq!(clock.now_ms(), 200);
        }

        #[test]
        fn test_set() {
            let clock = FakeClock::at(100);
            clock.set(5000);
            assert_eq!(clock.now_ticks(), 5000);
        }

        #[test]
        fn test_shared_across_threads() {
            let clock = Arc::new(FakeClock::new());
            let other = clock.clone();
            std::thread::spawn(move || other.advance(42))
                .join()
                .unwrap();
            assert_eq!(clock.now_ms(), 42);
        }
    }
}
