//! Video reference frame throttling.
//!
//! Video frames are captured on every sampler tick at first, then on a
//! falloff schedule so a long-running test produces a bounded frame volume:
//! the base interval for the first 20 captures, 10x base for the next 20,
//! 50x base beyond that.

/// Decides when a video reference frame is actually captured.
#[derive(Debug, Clone)]
pub struct VideoThrottler {
    base_interval_ms: u64,
    increments: u32,
    capture_count: u32,
    last_capture_ms: Option<u64>,
}

impl VideoThrottler {
    /// Create a throttler with the given base interval and falloff increment
    /// size.
    #[must_use]
    pub fn new(base_interval_ms: u64, increments: u32) -> Self {
        Self {
            base_interval_ms,
            increments,
            capture_count: 0,
            last_capture_ms: None,
        }
    }

    /// Forget all capture history (new test run).
    pub fn reset(&mut self) {
        self.capture_count = 0;
        self.last_capture_ms = None;
    }

    /// Number of frames this throttler has approved.
    #[must_use]
    pub fn capture_count(&self) -> u32 {
        self.capture_count
    }

    /// Minimum spacing to the next capture at the current falloff tier.
    fn min_interval_ms(&self) -> u64 {
        if self.capture_count > self.increments * 2 {
            self.base_interval_ms * 50
        } else if self.capture_count > self.increments {
            self.base_interval_ms * 10
        } else {
            self.base_interval_ms
        }
    }

    /// Decide whether to capture a frame now, and record it if so.
    ///
    /// A frame is eligible when `forced` (navigation), or when the screen
    /// changed since the last check and first paint has already been
    /// detected. Eligible frames are still spaced by the falloff schedule;
    /// only the very first capture bypasses it.
    pub fn try_capture(
        &mut self,
        now_ms: u64,
        forced: bool,
        screen_updated: bool,
        render_started: bool,
    ) -> bool {
        if !(forced || (screen_updated && render_started)) {
            return false;
        }
        let due = match self.last_capture_ms {
            None => true,
            Some(last) => now_ms >= last + self.min_interval_ms(),
        };
        if due {
            self.last_capture_ms = Some(now_ms);
            self.capture_count += 1;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttler() -> VideoThrottler {
        VideoThrottler::new(100, 20)
    }

    #[test]
    fn test_first_capture_always_allowed() {
        let mut t = throttler();
        assert!(t.try_capture(0, true, false, false));
        assert_eq!(t.capture_count(), 1);
    }

    #[test]
    fn test_not_eligible_without_render_start() {
        let mut t = throttler();
        assert!(!t.try_capture(0, false, true, false));
        assert!(!t.try_capture(0, false, false, true));
        assert_eq!(t.capture_count(), 0);
    }

    #[test]
    fn test_base_interval_enforced() {
        let mut t = throttler();
        assert!(t.try_capture(0, false, true, true));
        assert!(!t.try_capture(50, false, true, true));
        assert!(t.try_capture(100, false, true, true));
    }

    #[test]
    fn test_forced_captures_are_still_throttled() {
        let mut t = throttler();
        assert!(t.try_capture(0, true, false, false));
        assert!(!t.try_capture(50, true, false, false));
        assert!(t.try_capture(100, true, false, false));
    }

    #[test]
    fn test_falloff_tiers() {
        let mut t = throttler();
        let mut now = 0u64;
        // First tier: 21 captures at base spacing (count 1..=21).
        for _ in 0..21 {
            assert!(t.try_capture(now, false, true, true));
            now += 100;
        }
        // Count is now 21 > 20: spacing widens to 10x base.
        assert!(!t.try_capture(now, false, true, true));
        now = 2000 + 1000;
        assert!(t.try_capture(now, false, true, true));
        // Push the count past 40 and verify 50x spacing.
        for _ in 0..19 {
            now += 1000;
            assert!(t.try_capture(now, false, true, true));
        }
        assert_eq!(t.capture_count(), 41);
        assert!(!t.try_capture(now + 1000, false, true, true));
        assert!(t.try_capture(now + 5000, false, true, true));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut t = throttler();
        assert!(t.try_capture(0, true, false, false));
        t.reset();
        assert_eq!(t.capture_count(), 0);
        assert!(t.try_capture(10, true, false, false));
    }
}
