//! Property-based tests for the progress-series math.
//!
//! Verifies the sampler invariants:
//! - round_to_interval: result is a multiple of the interval, within half an
//!   interval of the input
//! - expand_gap: output ms strictly increasing, covers every interval
//!   boundary between the previous and current sample with no gap larger
//!   than the interval
//! - expand_gap: total attributed bandwidth matches the measured delta up to
//!   integer-division loss
//! - ProgressSample serde roundtrip

use medir::{expand_gap, round_to_interval, ProgressSample};
use proptest::prelude::*;

const INTERVAL: u64 = 100;

fn arb_sample(prev_ms: u64) -> impl Strategy<Value = ProgressSample> {
    (1u64..=50, 0.0f64..=100.0, 0u64..=1_000_000, 0u64..=10_000_000).prop_map(
        move |(steps, cpu, mem_kb, bps_in)| ProgressSample {
            ms: prev_ms + steps * INTERVAL,
            cpu,
            mem_kb,
            bps_in,
        },
    )
}

fn arb_gap() -> impl Strategy<Value = (u64, ProgressSample)> {
    (0u64..=100).prop_flat_map(|prev_steps| {
        let prev_ms = prev_steps * INTERVAL;
        (Just(prev_ms), arb_sample(prev_ms))
    })
}

proptest! {
    #[test]
    fn prop_rounding_lands_on_interval(ms in 0u64..=1_000_000) {
        let rounded = round_to_interval(ms, INTERVAL);
        prop_assert_eq!(rounded % INTERVAL, 0);
        prop_assert!(rounded.abs_diff(ms) <= INTERVAL / 2);
    }

    #[test]
    fn prop_series_is_strictly_increasing((prev_ms, sample) in arb_gap()) {
        let out = expand_gap(prev_ms, sample, INTERVAL);
        prop_assert!(!out.is_empty());
        for pair in out.windows(2) {
            prop_assert!(pair[0].ms < pair[1].ms);
        }
    }

    #[test]
    fn prop_series_covers_every_boundary((prev_ms, sample) in arb_gap()) {
        let out = expand_gap(prev_ms, sample, INTERVAL);
        prop_assert_eq!(out[0].ms, prev_ms + INTERVAL);
        prop_assert_eq!(out.last().unwrap().ms, sample.ms);
        let mut expected = prev_ms + INTERVAL;
        for s in &out {
            prop_assert_eq!(s.ms, expected);
            expected += INTERVAL;
        }
    }

    #[test]
    fn prop_bandwidth_is_conserved((prev_ms, sample) in arb_gap()) {
        let chunks = (sample.ms - prev_ms) / INTERVAL;
        let out = expand_gap(prev_ms, sample, INTERVAL);
        let total: u64 = out.iter().map(|s| s.bps_in).sum();
        // Integer division loses at most one unit per slice.
        prop_assert!(total <= sample.bps_in);
        prop_assert!(sample.bps_in - total < chunks.max(1));
    }

    #[test]
    fn prop_cpu_and_memory_repeat_across_slices((prev_ms, sample) in arb_gap()) {
        let out = expand_gap(prev_ms, sample, INTERVAL);
        for s in &out {
            prop_assert_eq!(s.cpu, sample.cpu);
            prop_assert_eq!(s.mem_kb, sample.mem_kb);
        }
    }

    #[test]
    fn prop_sample_serde_roundtrip(sample in arb_sample(0)) {
        let json = serde_json::to_string(&sample).unwrap();
        let back: ProgressSample = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, sample);
    }
}
