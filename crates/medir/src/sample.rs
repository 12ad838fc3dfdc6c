//! Progress samples and the missed-tick interpolation math.
//!
//! A sample is one row of the progress series: elapsed ms, CPU percent,
//! resident memory, inbound bandwidth. When the timer falls behind and one or
//! more 100ms boundaries are skipped, [`expand_gap`] synthesizes a sample at
//! each missed boundary so the series stays gap-free.

use serde::{Deserialize, Serialize};

/// Bytes-delta to bits/sec conversion: x8 for bytes->bits, x100 for the
/// sample interval. Applied to every slice, interpolated or not.
pub(crate) const BYTES_DELTA_TO_BPS: u64 = 800;

/// One row of the progress series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Elapsed ms since test start, rounded to the sample interval
    pub ms: u64,
    /// CPU utilization percent, clamped to [0, 100]
    pub cpu: f64,
    /// Resident memory in KB
    pub mem_kb: u64,
    /// Inbound bandwidth in bits/sec
    pub bps_in: u64,
}

/// Round an elapsed time to the nearest multiple of the sample interval.
#[must_use]
pub fn round_to_interval(ms: u64, interval_ms: u64) -> u64 {
    ((ms + interval_ms / 2) / interval_ms) * interval_ms
}

/// Expand one measured sample into the series rows it stands for.
///
/// If more than one interval elapsed since `prev_ms`, a synthetic sample is
/// emitted at each missed boundary: CPU and memory repeat the measured values
/// (CPU time was already spread over the whole gap), bandwidth is split evenly
/// across the slices so the total attributed over the gap matches the measured
/// delta. The measured sample, bandwidth-adjusted, comes last.
#[must_use]
pub fn expand_gap(prev_ms: u64, sample: ProgressSample, interval_ms: u64) -> Vec<ProgressSample> {
    let elapsed = sample.ms.saturating_sub(prev_ms);
    if elapsed <= interval_ms {
        return vec![sample];
    }
    let chunks = elapsed / interval_ms;
    let mut out = Vec::with_capacity(chunks as usize);
    for i in 1..chunks {
        out.push(ProgressSample {
            ms: prev_ms + i * interval_ms,
            cpu: sample.cpu,
            mem_kb: sample.mem_kb,
            bps_in: sample.bps_in / chunks,
        });
    }
    out.push(ProgressSample {
        bps_in: sample.bps_in / chunks,
        ..sample
    });
    out
}
