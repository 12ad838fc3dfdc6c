//! Accumulated test results: the progress series and retained frames.
//!
//! Owned exclusively by the controller while a test runs; collaborators get
//! read-only snapshots. `reset()` belongs to the results side of the
//! contract and runs at test start, never at finalization — a finished
//! test's data stays readable until the next start.

use crate::capture::CapturedFrame;
use crate::result::MedirResult;
use crate::sample::ProgressSample;

/// Progress samples and captured frames for one test run.
#[derive(Debug, Default)]
pub struct TestResults {
    progress: Vec<ProgressSample>,
    frames: Vec<CapturedFrame>,
}

impl TestResults {
    /// Create an empty results store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all accumulated data (new test run).
    pub fn reset(&mut self) {
        self.progress.clear();
        self.frames.clear();
    }

    /// Append sampler output in chronological order.
    pub(crate) fn append_samples(&mut self, samples: Vec<ProgressSample>) {
        debug_assert!(samples
            .windows(2)
            .all(|pair| pair[0].ms <= pair[1].ms));
        self.progress.extend(samples);
    }

    /// Retain a captured frame.
    pub(crate) fn add_frame(&mut self, frame: CapturedFrame) {
        self.frames.push(frame);
    }

    /// The progress series, non-decreasing in `ms`.
    #[must_use]
    pub fn progress(&self) -> &[ProgressSample] {
        &self.progress
    }

    /// Frames retained during the run.
    #[must_use]
    pub fn frames(&self) -> &[CapturedFrame] {
        &self.frames
    }

    /// Timestamp of the most recent sample, if any.
    #[must_use]
    pub fn last_sample_ms(&self) -> Option<u64> {
        self.progress.last().map(|s| s.ms)
    }

    /// Serialize the progress series to JSON.
    pub fn progress_json(&self) -> MedirResult<String> {
        Ok(serde_json::to_string(&self.progress)?)
    }
}
