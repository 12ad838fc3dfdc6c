//! Single-test lifecycle controller.
//!
//! [`PageTest`] owns one page-load test at a time: it decides when the test
//! has started, is loading, and has finished by heuristic, and orchestrates
//! the periodic sampler, the background first-paint detector, and the
//! event-triggered captures while the test is active.
//!
//! Completion is one of three causes: the total test timeout; one second of
//! grace after load-complete when ending strictly on load; or load-complete
//! grace plus two seconds of network silence otherwise. A test is reset only
//! by an explicit [`PageTest::start`].

use crate::capture::{
    BrowserWindows, CaptureProvider, CaptureReason, CaptureSurface, CapturedFrame, WindowHandle,
    WindowResolver,
};
use crate::clock::MonotonicClock;
use crate::render::frame_has_paint;
use crate::result::{MedirError, MedirResult};
use crate::results::TestResults;
use crate::sample::{expand_gap, round_to_interval, ProgressSample, BYTES_DELTA_TO_BPS};
use crate::stats::ProcessStatsSource;
use crate::timer::SampleTimer;
use crate::video::VideoThrottler;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace};

/// Configuration for one test attempt.
///
/// Policy choices (`end_on_load`, `capture_video`) and the tunable constants
/// are fixed at construction; there is no process-wide toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Total test timeout in ms; exceeding it finishes the test with
    /// `timed_out` set
    pub test_timeout_ms: u64,
    /// End one grace period after onload regardless of network activity
    pub end_on_load: bool,
    /// Whether video reference frames are captured at all
    pub capture_video: bool,
    /// Maximum network silence after onload before declaring done
    pub activity_timeout_ms: u64,
    /// Delay after load-complete before the test may be declared done
    pub on_load_grace_ms: u64,
    /// Sampler tick interval
    pub sample_interval_ms: u64,
    /// Captures per falloff tier of the video throttle schedule
    pub capture_increments: u32,
    /// Border excluded from first-paint scans, in pixels
    pub render_margin_px: u32,
}

impl TestConfig {
    /// Config with the given total timeout and default constants.
    #[must_use]
    pub fn new(test_timeout_ms: u64) -> Self {
        Self {
            test_timeout_ms,
            end_on_load: false,
            capture_video: true,
            activity_timeout_ms: 2000,
            on_load_grace_ms: 1000,
            sample_interval_ms: 100,
            capture_increments: 20,
            render_margin_px: 30,
        }
    }

    /// End the test one grace period after onload, ignoring activity.
    #[must_use]
    pub const fn with_end_on_load(mut self, end_on_load: bool) -> Self {
        self.end_on_load = end_on_load;
        self
    }

    /// Enable or disable video reference frames.
    #[must_use]
    pub const fn with_capture_video(mut self, capture_video: bool) -> Self {
        self.capture_video = capture_video;
        self
    }

    /// Override the sampler interval.
    #[must_use]
    pub const fn with_sample_interval(mut self, ms: u64) -> Self {
        self.sample_interval_ms = ms;
        self
    }

    /// Check the configuration for nonsensical values.
    pub fn validate(&self) -> MedirResult<()> {
        if self.test_timeout_ms == 0 {
            return Err(MedirError::InvalidConfig {
                message: "test_timeout_ms must be nonzero".to_string(),
            });
        }
        if self.sample_interval_ms == 0 {
            return Err(MedirError::InvalidConfig {
                message: "sample_interval_ms must be nonzero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new(120_000)
    }
}

/// Request and byte counters for the current run.
///
/// `doc_*` variants count only while a document is in flight. Reset belongs
/// to the results collaborator via [`PageTest::reset_counters`], never to
/// the lifecycle itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounters {
    /// Total requests observed
    pub requests: u64,
    /// Requests observed while a document was in flight
    pub doc_requests: u64,
    /// Total inbound bytes
    pub bytes_in: u64,
    /// Inbound bytes while a document was in flight
    pub doc_bytes_in: u64,
    /// Total outbound bytes
    pub bytes_out: u64,
    /// Outbound bytes while a document was in flight
    pub doc_bytes_out: u64,
}

/// Everything the three execution contexts share, behind the data mutex.
#[derive(Debug)]
struct TestData {
    active: bool,
    completed: bool,
    timed_out: bool,
    exiting: bool,
    screen_updated: bool,

    start: Option<u64>,
    on_load: Option<u64>,
    first_activity: Option<u64>,
    last_activity: Option<u64>,
    render_start: Option<u64>,
    first_byte: Option<u64>,

    current_document: u32,
    next_document: u32,
    counters: RequestCounters,

    windows: Option<BrowserWindows>,
    throttler: VideoThrottler,

    // sampler bookkeeping
    last_data_ms: Option<u64>,
    last_bytes_in: u64,
    last_process_time: u64,
    last_real_ticks: Option<u64>,
}

impl TestData {
    fn new(config: &TestConfig) -> Self {
        Self {
            active: false,
            completed: false,
            timed_out: false,
            exiting: false,
            screen_updated: false,
            start: None,
            on_load: None,
            first_activity: None,
            last_activity: None,
            render_start: None,
            first_byte: None,
            current_document: 0,
            next_document: 1,
            counters: RequestCounters::default(),
            windows: None,
            throttler: VideoThrottler::new(config.sample_interval_ms, config.capture_increments),
            last_data_ms: None,
            last_bytes_in: 0,
            last_process_time: 0,
            last_real_ticks: None,
        }
    }

    fn capture_target(&self) -> Option<WindowHandle> {
        self.windows.map(|w| w.capture_target())
    }
}

/// Auto-reset wakeup for the detector thread.
#[derive(Debug, Default)]
struct RenderSignal {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl RenderSignal {
    fn notify(&self) {
        *self.pending.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut pending = self.pending.lock().unwrap();
        while !*pending {
            pending = self.condvar.wait(pending).unwrap();
        }
        *pending = false;
    }

    fn clear(&self) {
        *self.pending.lock().unwrap() = false;
    }
}

/// State shared with the detector thread and the timer callback.
struct Shared {
    config: TestConfig,
    ticks_per_ms: u64,
    pid: u32,
    clock: Arc<dyn MonotonicClock>,
    surface: CaptureSurface,
    resolver: Arc<dyn WindowResolver>,
    stats: Arc<dyn ProcessStatsSource>,
    data: Mutex<TestData>,
    results: Mutex<TestResults>,
    render_signal: RenderSignal,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("config", &self.config)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Elapsed milliseconds from an optional tick stamp, zero when the stamp is
/// unset or in the future (clock anomaly guard).
fn elapsed_ms(stamp: Option<u64>, now: u64, ticks_per_ms: u64) -> u64 {
    match stamp {
        Some(t) if now >= t => (now - t) / ticks_per_ms,
        _ => 0,
    }
}

/// Single-test lifecycle controller.
///
/// Drives exactly one test at a time. Safe to share across the event thread,
/// the timer callback, and the detector thread; all shared state sits behind
/// one data mutex, all captures behind the exclusive capture lock.
#[derive(Debug)]
pub struct PageTest {
    shared: Arc<Shared>,
    detector: Mutex<Option<JoinHandle<()>>>,
    timer: Mutex<Option<SampleTimer>>,
}

impl PageTest {
    /// Create a controller for the current process.
    #[must_use]
    pub fn new(
        config: TestConfig,
        clock: Arc<dyn MonotonicClock>,
        provider: Arc<dyn CaptureProvider>,
        resolver: Arc<dyn WindowResolver>,
        stats: Arc<dyn ProcessStatsSource>,
    ) -> Self {
        let ticks_per_ms = clock.ticks_per_ms().max(1);
        let data = TestData::new(&config);
        Self {
            shared: Arc::new(Shared {
                config,
                ticks_per_ms,
                pid: std::process::id(),
                clock,
                surface: CaptureSurface::new(provider),
                resolver,
                stats,
                data: Mutex::new(data),
                results: Mutex::new(TestResults::new()),
                render_signal: RenderSignal::default(),
            }),
            detector: Mutex::new(None),
            timer: Mutex::new(None),
        }
    }

    /// Begin a test run.
    ///
    /// Resets all timestamps and the results store, allocates a new document
    /// id, resolves the browser windows best-effort (a missing window is
    /// retried on the next navigation), spawns the first-paint detector and
    /// the periodic sampler, and takes one synchronous sample. Any previous
    /// run is finalized first.
    pub fn start(&self) {
        if self.shared.data.lock().unwrap().active {
            self.done();
        }
        debug!("test start");
        let shared = &self.shared;
        {
            let mut d = shared.data.lock().unwrap();
            let now = shared.clock.now_ticks();
            d.start = Some(now);
            d.on_load = None;
            d.first_activity = None;
            d.last_activity = None;
            d.render_start = None;
            d.first_byte = None;
            d.timed_out = false;
            d.completed = false;
            d.active = true;
            d.exiting = false;
            d.screen_updated = false;
            d.current_document = d.next_document;
            d.next_document += 1;
            // The document window may not exist yet; OnNavigate retries.
            d.windows = shared.resolver.find_browser_window(shared.pid);
            d.throttler.reset();
            d.last_data_ms = None;
            d.last_bytes_in = 0;
            d.last_process_time = 0;
            d.last_real_ticks = None;
        }
        shared.results.lock().unwrap().reset();

        shared.render_signal.clear();
        {
            let worker = Arc::clone(&self.shared);
            *self.detector.lock().unwrap() =
                Some(std::thread::spawn(move || render_check_loop(&worker)));
        }
        {
            let sampler = Arc::clone(&self.shared);
            *self.timer.lock().unwrap() = Some(SampleTimer::start(
                Duration::from_millis(shared.config.sample_interval_ms),
                move || collect_data(&sampler),
            ));
        }
        collect_data(shared);
        // Give the detector an initial look at the page.
        shared.render_signal.notify();
    }

    /// Record network activity (called on every inbound byte event).
    pub fn activity_detected(&self) {
        let mut d = self.shared.data.lock().unwrap();
        if d.active {
            let now = self.shared.clock.now_ticks();
            d.last_activity = Some(now);
            if d.first_activity.is_none() {
                d.first_activity = Some(now);
            }
        }
    }

    /// A navigation has started (or the browser window appeared late).
    ///
    /// Re-resolves the windows, invalidates a prior load-complete signal,
    /// forces a video reference frame, and opens a new document if none is
    /// in flight.
    pub fn on_navigate(&self) {
        let video = {
            let mut d = self.shared.data.lock().unwrap();
            if !d.active {
                return;
            }
            debug!("navigate");
            d.windows = self.shared.resolver.find_browser_window(self.shared.pid);
            d.on_load = None;
            if d.current_document == 0 {
                d.current_document = d.next_document;
                d.next_document += 1;
            }
            self.decide_video_frame(&mut d, true)
        };
        self.capture_to_results(video, CaptureReason::Video);
    }

    /// The document finished loading.
    pub fn on_load(&self) {
        let target = {
            let mut d = self.shared.data.lock().unwrap();
            if !d.active {
                return;
            }
            debug!("document complete");
            d.on_load = Some(self.shared.clock.now_ticks());
            d.current_document = 0;
            d.capture_target()
        };
        self.capture_to_results(target, CaptureReason::DocumentComplete);
    }

    /// The screen contents changed since the last check.
    ///
    /// Sets the screen-changed flag and, while first paint is still
    /// undetected, wakes the detector for another look.
    pub fn screen_changed(&self) {
        let mut d = self.shared.data.lock().unwrap();
        if d.active {
            d.screen_updated = true;
        }
        drop(d);
        self.check_start_render();
    }

    /// Wake the detector if first paint is still worth checking for.
    fn check_start_render(&self) {
        let d = self.shared.data.lock().unwrap();
        let check = d.active && d.render_start.is_none() && d.screen_updated && d.windows.is_some();
        drop(d);
        if check {
            self.shared.render_signal.notify();
        }
    }

    /// Record an observed request.
    pub fn record_request(&self) {
        let mut d = self.shared.data.lock().unwrap();
        if d.active {
            d.counters.requests += 1;
            if d.current_document != 0 {
                d.counters.doc_requests += 1;
            }
        }
    }

    /// Record inbound bytes. The first call of a run stamps first-byte time.
    pub fn record_bytes_in(&self, count: u64) {
        let mut d = self.shared.data.lock().unwrap();
        if d.active {
            d.counters.bytes_in += count;
            if d.current_document != 0 {
                d.counters.doc_bytes_in += count;
            }
            if d.first_byte.is_none() {
                d.first_byte = Some(self.shared.clock.now_ticks());
            }
        }
    }

    /// Record outbound bytes.
    pub fn record_bytes_out(&self, count: u64) {
        let mut d = self.shared.data.lock().unwrap();
        if d.active {
            d.counters.bytes_out += count;
            if d.current_document != 0 {
                d.counters.doc_bytes_out += count;
            }
        }
    }

    /// Reset the request/byte counters. Owned by the results collaborator;
    /// `start()` deliberately leaves the counters alone.
    pub fn reset_counters(&self) {
        let mut d = self.shared.data.lock().unwrap();
        d.counters = RequestCounters::default();
        d.last_bytes_in = 0;
    }

    /// Check whether the test has finished, finalizing it when it has.
    ///
    /// Returns true once any completion cause holds and keeps returning true
    /// on later calls without repeating the finalization.
    pub fn is_done(&self) -> bool {
        let verdict = {
            let mut d = self.shared.data.lock().unwrap();
            if !d.active {
                return d.completed;
            }
            let now = self.shared.clock.now_ticks();
            let tpm = self.shared.ticks_per_ms;
            let elapsed_test = elapsed_ms(d.start, now, tpm);
            let elapsed_doc = elapsed_ms(d.on_load, now, tpm);
            let elapsed_activity = elapsed_ms(d.last_activity, now, tpm);
            let config = &self.shared.config;

            let done = if elapsed_test > config.test_timeout_ms {
                d.timed_out = true;
                true
            } else if d.current_document == 0
                && config.end_on_load
                && elapsed_doc > 0
                && elapsed_doc > config.on_load_grace_ms
            {
                // One grace period after onload, regardless of activity.
                true
            } else {
                // Normal mode: grace after onload plus network silence.
                d.current_document == 0
                    && !config.end_on_load
                    && elapsed_doc > 0
                    && elapsed_doc > config.on_load_grace_ms
                    && elapsed_activity > 0
                    && elapsed_activity > config.activity_timeout_ms
            };
            if done {
                d.completed = true;
            }
            done
        };
        if verdict {
            self.done();
        }
        verdict
    }

    /// Finalize the test. Idempotent; no-op when not active.
    ///
    /// Captures the final fully-loaded frame, synchronously deregisters the
    /// sampler timer (no tick observable after return), then signals and
    /// joins the detector thread.
    pub fn done(&self) {
        let target = {
            let mut d = self.shared.data.lock().unwrap();
            if !d.active {
                return;
            }
            d.active = false;
            d.completed = true;
            d.exiting = true;
            d.capture_target()
        };
        debug!("test done");
        if let Some(window) = target {
            let now = self.shared.clock.now_ticks();
            if let Some(frame) =
                self.shared
                    .surface
                    .capture(window, CaptureReason::FullyLoaded, now)
            {
                self.shared.results.lock().unwrap().add_frame(frame);
            }
        }
        if let Some(timer) = self.timer.lock().unwrap().take() {
            timer.cancel();
        }
        self.shared.render_signal.notify();
        if let Some(handle) = self.detector.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Run one sampler tick synchronously.
    pub fn collect_now(&self) {
        collect_data(&self.shared);
    }

    /// Whether a test is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.data.lock().unwrap().active
    }

    /// Whether the run ended by exceeding the total timeout.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.shared.data.lock().unwrap().timed_out
    }

    /// First-paint time in ms since test start, once detected.
    #[must_use]
    pub fn render_start_ms(&self) -> Option<u64> {
        self.stamp_ms(|d| d.render_start)
    }

    /// Load-complete time in ms since test start, if onload has fired.
    #[must_use]
    pub fn on_load_ms(&self) -> Option<u64> {
        self.stamp_ms(|d| d.on_load)
    }

    /// First inbound byte time in ms since test start.
    #[must_use]
    pub fn first_byte_ms(&self) -> Option<u64> {
        self.stamp_ms(|d| d.first_byte)
    }

    /// First network activity time in ms since test start.
    #[must_use]
    pub fn first_activity_ms(&self) -> Option<u64> {
        self.stamp_ms(|d| d.first_activity)
    }

    fn stamp_ms(&self, pick: impl FnOnce(&TestData) -> Option<u64>) -> Option<u64> {
        let d = self.shared.data.lock().unwrap();
        match (d.start, pick(&d)) {
            (Some(start), Some(stamp)) if stamp >= start => {
                Some((stamp - start) / self.shared.ticks_per_ms)
            }
            _ => None,
        }
    }

    /// Id of the document currently in flight, 0 when none is loading.
    #[must_use]
    pub fn current_document(&self) -> u32 {
        self.shared.data.lock().unwrap().current_document
    }

    /// Snapshot of the request/byte counters.
    #[must_use]
    pub fn counters(&self) -> RequestCounters {
        self.shared.data.lock().unwrap().counters
    }

    /// Number of video reference frames captured so far.
    #[must_use]
    pub fn video_capture_count(&self) -> u32 {
        self.shared.data.lock().unwrap().throttler.capture_count()
    }

    /// Snapshot of the progress series.
    #[must_use]
    pub fn progress(&self) -> Vec<ProgressSample> {
        self.shared.results.lock().unwrap().progress().to_vec()
    }

    /// Snapshot of the retained frames.
    #[must_use]
    pub fn frames(&self) -> Vec<CapturedFrame> {
        self.shared.results.lock().unwrap().frames().to_vec()
    }

    /// Read access to the full results store.
    pub fn with_results<R>(&self, f: impl FnOnce(&TestResults) -> R) -> R {
        f(&self.shared.results.lock().unwrap())
    }

    /// Run the throttler for a video frame; returns the window to capture if
    /// one is due. Clears the screen-changed flag on an approved capture.
    fn decide_video_frame(&self, d: &mut TestData, forced: bool) -> Option<WindowHandle> {
        let target = d.capture_target()?;
        if !self.shared.config.capture_video {
            return None;
        }
        let now_ms = self.shared.clock.now_ticks() / self.shared.ticks_per_ms;
        if d.throttler
            .try_capture(now_ms, forced, d.screen_updated, d.render_start.is_some())
        {
            d.screen_updated = false;
            Some(target)
        } else {
            None
        }
    }

    /// Capture a frame outside the data lock and retain it.
    fn capture_to_results(&self, target: Option<WindowHandle>, reason: CaptureReason) {
        let Some(window) = target else { return };
        let now = self.shared.clock.now_ticks();
        if let Some(frame) = self.shared.surface.capture(window, reason, now) {
            self.shared.results.lock().unwrap().add_frame(frame);
        }
    }
}

impl Drop for PageTest {
    fn drop(&mut self) {
        self.done();
    }
}

/// Detector thread body: wait for a screen-change signal, capture a
/// candidate frame under the capture lock, and scan it for first paint.
/// Exits once paint is found or shutdown is requested; never busy-polls.
fn render_check_loop(shared: &Arc<Shared>) {
    loop {
        shared.render_signal.wait();
        let (stop, target) = {
            let d = shared.data.lock().unwrap();
            (d.exiting || d.render_start.is_some(), d.capture_target())
        };
        if stop {
            break;
        }
        let Some(window) = target else { continue };

        let surface = shared.surface.exclusive();
        shared.data.lock().unwrap().screen_updated = false;
        let now = shared.clock.now_ticks();
        let frame = surface.capture(window, CaptureReason::StartRender, now);
        let found = frame
            .as_ref()
            .is_some_and(|f| frame_has_paint(&f.image, shared.config.render_margin_px));
        drop(surface);

        if found {
            trace!("first paint detected");
            {
                let mut d = shared.data.lock().unwrap();
                if d.render_start.is_none() {
                    d.render_start = Some(now);
                }
            }
            if let Some(frame) = frame {
                shared.results.lock().unwrap().add_frame(frame);
            }
            break;
        }
        // Not painted yet: drop the frame and wait for the next signal.
    }
}

/// Sampler tick: video frame via the throttler, then CPU/memory/bandwidth,
/// with interpolation across any missed intervals. Serialized against
/// `start()`/`done()` by the data mutex.
fn collect_data(shared: &Arc<Shared>) {
    let interval = shared.config.sample_interval_ms;
    let (rows, video) = {
        let mut d = shared.data.lock().unwrap();
        if !d.active {
            return;
        }
        let now = shared.clock.now_ticks();
        let tpm = shared.ticks_per_ms;
        let ms = round_to_interval(elapsed_ms(d.start, now, tpm), interval);
        // Dedup: skip a tick that lands in the already-recorded interval.
        // The very first sample always goes through.
        if d.last_data_ms == Some(ms) {
            return;
        }
        let prev_ms = d.last_data_ms.unwrap_or(0);
        d.last_data_ms = Some(ms);

        let video = if shared.config.capture_video {
            let target = d.capture_target();
            let screen_updated = d.screen_updated;
            let render_started = d.render_start.is_some();
            target.filter(|_| {
                let due = d
                    .throttler
                    .try_capture(now / tpm, false, screen_updated, render_started);
                if due {
                    d.screen_updated = false;
                }
                due
            })
        } else {
            None
        };

        let wall_elapsed = elapsed_ms(d.last_real_ticks, now, tpm);
        d.last_real_ticks = Some(now);

        let mut sample = ProgressSample {
            ms,
            ..ProgressSample::default()
        };
        if d.last_bytes_in != 0 {
            sample.bps_in = d.counters.bytes_in.saturating_sub(d.last_bytes_in) * BYTES_DELTA_TO_BPS;
        }
        d.last_bytes_in = d.counters.bytes_in;

        let snapshot = shared.stats.snapshot();
        if let Some(cpu_time) = snapshot.cpu_time_ms {
            if d.last_process_time != 0 && cpu_time >= d.last_process_time && wall_elapsed > 0 {
                let delta = (cpu_time - d.last_process_time) as f64;
                sample.cpu = (delta / wall_elapsed as f64).min(1.0) * 100.0;
            }
            d.last_process_time = cpu_time;
        }
        if let Some(mem_kb) = snapshot.memory_kb {
            sample.mem_kb = mem_kb;
        }
        trace!(
            ms = sample.ms,
            cpu = sample.cpu,
            mem_kb = sample.mem_kb,
            bps_in = sample.bps_in,
            "sample"
        );
        (expand_gap(prev_ms, sample, interval), video)
    };
    shared.results.lock().unwrap().append_samples(rows);
    if let Some(window) = video {
        let now = shared.clock.now_ticks();
        if let Some(frame) = shared.surface.capture(window, CaptureReason::Video, now) {
            shared.results.lock().unwrap().add_frame(frame);
        }
    }
}
