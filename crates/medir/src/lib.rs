//! Medir: Single-Test Page-Load Lifecycle Instrumentation
//!
//! Medir (Spanish: "to measure") is the lifecycle core of a page-load
//! instrumentation agent: it decides when a browser page-load test has
//! started, is actively loading, and has finished by heuristic, while
//! orchestrating periodic measurement (CPU, memory, bandwidth, video
//! reference frames) and event-triggered captures during that window.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     MEDIR Architecture                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  browser/network events        timer thread    detector      │
//! │  (start/navigate/load/bytes)   (100ms tick)    thread        │
//! │          │                          │             │          │
//! │          ▼                          ▼             ▼          │
//! │   ┌────────────┐  data mutex  ┌──────────┐  ┌───────────┐   │
//! │   │  PageTest  │◄────────────►│ sampler  │  │ first-    │   │
//! │   │ lifecycle  │              │ tick     │  │ paint scan│   │
//! │   └────────────┘              └──────────┘  └───────────┘   │
//! │          │        capture lock      │             │          │
//! │          └──────────────┬───────────┴─────────────┘          │
//! │                         ▼                                    │
//! │                 progress series + frames                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! External collaborators (window resolution, bitmap capture, process
//! stats, the clock) sit behind traits; everything this core does with
//! their failures is absorb them — a missing window retries on the next
//! navigation, a failed capture is a missed frame, a failed stat read is a
//! zero field. The worst outcome is degraded sample data, never an error
//! out of the lifecycle surface.

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod capture;
pub mod clock;
pub mod lifecycle;
pub mod render;
pub mod result;
pub mod results;
pub mod sample;
pub mod stats;
pub mod timer;
pub mod video;

pub use capture::{
    BrowserWindows, CaptureProvider, CaptureReason, CaptureSurface, CapturedFrame, SurfaceGuard,
    WindowHandle, WindowResolver,
};
pub use clock::{FakeClock, MonotonicClock, SystemClock};
pub use lifecycle::{PageTest, RequestCounters, TestConfig};
pub use render::{frame_has_paint, PixelProbe, PixelwiseProbe, RowProbe};
pub use result::{MedirError, MedirResult};
pub use results::TestResults;
pub use sample::{expand_gap, round_to_interval, ProgressSample};
pub use stats::{ProcessSnapshot, ProcessStatsSource, SystemStatsSource};
pub use timer::SampleTimer;
pub use video::VideoThrottler;
