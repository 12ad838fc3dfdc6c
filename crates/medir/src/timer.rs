//! Cancellable repeating timer for the stats sampler.
//!
//! `cancel()` is a synchronous deregistration: it joins the timer thread, so
//! once it returns no further callback invocation can be observed. That is
//! the property the lifecycle teardown relies on to avoid touching shared
//! state after finalization.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
struct TimerState {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

/// Repeating timer driving a callback on a dedicated thread.
pub struct SampleTimer {
    state: Arc<TimerState>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SampleTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleTimer")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl SampleTimer {
    /// Spawn the timer thread, invoking `callback` every `interval` until
    /// cancelled. The callback runs on the timer thread.
    #[must_use]
    pub fn start<F>(interval: Duration, callback: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let state = Arc::new(TimerState::default());
        let thread_state = Arc::clone(&state);
        let handle = std::thread::spawn(move || {
            let mut cancelled = thread_state.cancelled.lock().unwrap();
            loop {
                let (guard, timeout) = thread_state
                    .condvar
                    .wait_timeout(cancelled, interval)
                    .unwrap();
                cancelled = guard;
                if *cancelled {
                    break;
                }
                if timeout.timed_out() {
                    drop(cancelled);
                    callback();
                    cancelled = thread_state.cancelled.lock().unwrap();
                }
            }
            trace!("sample timer thread exiting");
        });
        Self {
            state,
            handle: Some(handle),
        }
    }

    /// Stop the timer and wait for the timer thread to exit. Any callback in
    /// flight completes before this returns; none fires afterwards.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        *self.state.cancelled.lock().unwrap() = true;
        self.state.condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SampleTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
