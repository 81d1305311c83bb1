//! Debounced address-bar writes.
//!
//! Every mutation reschedules the single pending write; only the last one in a
//! burst fires. Time is passed in so the timer can be driven from any event
//! loop (or a test).

use std::time::{Duration, Instant};

/// Default quiet period before the URL is rewritten
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct UrlDebouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Default for UrlDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl UrlDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Cancel any pending write and schedule a new one from `now`
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` exactly once when the pending write is due
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Fire immediately if anything is pending (e.g. on shutdown)
    pub fn flush(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}
