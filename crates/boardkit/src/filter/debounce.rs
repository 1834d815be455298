//! Search input debouncing
//!
//! Keystrokes restart a quiet period; only the last term typed is installed.
//! The clock is passed in, so the controller can drive it from its event loop
//! and tests from a paused runtime.

use std::time::Duration;
use tokio::time::Instant;

/// Last-write-wins debouncer driven by an external clock.
///
/// Every `push` restarts the quiet period; the value becomes ready once the
/// period has elapsed without another push.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    /// When the pending value becomes ready, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_ready(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.pending.take().map(|(v, _)| v),
            _ => None,
        }
    }

    /// Drop the pending value without emitting it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(v, _)| v)
    }
}
