//! Refresh window state machine
//!
//! `Idle` means no periodic polling. A trigger opens a window during which the
//! store polls at a fixed interval; a trigger inside an open window moves the
//! deadline instead of adding a second timer. The window closes once the
//! deadline has passed.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Polling { interval: Duration, deadline: Instant },
}

#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    interval: Duration,
    window: Duration,
    state: RefreshState,
}

impl RefreshScheduler {
    pub fn new(interval: Duration, window: Duration) -> Self {
        Self {
            interval,
            window,
            state: RefreshState::Idle,
        }
    }

    /// Opens (or restarts) the polling window at `now`.
    pub fn trigger(&mut self, now: Instant) {
        self.state = RefreshState::Polling {
            interval: self.interval,
            deadline: now + self.window,
        };
    }

    /// Current state at `now`, closing the window if its deadline has passed.
    pub fn state_at(&mut self, now: Instant) -> RefreshState {
        if let RefreshState::Polling { deadline, .. } = self.state {
            if now > deadline {
                self.state = RefreshState::Idle;
            }
        }
        self.state
    }

    /// Poll interval in effect at `now`, `None` when idle.
    pub fn poll_interval(&mut self, now: Instant) -> Option<Duration> {
        match self.state_at(now) {
            RefreshState::Idle => None,
            RefreshState::Polling { interval, .. } => Some(interval),
        }
    }

    /// Returns to `Idle` immediately.
    pub fn cancel(&mut self) {
        self.state = RefreshState::Idle;
    }
}
