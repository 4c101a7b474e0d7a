//! Playback timer for automatic turn advancement.

use std::time::{Duration, Instant};

/// Default delay between automatic turn advances.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);
/// Fastest the timer may run.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);
/// Slowest the timer may run.
pub const MAX_INTERVAL: Duration = Duration::from_millis(1000);

const INTERVAL_STEP: Duration = Duration::from_millis(10);

/// Either stopped, or holding the deadline of the next automatic advance.
///
/// The timer only answers "is an advance due at this instant"; what an
/// advance means, and when playback must stop, is the viewer's call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    interval: Duration,
    deadline: Option<Instant>,
}

impl Playback {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
            deadline: None,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// True exactly when a scheduled advance has come due; rearms the
    /// timer relative to `now`.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// Time remaining until the next advance, when one is scheduled.
    #[must_use]
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Shortens the interval by one step, down to the floor.
    pub fn speed_up(&mut self) -> Duration {
        self.interval = self.interval.saturating_sub(INTERVAL_STEP).max(MIN_INTERVAL);
        self.interval
    }

    /// Lengthens the interval by one step, up to the ceiling.
    pub fn slow_down(&mut self) -> Duration {
        self.interval = (self.interval + INTERVAL_STEP).min(MAX_INTERVAL);
        self.interval
    }
}

impl Default for Playback {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}
