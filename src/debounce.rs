use std::time::{Duration, Instant};

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Holds back a changing value until it has stopped changing for `delay`.
///
/// Time is passed in by the caller so the same logic drives the HTTP ticker,
/// the terminal loop and tests.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T: PartialEq> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            pending: None,
        }
    }

    /// Records a new input. Re-submitting the pending value does not restart the timer.
    pub fn push(&mut self, value: T, now: Instant) {
        if let Some((pending, _)) = &self.pending {
            if *pending == value {
                return;
            }
        }
        self.pending = Some((value, now));
    }

    /// Returns the value once it has been quiet for the full delay.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, since)) if now.saturating_duration_since(*since) >= self.delay => {
                self.pending.take().map(|(value, _)| value)
            }
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Skips the wait and hands over whatever is pending.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }
}
