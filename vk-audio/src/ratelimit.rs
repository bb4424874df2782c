//! Fixed-delay request spacing.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Keeps at least `delay` between the end of one call and the start of the
/// next.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }

    /// Sleep if the previous call finished less than `delay` ago, then run `f`.
    pub(crate) fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(wait) = (*last).and_then(|t| self.delay.checked_sub(t.elapsed())) {
            if !wait.is_zero() {
                tracing::trace!(?wait, "throttling");
                thread::sleep(wait);
            }
        }
        let out = f();
        *last = Some(Instant::now());
        out
    }
}
