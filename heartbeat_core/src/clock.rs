//! Monotonic time sources.
//!
//! A clock reports how far it has advanced since its own origin. The value is
//! only meaningful as a difference between two readings of the same clock,
//! never as calendar time.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::error::ClockError;

pub trait Clock {
    fn now(&self) -> Result<Duration, ClockError>;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> Result<Duration, ClockError> {
        (**self).now()
    }
}

/// Process clock backed by `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Result<Duration, ClockError> {
        Ok(self.origin.elapsed())
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same counter, so a test can keep one handle while the
/// scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
    fail_next: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::default();
        clock.set(start);
        clock
    }

    #[inline]
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::AcqRel);
    }

    #[inline]
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Jump to an absolute reading; may move backwards.
    #[inline]
    pub fn set(&self, at: Duration) {
        self.nanos.store(duration_to_nanos(at), Ordering::Release);
    }

    /// The next `now()` fails once, then the clock recovers.
    #[inline]
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::Release);
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Duration, ClockError> {
        if self.fail_next.swap(false, Ordering::AcqRel) {
            return Err(ClockError::Unavailable("injected fault".to_string()));
        }
        Ok(self.elapsed())
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
