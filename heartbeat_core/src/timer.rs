use std::time::Duration;

/// When the scheduler wants its next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// As soon as possible, after work already queued.
    Immediate,
    /// Coarse delayed wake-up; cheap on CPU, tends to fire late.
    After(Duration),
}

impl Wake {
    /// Picks the wake for a tick due in `remaining`.
    ///
    /// Far from the deadline a coarse sleep is requested, shortened by
    /// `margin`. Within `threshold` of it the step runs immediately.
    pub fn for_remaining(remaining: Duration, threshold: Duration, margin: Duration) -> Self {
        if remaining > threshold {
            Wake::After(remaining.saturating_sub(margin))
        } else {
            Wake::Immediate
        }
    }

    #[inline]
    pub fn delay(self) -> Duration {
        match self {
            Wake::Immediate => Duration::ZERO,
            Wake::After(d) => d,
        }
    }
}

/// Capability to run the scheduler's next step later.
///
/// A timer holds at most one pending wake; a new request replaces the old one.
pub trait Timer {
    fn schedule(&mut self, wake: Wake);
}

/// Timer for hosts that pump steps themselves (tests, replay, cooperative
/// loops).
#[derive(Debug, Default)]
pub struct ManualTimer {
    pending: Option<Wake>,
    requests: u64,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn pending(&self) -> Option<Wake> {
        self.pending
    }

    #[inline]
    pub fn take(&mut self) -> Option<Wake> {
        self.pending.take()
    }

    /// Total number of wakes requested so far.
    #[inline]
    pub fn requests(&self) -> u64 {
        self.requests
    }
}

impl Timer for ManualTimer {
    fn schedule(&mut self, wake: Wake) {
        self.pending = Some(wake);
        self.requests += 1;
    }
}
