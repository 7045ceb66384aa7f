use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("monotonic clock unavailable: {0}")]
    Unavailable(String),

    #[error("clock went backwards: last sample {last:?}, now {now:?}")]
    WentBackwards { last: Duration, now: Duration },
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("invalid scheduler config: {0}")]
    Config(String),

    #[error("clock fault: {0}")]
    Clock(#[from] ClockError),

    #[error("failed to spawn tick loop thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("tick loop thread panicked")]
    LoopPanicked,

    #[error("tick loop thread is no longer running")]
    LoopGone,
}

pub type TickResult<T> = Result<T, TickError>;
