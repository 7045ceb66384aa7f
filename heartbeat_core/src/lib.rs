//! Heartbeat core
//!
//! Fixed-timestep tick scheduler for server-authoritative simulations.
//! Everything a server process needs to drive its world is exported here.

pub mod clock;
pub mod config;
pub mod error;
pub mod handler;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;
pub mod timer;

// ===============================
// PUBLIC FACADE
// ===============================

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::SchedulerConfig;
pub use error::{ClockError, TickError, TickResult};
pub use handler::TickHandler;
pub use pipeline::{TickPipeline, TickSystem};
pub use runtime::{LoopSnapshot, TickLoop};
pub use scheduler::{StepOutcome, StepReport, TickScheduler};
pub use telemetry::TickStats;
pub use timer::{ManualTimer, Timer, Wake};

// Not re-exported:
// - TickTelemetry (owned by the scheduler, read through TickStats)
// - LoopTimer (only meaningful inside TickLoop)
