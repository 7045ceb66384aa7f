//! Demo world driven by the heartbeat.
//!
//! Stands in for the real gameplay systems: each one is a `TickSystem`, and
//! they are composed into a single pipeline handed to the scheduler.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use heartbeat_core::{TickPipeline, TickSystem};
use parking_lot::Mutex;

use crate::config::WorldConfig;

#[derive(Debug, Default)]
pub struct WorldState {
    pub tick: u64,
    pub sim_time: Duration,
}

pub type SharedWorld = Arc<Mutex<WorldState>>;

pub fn build_pipeline(cfg: &WorldConfig, tick_duration: Duration, world: SharedWorld) -> TickPipeline {
    let mut pipeline = TickPipeline::new();
    pipeline.add(Advance { world: world.clone(), tick_duration });

    if cfg.simulated_work_ms > 0 {
        pipeline.add(Workload { per_tick: Duration::from_millis(cfg.simulated_work_ms as u64) });
    }
    if cfg.report_every_ticks > 0 {
        pipeline.add(Report { world, every: cfg.report_every_ticks });
    }
    pipeline
}

struct Advance {
    world: SharedWorld,
    tick_duration: Duration,
}

impl TickSystem for Advance {
    fn id(&self) -> &'static str {
        "advance"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let mut w = self.world.lock();
        w.tick += 1;
        w.sim_time += self.tick_duration;
        Ok(())
    }
}

/// Burns CPU like a heavy gameplay frame would.
struct Workload {
    per_tick: Duration,
}

impl TickSystem for Workload {
    fn id(&self) -> &'static str {
        "workload"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let until = Instant::now() + self.per_tick;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
        Ok(())
    }
}

struct Report {
    world: SharedWorld,
    every: u64,
}

impl TickSystem for Report {
    fn id(&self) -> &'static str {
        "report"
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let w = self.world.lock();
        if w.tick % self.every == 0 {
            log::info!(target: "heartbeat::world", "tick {} sim_time={:?}", w.tick, w.sim_time);
        }
        Ok(())
    }
}
