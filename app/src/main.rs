use std::time::{Duration, Instant};

use anyhow::Result;
use heartbeat_core::{MonotonicClock, TickLoop};

mod config;
mod logging;
mod signals;
mod world;

use config::ServerConfig;
use logging::ConsoleLoggerConfig;
use signals::ExitSignal;
use world::SharedWorld;

fn main() -> Result<()> {
    logging::init(&ConsoleLoggerConfig::from_env())?;

    let path = std::env::args().nth(1);
    let cfg = ServerConfig::resolve(path.as_deref())?;
    let tick_duration = cfg.scheduler.tick_duration()?;

    let world = SharedWorld::default();
    let pipeline = world::build_pipeline(&cfg.world, tick_duration, world.clone());
    log::info!("systems: {:?}", pipeline.ids());

    let exit = ExitSignal::new();
    if let Err(e) = exit.install_ctrlc_handler() {
        log::warn!("ctrl-c handler not installed: {e}");
    }

    let heartbeat = TickLoop::spawn(&cfg.scheduler, pipeline, MonotonicClock::new())?;
    heartbeat.start()?;

    let deadline = (cfg.runtime.run_for_ms > 0)
        .then(|| Instant::now() + Duration::from_millis(cfg.runtime.run_for_ms));
    if exit.wait(deadline) {
        log::info!("exit requested");
    } else {
        log::info!("run time elapsed");
    }

    let snap = heartbeat.shutdown()?;

    let w = world.lock();
    log::info!(
        "shutdown: ticks={} sim_time={:?} handler_faults={} clock_faults={} clamps={}",
        snap.tick_index,
        w.sim_time,
        snap.stats.handler_faults,
        snap.stats.clock_faults,
        snap.stats.clamps
    );
    Ok(())
}
