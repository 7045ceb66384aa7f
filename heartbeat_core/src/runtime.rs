//! Dedicated heartbeat thread.
//!
//! The scheduler lives on its own thread and is never shared. Other threads
//! talk to it through a command channel, and the loop applies those commands
//! between steps, so scheduler state keeps a single writer.
//!
//! Between steps the thread parks on the channel with the timeout the
//! scheduler asked for, which doubles as the coarse timer: a command wakes it
//! early, otherwise the timeout expiring means the next step is due.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::{
    clock::Clock,
    config::SchedulerConfig,
    error::{TickError, TickResult},
    handler::TickHandler,
    scheduler::TickScheduler,
    telemetry::TickStats,
    timer::{Timer, Wake},
};

const LOG_TARGET: &str = "heartbeat::runtime";

#[derive(Debug)]
enum Command {
    /// Carries the reply channel for the outcome of `TickScheduler::start`.
    Start(Sender<TickResult<()>>),
    Stop,
    Shutdown,
}

/// Holds the wake the scheduler requested until the loop picks it up.
#[derive(Debug, Default)]
pub struct LoopTimer {
    pending: Option<Wake>,
}

impl Timer for LoopTimer {
    #[inline]
    fn schedule(&mut self, wake: Wake) {
        self.pending = Some(wake);
    }
}

/// What the loop thread last published.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopSnapshot {
    pub running: bool,
    pub tick_index: u64,
    pub stats: TickStats,
}

pub struct TickLoop {
    commands: Sender<Command>,
    snapshot: Arc<Mutex<LoopSnapshot>>,
    thread: Option<JoinHandle<()>>,
}

impl TickLoop {
    /// Builds the scheduler on the calling thread, so config errors surface
    /// here, then moves it onto a new `heartbeat` thread. The loop starts idle.
    pub fn spawn<H, C>(cfg: &SchedulerConfig, handler: H, clock: C) -> TickResult<Self>
    where
        H: TickHandler + Send + 'static,
        C: Clock + Send + 'static,
    {
        let scheduler = TickScheduler::with_config(cfg, handler, clock, LoopTimer::default())?;

        let (commands, rx) = crossbeam_channel::unbounded();
        let snapshot = Arc::new(Mutex::new(LoopSnapshot::default()));

        let thread = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn({
                let snapshot = snapshot.clone();
                move || run_loop(scheduler, rx, snapshot)
            })
            .map_err(TickError::Spawn)?;

        Ok(Self { commands, snapshot, thread: Some(thread) })
    }

    /// Starts ticking and waits for the loop thread to confirm. A clock fault
    /// while taking the first sample comes back here and the loop stays idle.
    pub fn start(&self) -> TickResult<()> {
        let (reply, outcome) = crossbeam_channel::bounded(1);
        if self.commands.send(Command::Start(reply)).is_err() {
            return Err(TickError::LoopGone);
        }
        outcome.recv().map_err(|_| TickError::LoopGone)?
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    #[inline]
    pub fn snapshot(&self) -> LoopSnapshot {
        *self.snapshot.lock()
    }

    #[inline]
    pub fn stats(&self) -> TickStats {
        self.snapshot.lock().stats
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.snapshot.lock().running
    }

    /// Stops ticking, ends the thread and waits for it. Returns the state the
    /// thread published last, after the final stop.
    pub fn shutdown(mut self) -> TickResult<LoopSnapshot> {
        self.shutdown_inner()?;
        Ok(self.snapshot())
    }

    fn shutdown_inner(&mut self) -> TickResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.send(Command::Shutdown);
        thread.join().map_err(|_| TickError::LoopPanicked)
    }

    fn send(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            log::warn!(target: LOG_TARGET, "tick loop is gone, dropped a command");
        }
    }
}

impl Drop for TickLoop {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            log::error!(target: LOG_TARGET, "tick loop shutdown: {e}");
        }
    }
}

fn run_loop<H, C>(
    mut scheduler: TickScheduler<H, C, LoopTimer>,
    commands: Receiver<Command>,
    snapshot: Arc<Mutex<LoopSnapshot>>,
) where
    H: TickHandler,
    C: Clock,
{
    log::debug!(target: LOG_TARGET, "loop thread up");

    let mut next_step: Option<Instant> = None;

    loop {
        if let Some(wake) = scheduler.timer_mut().pending.take() {
            next_step = Some(Instant::now() + wake.delay());
        }

        let command = match next_step {
            // Idle: nothing to do until told otherwise.
            None => match commands.recv() {
                Ok(c) => Some(c),
                Err(_) => break,
            },
            Some(at) => {
                let now = Instant::now();
                if at <= now {
                    match commands.try_recv() {
                        Ok(c) => Some(c),
                        Err(TryRecvError::Empty) => {
                            thread::yield_now();
                            None
                        }
                        Err(TryRecvError::Disconnected) => break,
                    }
                } else {
                    match commands.recv_timeout(at - now) {
                        Ok(c) => Some(c),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        };

        match command {
            Some(Command::Start(reply)) => {
                let outcome = scheduler.start();
                if let Err(e) = &outcome {
                    log::error!(target: LOG_TARGET, "start failed: {e}");
                }
                publish(&scheduler, &snapshot);
                let _ = reply.send(outcome);
            }
            Some(Command::Stop) => scheduler.stop(),
            Some(Command::Shutdown) => {
                scheduler.stop();
                publish(&scheduler, &snapshot);
                break;
            }
            None => {
                next_step = None;
                // Clock faults are logged by the scheduler, which has already
                // requested a retry.
                let _ = scheduler.step();
            }
        }

        publish(&scheduler, &snapshot);
    }

    log::debug!(target: LOG_TARGET, "loop thread exiting");
}

fn publish<H, C, T>(scheduler: &TickScheduler<H, C, T>, snapshot: &Mutex<LoopSnapshot>) {
    *snapshot.lock() = LoopSnapshot {
        running: scheduler.is_running(),
        tick_index: scheduler.tick_index(),
        stats: scheduler.stats(),
    };
}
