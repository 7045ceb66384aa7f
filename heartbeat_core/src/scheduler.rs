use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    time::Duration,
};

use crate::{
    clock::Clock,
    config::SchedulerConfig,
    error::{ClockError, TickError, TickResult},
    handler::TickHandler,
    telemetry::{TickStats, TickTelemetry},
    timer::{Timer, Wake},
};

const LOG_TARGET: &str = "heartbeat::scheduler";

/// What one running step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub ticks: u32,
    pub faults: u32,
    pub clamped: bool,
    pub wake: Wake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The scheduler was stopped; nothing consumed, nothing rescheduled.
    Idle,
    Ran(StepReport),
}

/// Fixed-timestep heartbeat.
///
/// Each step measures the real time elapsed since the previous one, banks it in
/// an accumulator and invokes the handler once per whole tick in the bank. The
/// handler therefore always advances the simulation by exactly one
/// `tick_duration`, however unevenly steps are delivered.
///
/// The clock and timer are injected so hosts and tests decide what "now" and
/// "later" mean.
pub struct TickScheduler<H, C, T> {
    rate_hz: f64,
    tick_duration: Duration,
    max_accumulator: Duration,
    coarse_threshold: Duration,
    sleep_margin: Duration,

    handler: H,
    clock: C,
    timer: T,

    running: bool,
    last_sample: Duration,
    accumulator: Duration,
    tick_index: u64,

    telemetry: TickTelemetry,
}

impl<H, C, T> TickScheduler<H, C, T>
where
    H: TickHandler,
    C: Clock,
    T: Timer,
{
    /// Scheduler at `rate_hz` with default tuning.
    pub fn new(rate_hz: f64, handler: H, clock: C, timer: T) -> TickResult<Self> {
        Self::with_config(&SchedulerConfig::with_rate(rate_hz), handler, clock, timer)
    }

    pub fn with_config(cfg: &SchedulerConfig, handler: H, clock: C, timer: T) -> TickResult<Self> {
        cfg.validate()?;
        let tick_duration = cfg.tick_duration()?;

        let mut telemetry = TickTelemetry::new();
        telemetry.configure_tps_logging(cfg.log_tps, cfg.tps_log_period());

        Ok(Self {
            rate_hz: cfg.rate_hz,
            tick_duration,
            max_accumulator: tick_duration.saturating_mul(cfg.max_catch_up_ticks),
            coarse_threshold: cfg.coarse_threshold(),
            sleep_margin: cfg.sleep_margin(),

            handler,
            clock,
            timer,

            running: false,
            last_sample: Duration::ZERO,
            accumulator: Duration::ZERO,
            tick_index: 0,

            telemetry,
        })
    }

    /// Begins ticking. The first step is requested immediately, not one period
    /// later. Starting a running scheduler does nothing.
    ///
    /// Time that passed while stopped is discarded.
    pub fn start(&mut self) -> TickResult<()> {
        if self.running {
            return Ok(());
        }

        let now = self.clock.now()?;
        self.last_sample = now;
        self.accumulator = Duration::ZERO;
        self.running = true;
        self.telemetry.restart_window(now);

        self.timer.schedule(Wake::Immediate);

        log::info!(
            target: LOG_TARGET,
            "started: rate={}Hz tick={:?} catch_up_cap={:?}",
            self.rate_hz,
            self.tick_duration,
            self.max_accumulator
        );
        Ok(())
    }

    /// Takes effect at the next step, which returns without ticking or
    /// rescheduling. Stopping an idle scheduler does nothing.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        log::info!(target: LOG_TARGET, "stopped after {} ticks", self.tick_index);
    }

    pub fn step(&mut self) -> TickResult<StepOutcome> {
        if !self.running {
            return Ok(StepOutcome::Idle);
        }

        let now = match self.sample() {
            Ok(now) => now,
            Err(e) => return Err(self.clock_fault(e)),
        };

        let delta = now - self.last_sample;
        self.last_sample = now;
        self.accumulator = self.accumulator.saturating_add(delta);

        // Spiral-of-death guard: past the cap the lost time is forfeited and
        // exactly one tick stays owed.
        let clamped = self.accumulator > self.max_accumulator;
        if clamped {
            let forfeited = self.accumulator - self.tick_duration;
            log::warn!(
                target: LOG_TARGET,
                "catch-up cap reached at tick {}: forfeiting {:?}",
                self.tick_index,
                forfeited
            );
            self.accumulator = self.tick_duration;
        }

        let mut ticks = 0u32;
        let mut faults = 0u32;
        while self.accumulator >= self.tick_duration {
            if !self.run_handler() {
                faults += 1;
            }
            self.accumulator -= self.tick_duration;
            self.tick_index += 1;
            ticks += 1;
        }

        let remaining = self.tick_duration - self.accumulator;
        let wake = Wake::for_remaining(remaining, self.coarse_threshold, self.sleep_margin);
        self.timer.schedule(wake);

        self.telemetry.record_step(now, ticks, faults, clamped);

        Ok(StepOutcome::Ran(StepReport { ticks, faults, clamped, wake }))
    }

    fn sample(&self) -> Result<Duration, ClockError> {
        let now = self.clock.now()?;
        if now < self.last_sample {
            return Err(ClockError::WentBackwards { last: self.last_sample, now });
        }
        Ok(now)
    }

    /// The step is abandoned: nothing consumed, no immediate continuation.
    /// A retry is requested one full tick later.
    fn clock_fault(&mut self, e: ClockError) -> TickError {
        if let ClockError::WentBackwards { now, .. } = &e {
            // Rebase on the new reading; the interval across the jump is lost.
            self.last_sample = *now;
        }

        self.telemetry.record_clock_fault();
        log::error!(
            target: LOG_TARGET,
            "clock fault at tick {}, retrying in {:?}: {e}",
            self.tick_index,
            self.tick_duration
        );

        self.timer.schedule(Wake::After(self.tick_duration));
        e.into()
    }

    /// Runs one tick, returns false if the handler faulted.
    fn run_handler(&mut self) -> bool {
        let tick = self.tick_index;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_tick()));

        let err = match result {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        log::error!(
            target: LOG_TARGET,
            "handler fault at tick {tick} (sim time {:?}): {err}",
            self.simulated_time_at(tick)
        );
        false
    }
}

impl<H, C, T> TickScheduler<H, C, T> {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    #[inline]
    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Ticks consumed since construction.
    #[inline]
    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    #[inline]
    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    /// Simulated time covered by all ticks so far.
    #[inline]
    pub fn simulated_time(&self) -> Duration {
        self.simulated_time_at(self.tick_index)
    }

    fn simulated_time_at(&self, tick: u64) -> Duration {
        let nanos = self.tick_duration.as_nanos().saturating_mul(tick as u128);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    #[inline]
    pub fn stats(&self) -> TickStats {
        self.telemetry.stats()
    }

    #[inline]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[inline]
    pub fn timer(&self) -> &T {
        &self.timer
    }

    #[inline]
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, timer::ManualTimer};

    #[derive(Default)]
    struct Counter {
        calls: u32,
    }

    impl TickHandler for Counter {
        fn on_tick(&mut self) -> anyhow::Result<()> {
            self.calls += 1;
            Ok(())
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn scheduler(rate_hz: f64) -> (TickScheduler<Counter, ManualClock, ManualTimer>, ManualClock) {
        let clock = ManualClock::new();
        let s = TickScheduler::new(rate_hz, Counter::default(), clock.clone(), ManualTimer::new())
            .unwrap();
        (s, clock)
    }

    fn ran(outcome: StepOutcome) -> StepReport {
        match outcome {
            StepOutcome::Ran(r) => r,
            StepOutcome::Idle => panic!("expected a running step"),
        }
    }

    #[test]
    fn construction_rejects_non_positive_rate() {
        for rate in [0.0, -1.0, f64::NAN] {
            let r = TickScheduler::new(rate, Counter::default(), ManualClock::new(), ManualTimer::new());
            assert!(matches!(r, Err(TickError::Config(_))));
        }
    }

    #[test]
    fn nothing_fires_before_start() {
        let (mut s, clock) = scheduler(20.0);
        clock.advance_ms(500);
        assert_eq!(s.step().unwrap(), StepOutcome::Idle);
        assert_eq!(s.handler().calls, 0);
        assert_eq!(s.timer().pending(), None);
    }

    #[test]
    fn start_requests_immediate_first_step() {
        let (mut s, _clock) = scheduler(20.0);
        s.start().unwrap();
        assert!(s.is_running());
        assert_eq!(s.rate_hz(), 20.0);
        assert_eq!(s.timer().pending(), Some(Wake::Immediate));
        assert_eq!(s.accumulator(), Duration::ZERO);
    }

    #[test]
    fn start_twice_is_a_no_op() {
        let (mut s, clock) = scheduler(20.0);
        s.start().unwrap();
        clock.advance_ms(30);
        s.start().unwrap();
        assert_eq!(s.timer().requests(), 1);

        clock.advance_ms(20);
        let r = ran(s.step().unwrap());
        assert_eq!(r.ticks, 1);
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let (mut s, _clock) = scheduler(20.0);
        s.stop();
        assert!(!s.is_running());
        assert_eq!(s.timer().requests(), 0);
    }

    #[test]
    fn step_after_stop_does_nothing() {
        let (mut s, clock) = scheduler(20.0);
        s.start().unwrap();
        s.timer_mut().take();
        s.stop();

        clock.advance_ms(200);
        assert_eq!(s.step().unwrap(), StepOutcome::Idle);
        assert_eq!(s.handler().calls, 0);
        assert_eq!(s.timer().pending(), None);
    }

    #[test]
    fn restart_discards_time_spent_stopped() {
        let (mut s, clock) = scheduler(20.0);
        s.start().unwrap();
        clock.advance_ms(70);
        s.step().unwrap();
        assert_eq!(s.accumulator(), ms(20));

        s.stop();
        clock.advance_ms(10_000);
        s.start().unwrap();
        assert_eq!(s.accumulator(), Duration::ZERO);

        let r = ran(s.step().unwrap());
        assert_eq!(r.ticks, 0);
        assert_eq!(s.handler().calls, 1);
    }

    #[test]
    fn coarse_wake_far_from_deadline() {
        let (mut s, clock) = scheduler(20.0);
        s.start().unwrap();
        clock.advance_ms(10);
        let r = ran(s.step().unwrap());
        // 40ms remaining, minus the 2ms margin
        assert_eq!(r.wake, Wake::After(ms(38)));
        assert_eq!(s.timer().pending(), Some(Wake::After(ms(38))));
    }

    #[test]
    fn immediate_wake_near_deadline() {
        let (mut s, clock) = scheduler(20.0);
        s.start().unwrap();
        clock.advance_ms(46);
        let r = ran(s.step().unwrap());
        assert_eq!(r.ticks, 0);
        assert_eq!(r.wake, Wake::Immediate);
    }

    #[test]
    fn handler_error_does_not_stop_the_loop() {
        let clock = ManualClock::new();
        let mut calls = 0u32;
        let handler = move || -> anyhow::Result<()> {
            calls += 1;
            if calls == 2 {
                anyhow::bail!("quest table missing");
            }
            Ok(())
        };
        let mut s = TickScheduler::new(20.0, handler, clock.clone(), ManualTimer::new()).unwrap();
        s.start().unwrap();

        clock.advance_ms(150);
        let r = ran(s.step().unwrap());
        assert_eq!(r.ticks, 3);
        assert_eq!(r.faults, 1);
        assert!(s.is_running());
        assert_eq!(s.stats().handler_faults, 1);
        assert_eq!(s.accumulator(), Duration::ZERO);
    }

    #[test]
    fn handler_panic_is_contained() {
        let clock = ManualClock::new();
        let mut calls = 0u32;
        let handler = move || -> anyhow::Result<()> {
            calls += 1;
            if calls == 1 {
                panic!("reward overflow");
            }
            Ok(())
        };
        let mut s = TickScheduler::new(20.0, handler, clock.clone(), ManualTimer::new()).unwrap();
        s.start().unwrap();

        clock.advance_ms(100);
        let r = ran(s.step().unwrap());
        assert_eq!(r.ticks, 2);
        assert_eq!(r.faults, 1);

        clock.advance_ms(50);
        let r = ran(s.step().unwrap());
        assert_eq!((r.ticks, r.faults), (1, 0));
    }

    #[test]
    fn clock_fault_skips_the_step_and_retries_later() {
        let (mut s, clock) = scheduler(20.0);
        s.start().unwrap();
        clock.advance_ms(120);
        clock.fail_next();

        let err = s.step().unwrap_err();
        assert!(matches!(err, TickError::Clock(ClockError::Unavailable(_))));
        assert_eq!(s.handler().calls, 0);
        assert_eq!(s.accumulator(), Duration::ZERO);
        assert_eq!(s.timer().pending(), Some(Wake::After(ms(50))));
        assert!(s.is_running());
        assert_eq!(s.stats().clock_faults, 1);

        // The next valid sample still sees the full interval.
        let r = ran(s.step().unwrap());
        assert_eq!(r.ticks, 2);
    }

    #[test]
    fn backwards_clock_is_a_fault_and_rebases() {
        let clock = ManualClock::starting_at(Duration::from_secs(10));
        let mut s = TickScheduler::new(20.0, Counter::default(), clock.clone(), ManualTimer::new())
            .unwrap();
        s.start().unwrap();

        clock.set(Duration::from_secs(5));
        let err = s.step().unwrap_err();
        assert!(matches!(err, TickError::Clock(ClockError::WentBackwards { .. })));

        clock.advance_ms(50);
        let r = ran(s.step().unwrap());
        assert_eq!(r.ticks, 1);
    }

    #[test]
    fn start_fails_cleanly_on_clock_fault() {
        let (mut s, clock) = scheduler(20.0);
        clock.fail_next();
        assert!(matches!(s.start(), Err(TickError::Clock(_))));
        assert!(!s.is_running());
        assert_eq!(s.timer().pending(), None);
    }

    #[test]
    fn simulated_time_tracks_tick_count() {
        let (mut s, clock) = scheduler(20.0);
        s.start().unwrap();
        clock.advance_ms(160);
        s.step().unwrap();
        assert_eq!(s.tick_index(), 3);
        assert_eq!(s.simulated_time(), ms(150));
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
