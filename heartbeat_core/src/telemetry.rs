use std::time::Duration;

use serde::Serialize;

/// Shortest window the tick rate is measured and reported over.
pub const MIN_REPORT_PERIOD: Duration = Duration::from_millis(250);

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TickStats {
    pub steps: u64,
    pub ticks: u64,
    pub handler_faults: u64,
    pub clock_faults: u64,
    pub clamps: u64,
    /// Ticks per second measured over the last completed report window.
    pub tps: f64,
}

pub struct TickTelemetry {
    stats: TickStats,

    window_start: Option<Duration>,
    window_ticks: u64,
    period: Duration,
    log_enabled: bool,
}

impl TickTelemetry {
    pub fn new() -> Self {
        Self {
            stats: TickStats::default(),
            window_start: None,
            window_ticks: 0,
            period: Duration::from_secs(5),
            log_enabled: true,
        }
    }

    pub fn configure_tps_logging(&mut self, enabled: bool, period: Duration) {
        self.log_enabled = enabled;
        self.period = period.max(MIN_REPORT_PERIOD);
    }

    #[inline]
    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// Starts a fresh measurement window; time spent stopped is not counted.
    pub fn restart_window(&mut self, now: Duration) {
        self.window_start = Some(now);
        self.window_ticks = 0;
    }

    pub fn record_step(&mut self, now: Duration, ticks: u32, faults: u32, clamped: bool) {
        self.stats.steps += 1;
        self.stats.ticks += ticks as u64;
        self.stats.handler_faults += faults as u64;
        if clamped {
            self.stats.clamps += 1;
        }

        let start = *self.window_start.get_or_insert(now);
        self.window_ticks += ticks as u64;

        let elapsed = now.saturating_sub(start);
        if elapsed < self.period {
            return;
        }

        let secs = elapsed.as_secs_f64().max(0.0001);
        self.stats.tps = self.window_ticks as f64 / secs;

        if self.log_enabled {
            log::info!(
                target: "heartbeat::telemetry",
                "tps={:.2} ticks={} steps={} faults={} clamps={}",
                self.stats.tps,
                self.stats.ticks,
                self.stats.steps,
                self.stats.handler_faults + self.stats.clock_faults,
                self.stats.clamps
            );
        }

        self.restart_window(now);
    }

    #[inline]
    pub fn record_clock_fault(&mut self) {
        self.stats.clock_faults += 1;
    }
}

impl Default for TickTelemetry {
    fn default() -> Self {
        Self::new()
    }
}
