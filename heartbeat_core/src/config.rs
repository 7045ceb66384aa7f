use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{TickError, TickResult},
    telemetry::MIN_REPORT_PERIOD,
};

/// Tuning of a single tick scheduler.
///
/// Every field has a default, so an empty `[scheduler]` table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// How many owed ticks a single step may replay before the accumulator is
    /// reset to one pending tick.
    #[serde(default = "default_max_catch_up_ticks")]
    pub max_catch_up_ticks: u32,
    /// Remaining time above this uses a coarse sleep, at or below it the next
    /// step runs immediately.
    #[serde(default = "default_coarse_threshold_ms")]
    pub coarse_threshold_ms: u32,
    /// Subtracted from every coarse sleep, sleeps tend to wake late.
    #[serde(default = "default_sleep_margin_ms")]
    pub sleep_margin_ms: u32,
    #[serde(default = "default_log_tps")]
    pub log_tps: bool,
    #[serde(default = "default_tps_period_ms")]
    pub tps_log_period_ms: u32,
}

fn default_rate_hz() -> f64 { 20.0 }
fn default_max_catch_up_ticks() -> u32 { 10 }
fn default_coarse_threshold_ms() -> u32 { 4 }
fn default_sleep_margin_ms() -> u32 { 2 }
fn default_log_tps() -> bool { true }
fn default_tps_period_ms() -> u32 { 5000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            max_catch_up_ticks: default_max_catch_up_ticks(),
            coarse_threshold_ms: default_coarse_threshold_ms(),
            sleep_margin_ms: default_sleep_margin_ms(),
            log_tps: default_log_tps(),
            tps_log_period_ms: default_tps_period_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Default tuning with a different rate.
    pub fn with_rate(rate_hz: f64) -> Self {
        Self { rate_hz, ..Self::default() }
    }

    pub fn from_toml_str(text: &str) -> TickResult<Self> {
        let cfg: SchedulerConfig =
            toml::from_str(text).map_err(|e| TickError::Config(format!("invalid toml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> TickResult<()> {
        self.tick_duration().map(|_| ())?;
        if self.max_catch_up_ticks == 0 {
            return Err(TickError::Config("max_catch_up_ticks must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Simulated time of one tick, rounded to the nearest nanosecond.
    pub fn tick_duration(&self) -> TickResult<Duration> {
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 {
            return Err(TickError::Config(format!(
                "rate_hz must be a positive number, got {}",
                self.rate_hz
            )));
        }

        let nanos = (1_000_000_000.0 / self.rate_hz).round();
        if nanos < 1.0 {
            return Err(TickError::Config(format!(
                "rate_hz {} is too high, a tick would be shorter than 1ns",
                self.rate_hz
            )));
        }
        if nanos >= u64::MAX as f64 {
            return Err(TickError::Config(format!(
                "rate_hz {} is too low, a tick would not fit in u64 nanoseconds",
                self.rate_hz
            )));
        }
        Ok(Duration::from_nanos(nanos as u64))
    }

    #[inline]
    pub fn coarse_threshold(&self) -> Duration {
        Duration::from_millis(self.coarse_threshold_ms as u64)
    }

    #[inline]
    pub fn sleep_margin(&self) -> Duration {
        Duration::from_millis(self.sleep_margin_ms as u64)
    }

    #[inline]
    pub fn tps_log_period(&self) -> Duration {
        Duration::from_millis(self.tps_log_period_ms as u64).max(MIN_REPORT_PERIOD)
    }
}
