use std::{
    io::Write,
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use env_logger::{Builder, WriteStyle};
use log::LevelFilter;

static BOOT: OnceLock<Instant> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct ConsoleLoggerConfig {
    pub level: LevelFilter,
    pub colors: bool,
    pub include_target: bool,
}

impl ConsoleLoggerConfig {
    pub fn from_env() -> Self {
        let level = std::env::var("HEARTBEAT_LOG")
            .ok()
            .and_then(|v| v.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::Info);
        let colors = std::env::var("HEARTBEAT_LOG_COLORS")
            .ok()
            .map(|v| v != "0")
            .unwrap_or(true);
        let include_target = std::env::var("HEARTBEAT_LOG_TARGET")
            .ok()
            .map(|v| v != "0")
            .unwrap_or(true);

        Self { level, colors, include_target }
    }
}

impl Default for ConsoleLoggerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Installs the process-wide console logger.
///
/// Format: `[+mm:ss.mmm] [LEVEL] target message`, stamped with uptime since
/// the logger was installed.
pub fn init(config: &ConsoleLoggerConfig) -> Result<()> {
    BOOT.get_or_init(Instant::now);

    let mut builder = Builder::new();
    builder.filter_level(config.level);
    builder.write_style(if config.colors { WriteStyle::Auto } else { WriteStyle::Never });

    let include_target = config.include_target;
    builder.format(move |buf, record| {
        let stamp = fmt_uptime(BOOT.get().map(|b| b.elapsed()).unwrap_or_default());
        let style = buf.default_level_style(record.level());

        if include_target {
            writeln!(
                buf,
                "[{stamp}] {style}[{:<5}]{style:#} {:<22} {}",
                record.level(),
                record.target(),
                record.args()
            )
        } else {
            writeln!(buf, "[{stamp}] {style}[{:<5}]{style:#} {}", record.level(), record.args())
        }
    });

    builder.try_init().map_err(|e| anyhow!("logger init failed: {e}"))
}

/// mm:ss.mmm (or hh:mm:ss.mmm once past an hour)
fn fmt_uptime(d: Duration) -> String {
    let total_ms = d.as_millis() as u64;

    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;

    let s = total_s % 60;
    let total_m = total_s / 60;

    let m = total_m % 60;
    let h = total_m / 60;

    if h > 0 {
        format!("+{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
    } else {
        format!("+{:02}:{:02}.{:03}", m, s, ms)
    }
}
