use std::{fs, path::Path};

use anyhow::{Context, Result};
use heartbeat_core::SchedulerConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "heartbeat.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: ServerConfig = toml::from_str(text)?;
        cfg.scheduler.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Explicit path if given, else `heartbeat.toml` when it exists, else
    /// defaults.
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        match explicit {
            Some(p) => Self::load(p),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Log a world summary every N ticks; 0 disables it.
    #[serde(default = "default_report_every_ticks")]
    pub report_every_ticks: u64,
    /// Busy time burned per tick, to exercise slow-handler behaviour.
    #[serde(default)]
    pub simulated_work_ms: u32,
}

fn default_report_every_ticks() -> u64 { 100 }

impl Default for WorldConfig {
    fn default() -> Self {
        Self { report_every_ticks: default_report_every_ticks(), simulated_work_ms: 0 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Stop on its own after this long; 0 runs until Ctrl-C.
    #[serde(default)]
    pub run_for_ms: u64,
}
