use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{dlog_debug, Error, Result};

/// Engine tunables, loaded from ~/.dagrun/dagrun.toml when present.
///
/// Every field has a default so a missing or partial config file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upper bound on concurrently dispatched subtasks within one level.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    /// Per-subtask timeout; an attempt exceeding this becomes a timed-out result.
    #[serde(default = "default_subtask_timeout_ms")]
    pub subtask_timeout_ms: u64,

    /// Retry attempts after the first failure of a subtask.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between a failed attempt and its retry.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// When false, levels are dispatched one subtask at a time.
    #[serde(default = "default_enable_parallel_execution")]
    pub enable_parallel_execution: bool,

    /// Polling cadence for callers observing a running tracker.
    #[serde(default = "default_progress_update_interval_ms")]
    pub progress_update_interval_ms: u64,

    /// Terminal trackers older than this are evicted by cleanup.
    #[serde(default = "default_max_tracking_duration_mins")]
    pub max_tracking_duration_mins: u64,
}

fn default_max_parallel_tasks() -> usize {
    3
}

fn default_subtask_timeout_ms() -> u64 {
    120_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_enable_parallel_execution() -> bool {
    true
}

fn default_progress_update_interval_ms() -> u64 {
    1_000
}

fn default_max_tracking_duration_mins() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
            subtask_timeout_ms: default_subtask_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            enable_parallel_execution: default_enable_parallel_execution(),
            progress_update_interval_ms: default_progress_update_interval_ms(),
            max_tracking_duration_mins: default_max_tracking_duration_mins(),
        }
    }
}

impl Config {
    pub fn dagrun_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".dagrun"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::dagrun_dir()?.join("dagrun.toml"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        dlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            dlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        dlog_debug!(
            "Config loaded: max_parallel_tasks={}, subtask_timeout_ms={}, max_retries={}",
            config.max_parallel_tasks,
            config.subtask_timeout_ms,
            config.max_retries
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dagrun_dir = Self::dagrun_dir()?;
        dlog_debug!("Config::save dagrun_dir={}", dagrun_dir.display());
        if !dagrun_dir.exists() {
            dlog_debug!("Creating dagrun directory");
            fs::create_dir_all(&dagrun_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        dlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Effective timeout as a Duration for dispatch plumbing.
    pub fn subtask_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.subtask_timeout_ms)
    }

    /// Effective retry delay as a Duration.
    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_ms)
    }
}
