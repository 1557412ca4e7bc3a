//! Batch orchestration settings (`[batch]` section).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the batch orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum item pipelines inside their gated stages at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Root for per-item scratch directories.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// A task still Running after this long is marked TimedOut.
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Terminal tasks nobody polled are evicted after this long.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// How often the reaper sweeps the registry.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

fn default_max_concurrency() -> usize {
    3
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("vidtune")
}

fn default_batch_timeout() -> u64 {
    3600 // 1 hour
}

fn default_retention() -> u64 {
    86400 // 1 day
}

fn default_reaper_interval() -> u64 {
    60
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            scratch_dir: default_scratch_dir(),
            batch_timeout_secs: default_batch_timeout(),
            retention_secs: default_retention(),
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

impl BatchConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}
