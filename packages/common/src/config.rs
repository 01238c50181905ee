use std::time::Duration;

use serde::Deserialize;

/// Bulk upload configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Interval between progress samples on a stream, in milliseconds. Default: 1000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Number of most recent log entries included in each progress frame. Default: 5.
    #[serde(default = "default_recent_window")]
    pub recent_window: u64,
    /// Pause between rows in the background runner, in milliseconds. Default: 50.
    #[serde(default = "default_row_delay_ms")]
    pub row_delay_ms: u64,
    /// Maximum accepted upload size in bytes. Default: 10 MB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// Sessions older than this are purged by the retention sweep. Default: 24.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    /// How often the retention sweep runs, in seconds. Default: 3600.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_recent_window() -> u64 {
    5
}
fn default_row_delay_ms() -> u64 {
    50
}
fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}
fn default_retention_hours() -> u64 {
    24
}
fn default_sweep_interval_secs() -> u64 {
    3600
}

impl UploadConfig {
    pub fn poll_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn row_delay(&self) -> Duration {
        Duration::from_millis(self.row_delay_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            recent_window: default_recent_window(),
            row_delay_ms: default_row_delay_ms(),
            max_file_size: default_max_file_size(),
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}
