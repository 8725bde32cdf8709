//! Sink and alert policy configuration

use crate::record::Level;
use crate::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard bounds on the queue capacity; values outside are clamped.
const MIN_QUEUE_CAPACITY: usize = 1;
const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Top-level configuration: one output target, optionally one alert policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpoolConfig {
    pub sink: SinkConfig,

    /// Alerting is off unless a policy is configured.
    #[serde(default)]
    pub alert: Option<AlertConfig>,
}

/// Rotating sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Logical output path; rotated backups live next to it as
    /// `{output}.{timestamp}`.
    pub output: PathBuf,

    /// Bounded queue size, in records.
    pub queue_capacity: usize,

    /// Number of rotated backups to keep; 0 disables the sweep.
    pub max_backups: usize,

    /// Rotation interval in hours, aligned to wall-clock multiples; 0 means
    /// daily.
    pub rotate_hours: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            queue_capacity: 1024,
            max_backups: 7,
            rotate_hours: 24,
        }
    }
}

impl SinkConfig {
    /// Configured capacity clamped to a sane range.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity
            .clamp(MIN_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY)
    }
}

/// Alert policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Name used in notification titles.
    pub name: String,

    /// Minimum severity that counts toward the window.
    pub level: Level,

    /// Record count within the window that triggers a notification.
    pub threshold: usize,

    /// Sliding window length, in seconds.
    pub evaluate_period_secs: u64,

    /// Cooldown between notifications, in seconds.
    pub notify_period_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            name: "logspool".to_string(),
            level: Level::Error,
            threshold: 10,
            evaluate_period_secs: 300,
            notify_period_secs: 1800,
        }
    }
}

impl SpoolConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SpoolConfig = toml::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sink.output.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "sink.output must not be empty".to_string(),
            });
        }
        if self.sink.output.file_name().is_none() {
            return Err(Error::Config {
                message: format!(
                    "sink.output {} has no file name",
                    self.sink.output.display()
                ),
            });
        }

        if let Some(alert) = &self.alert {
            if alert.threshold == 0 {
                return Err(Error::Config {
                    message: "alert.threshold must be greater than 0".to_string(),
                });
            }
            if alert.evaluate_period_secs == 0 {
                return Err(Error::Config {
                    message: "alert.evaluate_period_secs must be greater than 0".to_string(),
                });
            }
            if alert.notify_period_secs == 0 {
                return Err(Error::Config {
                    message: "alert.notify_period_secs must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Default output path under the platform data directory.
fn default_output() -> PathBuf {
    match ProjectDirs::from("dev", "logspool", "logspool") {
        Some(dirs) => dirs.data_dir().join("logs").join("logspool.log"),
        None => PathBuf::from("./logs/logspool.log"),
    }
}
