use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::reconciler::{ReconcilerOptions, RetentionPolicy};
use crate::telemetry::{TelemetryConfig, LOG_LEVELS};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSyncConfig {
    #[serde(default)]
    pub reconciler: ReconcilerSettings,
    #[serde(default)]
    pub waiter: WaiterSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerSettings {
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default = "default_pending_delete_grace", with = "humantime_serde")]
    pub pending_delete_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiterSettings {
    #[serde(default = "default_wait_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_wait_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            pending_delete_grace: default_pending_delete_grace(),
        }
    }
}

impl Default for WaiterSettings {
    fn default() -> Self {
        Self {
            interval: default_wait_interval(),
            timeout: default_wait_timeout(),
        }
    }
}

impl CloudSyncConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: CloudSyncConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.waiter.interval.is_zero() {
            anyhow::bail!("Waiter interval must be greater than zero");
        }
        if self.waiter.timeout < self.waiter.interval {
            anyhow::bail!(
                "Waiter timeout ({:?}) is shorter than its interval ({:?})",
                self.waiter.timeout,
                self.waiter.interval
            );
        }

        let level = self.telemetry.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            anyhow::bail!("Unknown log level: {}", self.telemetry.log_level);
        }

        Ok(())
    }
}

impl From<&CloudSyncConfig> for ReconcilerOptions {
    fn from(config: &CloudSyncConfig) -> Self {
        Self {
            retention: config.reconciler.retention,
            pending_delete_grace: config.reconciler.pending_delete_grace,
            wait_interval: config.waiter.interval,
            wait_timeout: config.waiter.timeout,
        }
    }
}

// Default value functions
fn default_pending_delete_grace() -> Duration { Duration::from_secs(60 * 60) }
fn default_wait_interval() -> Duration { Duration::from_secs(5) }
fn default_wait_timeout() -> Duration { Duration::from_secs(60) }
