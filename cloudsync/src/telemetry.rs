//! Structured logging setup
//!
//! Console output is pretty or JSON; an optional log file is always JSON and
//! written through a non-blocking rolling appender.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logging: bool,
    #[serde(default = "default_console_logging")]
    pub console_logging: bool,
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
    #[serde(default)]
    pub log_rotation: LogRotation,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            console_logging: default_console_logging(),
            log_file_path: None,
            log_rotation: LogRotation::default(),
        }
    }
}

impl TelemetryConfig {
    /// `RUST_LOG` wins over the configured level
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let level = self.log_level.to_lowercase();
        EnvFilter::try_new(format!("cloudsync={level},cloudsync_core={level}"))
            .with_context(|| format!("invalid log level '{}'", self.log_level))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_console_logging() -> bool {
    true
}

/// Install the global subscriber.
///
/// The returned guard flushes the log file on drop; keep it alive for the
/// lifetime of the process. Fails if a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;

    let pretty_console = (config.console_logging && !config.json_logging)
        .then(|| fmt::layer().with_target(true).with_line_number(true).pretty());
    let json_console = (config.console_logging && config.json_logging)
        .then(|| fmt::layer().json().with_current_span(true));

    let (file_layer, guard) = match &config.log_file_path {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(directory)
                .with_context(|| format!("creating log directory {}", directory.display()))?;
            let file_name = path.file_name().unwrap_or_else(|| OsStr::new("cloudsync.log"));

            let appender = match config.log_rotation {
                LogRotation::Daily => rolling::daily(directory, file_name),
                LogRotation::Hourly => rolling::hourly(directory, file_name),
                LogRotation::Never => rolling::never(directory, file_name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty_console)
        .with(json_console)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    info!(
        log_level = %config.log_level,
        json = config.json_logging,
        log_file = ?config.log_file_path,
        "Telemetry initialized"
    );
    Ok(guard)
}
