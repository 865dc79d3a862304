//! TOML configuration for the apiwatch daemon.
//!
//! Every section falls back to compiled-in defaults, so an empty file (or no
//! file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use crate::detect::policy::PolicyError;
use crate::detect::ThresholdPolicy;
use crate::scheduler::DetectionSchedule;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "apiwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// File this configuration was read from; `None` for compiled-in defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Resolve the configuration, in order:
    /// 1. `explicit` (from `--config` or `APIWATCH_CONFIG`); must load.
    /// 2. `./apiwatch.toml` if it exists.
    /// 3. Compiled-in defaults.
    ///
    /// The result is validated.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::load(local)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.policy().context("invalid [thresholds] section")?;

        if self.schedule.fixed_delay_ms == 0 {
            bail!("[schedule] fixed_delay_ms must be greater than zero");
        }
        if self.schedule.window_minutes == 0 {
            bail!("[schedule] window_minutes must be greater than zero");
        }
        if self.schedule.manual_window_minutes == 0 {
            bail!("[schedule] manual_window_minutes must be greater than zero");
        }
        if self.notify.timeout_secs == 0 {
            bail!("[notify] timeout_secs must be greater than zero");
        }
        if let Some(url) = &self.notify.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("[notify] webhook_url must be an http(s) URL, got '{}'", url);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/apiwatch.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Error-rate limit as a fraction (0.1 = 10%).
    pub error_rate: f64,
    /// Response-time limit in milliseconds.
    pub response_time_ms: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        let policy = ThresholdPolicy::default();
        Self {
            error_rate: policy.error_rate_limit,
            response_time_ms: policy.response_time_limit_ms,
        }
    }
}

impl ThresholdsConfig {
    pub fn policy(&self) -> Result<ThresholdPolicy, PolicyError> {
        ThresholdPolicy::new(self.error_rate, self.response_time_ms)
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run the recurring detection loop in `serve`.
    pub enabled: bool,
    /// Pause between the end of one scheduled run and the start of the next.
    pub fixed_delay_ms: u64,
    /// Length of the window each scheduled run scans.
    pub window_minutes: u32,
    /// Length of the window a manual trigger scans.
    pub manual_window_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fixed_delay_ms: 300_000,
            window_minutes: 5,
            manual_window_minutes: 10,
        }
    }
}

impl ScheduleConfig {
    pub fn detection_schedule(&self) -> DetectionSchedule {
        DetectionSchedule {
            fixed_delay: Duration::from_millis(self.fixed_delay_ms),
            window: chrono::Duration::minutes(i64::from(self.window_minutes)),
        }
    }

    pub fn manual_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.manual_window_minutes))
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Log every new anomaly.
    pub log: bool,
    /// POST every new anomaly as JSON to this URL.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log: true,
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.schedule.fixed_delay_ms, 300_000);
        assert_eq!(config.schedule.detection_schedule().window, chrono::Duration::minutes(5));
        assert_eq!(config.schedule.manual_window(), chrono::Duration::minutes(10));
        assert_eq!(config.thresholds.policy().unwrap(), ThresholdPolicy::default());
        assert!(config.source.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [thresholds]
            response_time_ms = 1200.0

            [notify]
            webhook_url = "https://hooks.example.com/apiwatch"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.thresholds.response_time_ms, 1200.0);
        assert_eq!(config.thresholds.error_rate, 0.1);
        assert_eq!(config.notify.webhook_url.as_deref(), Some("https://hooks.example.com/apiwatch"));
        assert!(config.notify.log);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.schedule.enabled);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.thresholds.error_rate = 2.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schedule.fixed_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schedule.manual_window_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.notify.webhook_url = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\ndb_path = \"/tmp/apiwatch-test.db\"").unwrap();

        let config = AppConfig::resolve(Some(file.path())).unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/apiwatch-test.db"));
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_resolve_missing_explicit_path_fails() {
        let missing = Path::new("/nonexistent/apiwatch.toml");
        assert!(AppConfig::resolve(Some(missing)).is_err());
    }

    #[test]
    fn test_resolve_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[schedule]\nwindow_minutes = 0").unwrap();
        assert!(AppConfig::resolve(Some(file.path())).is_err());
    }
}
