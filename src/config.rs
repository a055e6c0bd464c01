use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::session::MonitorConfig;

pub const URL_ENV: &str = "FLUENT_CONTROL_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "CONFIG_IO",
            ConfigError::Parse(_) => "CONFIG_PARSE",
            ConfigError::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub monitor: MonitorSettings,
    /// Site catalog; the instrument defaults apply when unset
    #[serde(default)]
    pub catalog_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InstrumentConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.1.100".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl InstrumentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Polling monitor settings, in milliseconds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_retry_budget() -> u32 {
    5
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            timeout_ms: 600_000,
            max_backoff_ms: default_max_backoff_ms(),
            retry_budget: default_retry_budget(),
        }
    }
}

impl From<&MonitorSettings> for MonitorConfig {
    fn from(s: &MonitorSettings) -> Self {
        MonitorConfig {
            poll_interval: Duration::from_millis(s.poll_interval_ms),
            timeout: Duration::from_millis(s.timeout_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms),
            retry_budget: s.retry_budget,
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml` and apply environment overrides
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&format!("config/{}.yaml", env))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.instrument.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("instrument.base_url is empty".into()));
        }
        if self.instrument.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "instrument.request_timeout_ms must be > 0".into(),
            ));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "monitor.poll_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// `FLUENT_CONTROL_URL` replaces the configured instrument address
    pub fn apply_env_overrides(&mut self) {
        self.override_base_url(std::env::var(URL_ENV).ok());
    }

    fn override_base_url(&mut self, url: Option<String>) {
        if let Some(url) = url
            && !url.trim().is_empty()
        {
            self.instrument.base_url = url;
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::from(&self.monitor)
    }
}
