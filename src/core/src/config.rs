use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{JailError, Result};

/// Default location of the jmanager configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/jmanager.yml";

/// jmanager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JManagerConfig {
    /// Directory under which base images and jails are mounted
    pub jail_base_path: PathBuf,

    /// Directory holding jail config records and provisioning files
    pub jmanager_config_dir: PathBuf,

    /// ZFS dataset that parents every base image and jail dataset
    pub zfs_root_dataset: String,

    /// Distribution mirror (`https://`, `http://` or `file://`)
    pub mirror_url: String,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for JManagerConfig {
    fn default() -> Self {
        Self {
            jail_base_path: PathBuf::from("/usr/local/jails"),
            jmanager_config_dir: PathBuf::from("/usr/local/etc/jmanager"),
            zfs_root_dataset: "zroot/jails".to_string(),
            mirror_url: "https://ftp.FreeBSD.org".to_string(),
            log_level: LogLevel::Info,
        }
    }
}

impl JManagerConfig {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            JailError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: JManagerConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let dataset = &self.zfs_root_dataset;
        if dataset.is_empty()
            || dataset.contains('@')
            || dataset.starts_with('/')
            || dataset.ends_with('/')
        {
            return Err(JailError::Config(format!(
                "invalid zfs_root_dataset '{}'",
                dataset
            )));
        }
        if !self.jail_base_path.is_absolute() {
            return Err(JailError::Config(format!(
                "jail_base_path must be absolute: {}",
                self.jail_base_path.display()
            )));
        }
        if !self.jmanager_config_dir.is_absolute() {
            return Err(JailError::Config(format!(
                "jmanager_config_dir must be absolute: {}",
                self.jmanager_config_dir.display()
            )));
        }
        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive for an `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
