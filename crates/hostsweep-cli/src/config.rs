//! Configuration loading and types

use std::path::{Path, PathBuf};

use hostsweep_core::{CollectorConfig, DirectoryConfig, ProbeConfig};
use hostsweep_inventory::SshConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "HOSTSWEEP_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Top-level contents of `hostsweep.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub ssh: SshConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            directory: DirectoryConfig::default(),
            collector: CollectorConfig::default(),
            probe: ProbeConfig::default(),
            ssh: SshConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the first config found, or defaults.
    ///
    /// Lookup order: `explicit`, `$HOSTSWEEP_CONFIG`, `./hostsweep.toml`,
    /// `/etc/hostsweep/hostsweep.toml`, then the user config directory.
    /// Returns the path that was loaded, if any.
    ///
    /// # Errors
    /// Returns error if the selected file cannot be read or parsed
    pub fn locate(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        let candidates = [
            Some(PathBuf::from("hostsweep.toml")),
            Some(PathBuf::from("/etc/hostsweep/hostsweep.toml")),
            dirs::config_dir().map(|p| p.join("hostsweep/hostsweep.toml")),
        ];

        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }
}
