//! Exporter configuration.
//!
//! Settings come from three layers: command-line flags, an optional TOML
//! file, and built-in defaults. Each layer is a [`ConfigLayer`] of optional
//! values; [`ExporterConfig::resolve`] merges them with flags taking
//! precedence.
//!
//! Example `fio-exporter.toml`:
//!
//! ```toml
//! benchmark = "iops"
//! directory = "/mnt/scratch"
//! file_size = "4G"
//! interval = "30m"
//! port = 9996
//! ```

use crate::profile::{BenchmarkKind, BenchmarkProfile, ProfileError, ProfileSettings};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 9996;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(6 * 3600);
pub const DEFAULT_RUN_ONCE_WAIT: Duration = Duration::from_secs(3600);
pub const DEFAULT_RUNTIME_SECS: u64 = 60;
pub const DEFAULT_STATUS_UPDATE_INTERVAL_SECS: u64 = 30;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// One layer of optional settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub benchmark: Option<BenchmarkKind>,
    pub custom_fio_flags: Option<String>,
    pub directory: Option<PathBuf>,
    pub file_size: Option<String>,
    pub runtime_secs: Option<u64>,
    pub port: Option<u16>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Option<Duration>,
    pub run_once: Option<bool>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub run_once_wait: Option<Duration>,
    pub status_updates: Option<bool>,
    pub status_update_interval_secs: Option<u64>,
    pub fio_binary: Option<PathBuf>,
}

impl ConfigLayer {
    /// Load a layer from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let layer = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(layer)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Fill every unset value from `lower`.
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            benchmark: self.benchmark.or(lower.benchmark),
            custom_fio_flags: self.custom_fio_flags.or(lower.custom_fio_flags),
            directory: self.directory.or(lower.directory),
            file_size: self.file_size.or(lower.file_size),
            runtime_secs: self.runtime_secs.or(lower.runtime_secs),
            port: self.port.or(lower.port),
            interval: self.interval.or(lower.interval),
            run_once: self.run_once.or(lower.run_once),
            run_once_wait: self.run_once_wait.or(lower.run_once_wait),
            status_updates: self.status_updates.or(lower.status_updates),
            status_update_interval_secs: self
                .status_update_interval_secs
                .or(lower.status_update_interval_secs),
            fio_binary: self.fio_binary.or(lower.fio_binary),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| humantime::parse_duration(value.trim()).map_err(serde::de::Error::custom))
        .transpose()
}

/// Fully resolved exporter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub benchmark: BenchmarkKind,
    pub custom_fio_flags: Option<String>,
    pub directory: PathBuf,
    pub file_size: String,
    pub runtime_secs: u64,
    pub port: u16,
    pub interval: Duration,
    pub run_once: bool,
    pub run_once_wait: Duration,
    pub status_updates: bool,
    pub status_update_interval_secs: u64,
    pub fio_binary: PathBuf,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            benchmark: BenchmarkKind::Latency,
            custom_fio_flags: None,
            directory: PathBuf::from("/tmp"),
            file_size: "1G".to_string(),
            runtime_secs: DEFAULT_RUNTIME_SECS,
            port: DEFAULT_PORT,
            interval: DEFAULT_INTERVAL,
            run_once: false,
            run_once_wait: DEFAULT_RUN_ONCE_WAIT,
            status_updates: false,
            status_update_interval_secs: DEFAULT_STATUS_UPDATE_INTERVAL_SECS,
            fio_binary: PathBuf::from("fio"),
        }
    }
}

impl ExporterConfig {
    /// Merge flag values over an optional config file over defaults.
    pub fn resolve(cli: ConfigLayer, config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => ConfigLayer::from_file(path)?,
            None => ConfigLayer::default(),
        };
        Ok(Self::from_layer(cli.or(file)))
    }

    pub fn from_layer(layer: ConfigLayer) -> Self {
        let defaults = Self::default();
        Self {
            benchmark: layer.benchmark.unwrap_or(defaults.benchmark),
            custom_fio_flags: layer.custom_fio_flags,
            directory: layer.directory.unwrap_or(defaults.directory),
            file_size: layer.file_size.unwrap_or(defaults.file_size),
            runtime_secs: layer.runtime_secs.unwrap_or(defaults.runtime_secs),
            port: layer.port.unwrap_or(defaults.port),
            interval: layer.interval.unwrap_or(defaults.interval),
            run_once: layer.run_once.unwrap_or(defaults.run_once),
            run_once_wait: layer.run_once_wait.unwrap_or(defaults.run_once_wait),
            status_updates: layer.status_updates.unwrap_or(defaults.status_updates),
            status_update_interval_secs: layer
                .status_update_interval_secs
                .unwrap_or(defaults.status_update_interval_secs),
            fio_binary: layer.fio_binary.unwrap_or(defaults.fio_binary),
        }
    }

    /// Validate and build the benchmark profile.
    pub fn profile(&self) -> Result<BenchmarkProfile, ConfigError> {
        let settings = ProfileSettings {
            kind: self.benchmark,
            custom_flags: self.custom_fio_flags.clone(),
            directory: self.directory.clone(),
            file_size: self.file_size.clone(),
            runtime_secs: self.runtime_secs,
            status_interval_secs: self
                .status_updates
                .then_some(self.status_update_interval_secs),
        };
        Ok(BenchmarkProfile::new(settings)?)
    }
}
