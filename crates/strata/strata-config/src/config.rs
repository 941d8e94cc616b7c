use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct HsdConfig {
    /// Root directory for session directories.
    #[serde(default = "defaults::save_location")]
    pub save_location: PathBuf,
    /// Module configuration list (one module id per line).
    #[serde(default = "defaults::module_config")]
    pub module_config: PathBuf,
    /// Rotate a data file once it grows past this many bytes.
    #[serde(default = "defaults::max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "defaults::observatory")]
    pub observatory: String,
    #[serde(default)]
    pub dome: u32,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Key/value store address; `None` mirrors from an empty in-memory store.
    #[serde(default = "defaults::kv_addr")]
    pub kv_addr: Option<String>,
    #[serde(default = "defaults::capture_addr")]
    pub capture_addr: String,
    #[serde(default = "defaults::wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Create a module's file set the first time one of its records arrives.
    #[serde(default = "defaults::auto_create_modules")]
    pub auto_create_modules: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    use std::path::PathBuf;

    pub fn save_location() -> PathBuf {
        "./data/".into()
    }

    pub fn module_config() -> PathBuf {
        "./module.config".into()
    }

    pub fn max_file_size() -> u64 {
        1_000_000_000
    }

    pub fn observatory() -> String {
        "LICK".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn kv_addr() -> Option<String> {
        Some("127.0.0.1:6379".into())
    }

    pub fn capture_addr() -> String {
        "0.0.0.0:60001".into()
    }

    pub fn wait_timeout_ms() -> u64 {
        250
    }

    pub fn auto_create_modules() -> bool {
        true
    }
}

impl Default for HsdConfig {
    fn default() -> Self {
        Self {
            save_location: defaults::save_location(),
            module_config: defaults::module_config(),
            max_file_size: defaults::max_file_size(),
            observatory: defaults::observatory(),
            dome: 0,
            log_level: defaults::log_level(),
            kv_addr: defaults::kv_addr(),
            capture_addr: defaults::capture_addr(),
            wait_timeout_ms: defaults::wait_timeout_ms(),
            auto_create_modules: defaults::auto_create_modules(),
        }
    }
}

impl HsdConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml_to_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: HsdConfig = toml::from_str(&toml_to_str)?;
        Ok(config)
    }

    /// Like [`HsdConfig::load`], but a missing file means all defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }
}
