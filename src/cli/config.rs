//! Configuration file
//!
//! ```json
//! {
//!   "data_dir": "data/db",
//!   "readonly": false,
//!   "log_level": "info",
//!   "log": { "enabled": true, "path": "journal", "file_max": 104857600 },
//!   "key_decoder": { "external": { "program": "ksdecode", "format": "bson" } }
//! }
//! ```
//!
//! Every field is optional. `key_decoder` may also be the string `"native"`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::engine::{EngineConfig, LogSettings};
use crate::keystring::{ExternalKeyCodec, KeyCodec, NativeKeyCodec};
use crate::observability::Severity;

pub const DEFAULT_DATA_DIR: &str = "data/db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Open every connection read-only
    #[serde(default)]
    pub readonly: bool,

    /// Minimum severity written to stderr
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub key_decoder: KeyDecoderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Relative to the data directory
    #[serde(default = "default_log_path")]
    pub path: String,
    #[serde(default = "default_file_max")]
    pub file_max: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDecoderConfig {
    #[default]
    Native,
    External { program: String, format: String },
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_path() -> String {
    "journal".to_string()
}
fn default_file_max() -> u64 {
    104857600
} // 100MB

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_log_path(),
            file_max: default_file_max(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            readonly: false,
            log_level: default_log_level(),
            log: LogConfig::default(),
            key_decoder: KeyDecoderConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }
        self.severity()?;
        if self.log.file_max == 0 {
            return Err(CliError::config_error("log.file_max must be > 0"));
        }
        if Path::new(&self.log.path).is_absolute() {
            return Err(CliError::config_error(format!(
                "log.path must be relative to data_dir: '{}'",
                self.log.path
            )));
        }
        if let KeyDecoderConfig::External { program, format } = &self.key_decoder {
            if program.trim().is_empty() {
                return Err(CliError::config_error("key_decoder.external.program must not be empty"));
            }
            if format.trim().is_empty() {
                return Err(CliError::config_error("key_decoder.external.format must not be empty"));
            }
        }
        Ok(())
    }

    pub fn severity(&self) -> CliResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            CliError::config_error(format!("Invalid log_level: '{}'", self.log_level))
        })
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Engine options for a command; `create` initialises a missing
    /// data directory and is ignored for read-only configs
    pub fn engine_config(&self, create: bool) -> EngineConfig {
        EngineConfig {
            create: create && !self.readonly,
            readonly: self.readonly,
            log: LogSettings {
                enabled: self.log.enabled,
                path: PathBuf::from(&self.log.path),
                file_max: self.log.file_max,
            },
        }
    }

    pub fn key_codec(&self) -> Arc<dyn KeyCodec> {
        match &self.key_decoder {
            KeyDecoderConfig::Native => Arc::new(NativeKeyCodec),
            KeyDecoderConfig::External { program, format } => {
                Arc::new(ExternalKeyCodec::new(program, format.clone()))
            }
        }
    }
}
