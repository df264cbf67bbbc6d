//! Engine configuration loaded from TOML
//!
//! Every section is optional; missing keys fall back to defaults.
//! Environment variables (`EULER_LOG_*`) override the file.

use crate::errors::ConfigError;
use crate::logging::{self, LogConfig, LogFormat, LogOutput};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub heap: HeapConfig,

    #[serde(default)]
    pub stress: StressConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatName,

    /// Directory for rotated log files; stderr when absent
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatName {
    Pretty,
    #[default]
    Compact,
    Json,
}

/// Reference interpreter heap tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Allocations between automatic collections
    #[serde(default = "default_collect_threshold")]
    pub collect_threshold: usize,
}

/// Workload of the `euler stress` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_operations")]
    pub operations: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormatName::default(),
            file: None,
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            collect_threshold: default_collect_threshold(),
        }
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            operations: default_operations(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_initial_capacity() -> usize {
    64
}

fn default_collect_threshold() -> usize {
    256
}

fn default_threads() -> usize {
    8
}

fn default_operations() -> usize {
    10_000
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if logging::parse_level(&self.logging.level).is_none() {
            return Err(ConfigError::Parse {
                message: format!("unknown log level '{}'", self.logging.level),
            });
        }
        if self.heap.collect_threshold == 0 {
            return Err(ConfigError::Parse {
                message: "heap.collect_threshold must be at least 1".to_string(),
            });
        }
        if self.stress.threads == 0 {
            return Err(ConfigError::Parse {
                message: "stress.threads must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Apply `EULER_LOG_LEVEL`, `EULER_LOG_FORMAT` and `EULER_LOG_FILE`
    pub fn apply_env(&mut self) {
        if let Ok(level) = std::env::var("EULER_LOG_LEVEL") {
            if logging::parse_level(&level).is_some() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = std::env::var("EULER_LOG_FORMAT") {
            match LogFormat::parse(&format) {
                Some(LogFormat::Pretty) => self.logging.format = LogFormatName::Pretty,
                Some(LogFormat::Compact) => self.logging.format = LogFormatName::Compact,
                Some(LogFormat::Json) => self.logging.format = LogFormatName::Json,
                None => {}
            }
        }
        if let Ok(directory) = std::env::var("EULER_LOG_FILE") {
            self.logging.file = Some(directory);
        }
    }

    /// Logging setup described by the `[logging]` section
    pub fn log_config(&self) -> LogConfig {
        let format = match self.logging.format {
            LogFormatName::Pretty => LogFormat::Pretty,
            LogFormatName::Compact => LogFormat::Compact,
            LogFormatName::Json => LogFormat::Json,
        };

        let mut config = LogConfig::new().with_format(format);
        if let Some(level) = logging::parse_level(&self.logging.level) {
            config = config.with_level(level);
        }
        if let Some(directory) = &self.logging.file {
            config = config.with_output(LogOutput::File {
                directory: directory.clone(),
                prefix: "euler".to_string(),
            });
        }
        config
    }
}
