//! # Runtime Configuration
//!
//! Settings for the chain logger, the dispatcher and the contract evaluator,
//! loaded from TOML. Every section has defaults, so an empty file is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,
    pub runtime: DispatchConfig,
    pub contracts: ContractConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Render a CHAIN COMMIT block for every commit.
    pub chain_events: bool,
    /// Minimum level of supplementary entries.
    pub level: LogLevel,
    pub output: LogOutput,
    /// Required when `output` is `file`.
    pub file_path: Option<PathBuf>,
    pub queue: QueueConfig,
    pub sink: SinkConfig,
    /// How many recent commits the logger keeps for inspection. Zero keeps none.
    pub history: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            chain_events: true,
            level: LogLevel::Info,
            output: LogOutput::Stdout,
            file_path: None,
            queue: QueueConfig::default(),
            sink: SinkConfig::default(),
            history: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Upper-case tag used in supplementary log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File,
}

/// The bounded queue between the commit path and the sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub policy: QueuePolicy,
    /// How long `block` waits for room before dropping the record.
    pub block_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            policy: QueuePolicy::Drop,
            block_timeout_ms: 50,
        }
    }
}

impl QueueConfig {
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }
}

/// What happens to a rendered record when the logger queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Drop the record and count the loss.
    Drop,
    /// Wait up to `block_timeout_ms` for room, then drop and count.
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub failure: SinkFailure,
    /// Extra attempts per record when `failure` is `retry`.
    pub retries: u32,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            failure: SinkFailure::Drop,
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFailure {
    Drop,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of each actor's mailbox.
    pub mailbox_capacity: usize,
    /// Capacity of the dispatcher's command channel.
    pub command_capacity: usize,
    /// How long a sender waits on a full mailbox.
    pub send_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            command_capacity: 256,
            send_timeout_ms: 1000,
        }
    }
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Inputs larger than this are rejected without running the predicate.
    pub max_input_bytes: usize,
    /// Wall-clock budget for a single predicate.
    pub budget_ms: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 1024 * 1024,
            budget_ms: 250,
        }
    }
}

impl RuntimeConfig {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        content.parse()
    }

    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.output == LogOutput::File && self.logging.file_path.is_none() {
            return Err(ConfigError::Invalid(
                "logging.output = \"file\" requires logging.file_path".to_string(),
            ));
        }
        if self.logging.queue.capacity == 0 {
            return Err(ConfigError::Invalid(
                "logging.queue.capacity must be greater than zero".to_string(),
            ));
        }
        if self.runtime.mailbox_capacity == 0 || self.runtime.command_capacity == 0 {
            return Err(ConfigError::Invalid(
                "runtime channel capacities must be greater than zero".to_string(),
            ));
        }
        if self.contracts.budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "contracts.budget_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromStr for RuntimeConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
