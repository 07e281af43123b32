use std::path::PathBuf;

use covenant::ConfigError;
use covenant_chain::{ChainIntegrityError, ChainStoreError};
use thiserror::Error;

/// Main error type for the Covenant CLI
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load chain file {path}")]
    ChainLoad {
        path: PathBuf,
        #[source]
        source: ChainStoreError,
    },

    /// The chain was read but cannot be trusted.
    #[error("Chain file {path} failed verification at record {index} (#{hash})")]
    Integrity {
        path: PathBuf,
        index: usize,
        hash: String,
        #[source]
        source: ChainIntegrityError,
    },

    #[error("Invalid configuration in {path}")]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl CliError {
    pub fn integrity(path: PathBuf, source: ChainIntegrityError) -> Self {
        Self::Integrity {
            path,
            index: source.index(),
            hash: source.hash().to_string(),
            source,
        }
    }

    /// The message shown to the user, including the underlying cause.
    pub fn user_message(&self) -> String {
        match self {
            CliError::ChainLoad { source, .. } => format!("{}: {}", self, source),
            CliError::Integrity { source, .. } => format!("{}: {}", self, source),
            CliError::InvalidConfig { source, .. } => format!("{}: {}", self, source),
            _ => self.to_string(),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
