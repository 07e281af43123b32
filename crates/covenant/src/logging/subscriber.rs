use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogOutput, LoggingConfig};

/// Installs the global `tracing` subscriber for runtime diagnostics.
///
/// Diagnostics are kept apart from the chain log: with file output they go
/// to a `.trace` file next to `logging.file_path`, otherwise to stderr.
/// `RUST_LOG` overrides the configured level. Fails if a global subscriber
/// is already installed.
pub fn setup_global_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = config.level.as_tracing_level().as_str().to_lowercase();
            let directives = format!("warn,covenant={},covenant_chain={}", level, level);
            EnvFilter::builder().parse(&directives)?
        }
    };

    match (config.output, config.file_path.as_deref()) {
        (LogOutput::File, Some(path)) => {
            let trace_path = diagnostics_path(path);
            if let Some(parent) = trace_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&trace_path)?;
            let file_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true)
                .with_ansi(false)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(file_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
        }
        _ => {
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(stderr_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
        }
    }

    Ok(())
}

/// `logs/chain.log` -> `logs/chain.log.trace`
pub fn diagnostics_path(chain_log: &Path) -> PathBuf {
    let mut name = chain_log.as_os_str().to_os_string();
    name.push(".trace");
    PathBuf::from(name)
}
