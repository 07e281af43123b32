use std::path::{Path, PathBuf};

use clap::Parser;
use covenant::RuntimeConfig;

use crate::error::{CliError, CliResult};
use crate::CommandContext;

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    /// Path to a runtime configuration file (TOML)
    #[arg(required = true)]
    pub file: PathBuf,
}

pub fn load_config(path: &Path) -> CliResult<RuntimeConfig> {
    RuntimeConfig::from_file(path).map_err(|source| CliError::InvalidConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// One line per setting that shapes the chain log and the lanes.
pub fn describe(config: &RuntimeConfig) -> Vec<String> {
    let logging = &config.logging;
    let mut lines = vec![
        format!("chain events:     {}", if logging.chain_events { "on" } else { "off" }),
        format!("level:            {}", logging.level.as_str()),
    ];
    match &logging.file_path {
        Some(path) => lines.push(format!("output:           {:?} ({})", logging.output, path.display())),
        None => lines.push(format!("output:           {:?}", logging.output)),
    }
    lines.extend([
        format!(
            "logger queue:     {} entries, {:?} when full",
            logging.queue.capacity, logging.queue.policy
        ),
        format!("sink failures:    {:?}", logging.sink.failure),
        format!("mailbox capacity: {}", config.runtime.mailbox_capacity),
        format!(
            "contract limits:  {} bytes, {} ms",
            config.contracts.max_input_bytes, config.contracts.budget_ms
        ),
    ]);
    lines
}

pub fn execute(args: &ConfigArgs, ctx: &CommandContext) -> CliResult<()> {
    let config = load_config(&args.file)?;

    if ctx.output.is_json() {
        return ctx.output.json(&config);
    }

    ctx.output
        .success(&format!("{} is a valid configuration", args.file.display()))?;
    for line in describe(&config) {
        ctx.output
            .text(&format!("  {}", ctx.output.theme().muted.apply_to(line)))?;
    }
    Ok(())
}
