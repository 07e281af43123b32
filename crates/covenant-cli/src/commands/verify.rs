use std::path::{Path, PathBuf};

use clap::Parser;
use covenant_chain::ChainFile;
use serde::Serialize;
use tracing::debug;

use crate::error::{CliError, CliResult};
use crate::CommandContext;

#[derive(Debug, Parser)]
pub struct VerifyArgs {
    /// Path to a saved chain file
    #[arg(required = true)]
    pub file: PathBuf,
}

/// What a successful audit found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifySummary {
    pub actor: String,
    pub records: usize,
    /// Hash of the last record, if the chain has any.
    pub tip: Option<String>,
}

/// Loads and audits a chain file. Fails on the first record that breaks the chain.
pub fn verify_file(path: &Path) -> CliResult<VerifySummary> {
    let file = ChainFile::load(path).map_err(|source| CliError::ChainLoad {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Auditing {} records for actor {}", file.records.len(), file.actor);

    file.audit()
        .map_err(|source| CliError::integrity(path.to_path_buf(), source))?;

    Ok(VerifySummary {
        actor: file.actor.to_string(),
        records: file.records.len(),
        tip: file.records.last().map(|r| r.hash.to_string()),
    })
}

pub fn execute(args: &VerifyArgs, ctx: &CommandContext) -> CliResult<()> {
    let summary = verify_file(&args.file)?;

    if ctx.output.is_json() {
        return ctx.output.json(&summary);
    }

    let tip = match &summary.tip {
        Some(hash) => format!(", tip #{}", ctx.output.theme().accent.apply_to(hash)),
        None => String::new(),
    };
    ctx.output.success(&format!(
        "Chain for actor '{}' verified: {} records{}",
        summary.actor, summary.records, tip
    ))
}
