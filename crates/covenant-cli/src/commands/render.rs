use std::path::{Path, PathBuf};

use clap::Parser;
use covenant::logging::render_commit;
use covenant_chain::ChainFile;

use crate::error::{CliError, CliResult};
use crate::CommandContext;

#[derive(Debug, Parser)]
pub struct RenderArgs {
    /// Path to a saved chain file
    #[arg(required = true)]
    pub file: PathBuf,

    /// Render even if the chain fails its audit
    #[arg(long)]
    pub unverified: bool,
}

/// Loads `path`, auditing it unless `unverified` is set, so a tampered file
/// is never presented as history by accident.
fn load(path: &Path, unverified: bool) -> CliResult<ChainFile> {
    let file = ChainFile::load(path).map_err(|source| CliError::ChainLoad {
        path: path.to_path_buf(),
        source,
    })?;
    if !unverified {
        file.audit()
            .map_err(|source| CliError::integrity(path.to_path_buf(), source))?;
    }
    Ok(file)
}

/// Renders every commit in `path` in the chain log format.
pub fn render_file(path: &Path, unverified: bool) -> CliResult<String> {
    let file = load(path, unverified)?;
    Ok(file
        .records
        .iter()
        .map(render_commit)
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn execute(args: &RenderArgs, ctx: &CommandContext) -> CliResult<()> {
    if ctx.output.is_json() {
        let file = load(&args.file, args.unverified)?;
        return ctx.output.json(&file);
    }
    let rendered = render_file(&args.file, args.unverified)?;
    ctx.output.text(&rendered)
}
