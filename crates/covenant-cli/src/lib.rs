pub mod commands;
pub mod error;
pub mod output;

use clap::{Parser, Subcommand};

use crate::error::CliResult;
use crate::output::OutputManager;

/// Covenant CLI - audit tools for contract-verified actor chains.
#[derive(Debug, Parser)]
#[command(name = "covenant")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Turn on verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Display output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify the hash chain in a saved chain file
    #[command(name = "verify")]
    Verify(commands::verify::VerifyArgs),

    /// Print every commit of a saved chain file in the chain log format
    #[command(name = "render")]
    Render(commands::render::RenderArgs),

    /// Validate a runtime configuration file
    #[command(name = "config")]
    Config(commands::config::ConfigArgs),
}

/// Shared context for command execution
pub struct CommandContext {
    pub output: OutputManager,
    pub verbose: bool,
}

/// Runs the selected command. Failures are reported to stderr by the caller.
pub fn run(cli: &Cli) -> CliResult<()> {
    let ctx = CommandContext {
        output: OutputManager::new(cli.json),
        verbose: cli.verbose,
    };

    let result = match &cli.command {
        Commands::Verify(args) => commands::verify::execute(args, &ctx),
        Commands::Render(args) => commands::render::execute(args, &ctx),
        Commands::Config(args) => commands::config::execute(args, &ctx),
    };

    if let Err(e) = &result {
        ctx.output.error(&e.user_message())?;
        if ctx.verbose {
            eprintln!("\nDebug info: {:?}", e);
        }
    }
    result
}
