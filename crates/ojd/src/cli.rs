use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::args::Args;
use crate::commands::Command;
use crate::commands::OjdCommand;
use crate::logging;

/// The main CLI structure that defines the command-line interface
#[derive(Parser)]
#[command(name = "ojd")]
#[command(version, about = "Browse OpenJDK pull requests and JBS issues as a tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: OjdCommand,

    #[command(flatten)]
    pub args: Args,
}

/// Parse CLI arguments and execute the chosen command
pub async fn run(args: Vec<String>) -> Result<ExitCode> {
    let cli = Cli::try_parse_from(args).unwrap_or_else(|e| {
        e.exit();
    });

    let _guard = logging::init_tracing(&cli.args.global);

    cli.command.execute(&cli.args).await
}
