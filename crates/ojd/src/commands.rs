mod config;
mod tree;

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::args::Args;

pub trait Command {
    async fn execute(&self, args: &Args) -> Result<ExitCode>;
}

#[derive(Debug, Subcommand)]
pub enum OjdCommand {
    /// Show GitHub notifications and open pull requests
    Github(self::tree::Github),
    /// Show JBS issues assigned to you and saved filters
    Jbs(self::tree::Jbs),
    /// Print the effective configuration
    Config(self::config::Config),
}

impl Command for OjdCommand {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        match self {
            OjdCommand::Github(command) => command.execute(args).await,
            OjdCommand::Jbs(command) => command.execute(args).await,
            OjdCommand::Config(command) => command.execute(args).await,
        }
    }
}
