use std::process::ExitCode;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use ojd_conf::user_config_file;
use ojd_conf::Settings;

use crate::args::Args;
use crate::commands::Command;
use crate::session::Session;

#[derive(Debug, Parser)]
pub struct Config {
    /// Print the location of the user configuration file instead.
    #[arg(long)]
    path: bool,
}

impl Command for Config {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        if self.path {
            let path = user_config_file().context("Could not determine the home directory")?;
            println!("{}", path.display());
            return Ok(ExitCode::SUCCESS);
        }

        let session = Session::load(&args.global)?;
        let toml = session
            .settings()
            .read(Settings::to_toml)
            .context("Failed to render settings")?;
        print!("{toml}");

        Ok(ExitCode::SUCCESS)
    }
}
