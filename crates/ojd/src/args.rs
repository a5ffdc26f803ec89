use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Do not print any output besides the tree itself.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use verbose output.
    #[arg(global = true, action = clap::ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Directory to read `ojd.toml` / `.ojd.toml` from. Defaults to the
    /// current directory.
    #[arg(global = true, long, value_name = "DIR")]
    pub project: Option<PathBuf>,
}
