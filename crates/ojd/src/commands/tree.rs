use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use ojd_conf::user_config_file;
use ojd_remote::http_client;
use ojd_remote::GithubSource;
use ojd_remote::JbsSource;
use ojd_tree::TreeCache;
use ojd_tree::TreeEvent;
use ojd_tree::TreeSource;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::args::Args;
use crate::args::GlobalArgs;
use crate::commands::Command;
use crate::render;
use crate::session::Session;

/// How long the tree must stay quiet before it is printed.
const SETTLE: Duration = Duration::from_millis(150);

#[derive(Debug, Parser)]
pub struct TreeArgs {
    /// Levels below the roots to load and print.
    #[arg(long, default_value_t = 2)]
    pub depth: usize,

    /// Refresh and print the tree again every SECS seconds until interrupted.
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Rebuild the tree from scratch instead of refreshing it in place.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Parser)]
pub struct Github {
    #[command(flatten)]
    pub tree: TreeArgs,
}

impl Command for Github {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        let session = Session::load(&args.global)?;
        let source = GithubSource::new(session.settings(), http_client()?);
        let hint = onboarding_hint(
            "GitHub",
            "github.api_token, github.username and github.label_filter or github.repo_filter",
        );

        show(&self.tree, &TreeCache::new(source), &session, &args.global, &hint).await
    }
}

#[derive(Debug, Parser)]
pub struct Jbs {
    #[command(flatten)]
    pub tree: TreeArgs,
}

impl Command for Jbs {
    async fn execute(&self, args: &Args) -> Result<ExitCode> {
        let session = Session::load(&args.global)?;
        let source = JbsSource::new(session.settings(), http_client()?);
        let hint = onboarding_hint("JBS", "jbs.api_token and jbs.username");

        show(&self.tree, &TreeCache::new(source), &session, &args.global, &hint).await
    }
}

fn onboarding_hint(panel: &str, keys: &str) -> String {
    let location = match user_config_file() {
        Some(path) => format!("{} or ./ojd.toml", path.display()),
        None => "./ojd.toml".to_string(),
    };
    format!("{panel} is not configured. Set {keys} in {location}.")
}

async fn show<S: TreeSource>(
    options: &TreeArgs,
    cache: &TreeCache<S>,
    session: &Session,
    global: &GlobalArgs,
    hint: &str,
) -> Result<ExitCode> {
    let mut events = cache.subscribe();

    cache.refresh(options.force);
    if cache.roots().is_empty() {
        if !global.quiet {
            eprintln!("{hint}");
        }
        return Ok(ExitCode::FAILURE);
    }
    print_tree(cache, &mut events, options.depth, global.quiet).await;

    let Some(seconds) = options.watch else {
        return Ok(ExitCode::SUCCESS);
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                refresh_from_disk(session, cache);
                println!();
                if cache.roots().is_empty() {
                    if !global.quiet {
                        eprintln!("{hint}");
                    }
                } else {
                    print_tree(cache, &mut events, options.depth, global.quiet).await;
                }
            }
            interrupted = tokio::signal::ctrl_c() => {
                interrupted.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Pick up edits to the settings files. Changed settings rebuild the roots,
/// which hold queries built from the previous values.
fn refresh_from_disk<S: TreeSource>(session: &Session, cache: &TreeCache<S>) {
    let changed = session.reload();
    cache.refresh(changed);
}

async fn print_tree<S: TreeSource>(
    cache: &TreeCache<S>,
    events: &mut broadcast::Receiver<TreeEvent<S::Context>>,
    depth: usize,
    quiet: bool,
) {
    let (tree, errors) = snapshot(cache, events, depth).await;

    if !quiet {
        for message in errors {
            eprintln!("{message}");
        }
    }

    println!("{tree}");
}

/// Load the tree down to `depth` and render it, together with the errors
/// reported while it loaded.
async fn snapshot<S: TreeSource>(
    cache: &TreeCache<S>,
    events: &mut broadcast::Receiver<TreeEvent<S::Context>>,
    depth: usize,
) -> (String, Vec<String>) {
    let roots = cache.roots();
    render::load(&roots, depth).await;
    let errors = render::settle(events, SETTLE).await;

    (render::render(&roots, depth), errors)
}
