//! Tracing setup for the CLI.
//!
//! Two layers share one registry:
//! - a file layer writing `ojd.log` (daily rotation) in the cache directory,
//!   falling back to the temp directory, filtered by `RUST_LOG` (default
//!   `info`)
//! - a stderr layer whose level follows `--quiet` / `-v`

use std::env;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::args::GlobalArgs;

const LOG_FILE: &str = "ojd.log";

/// Install the global subscriber.
///
/// Returns a `WorkerGuard` that must be kept alive for the file logging to
/// work, or `None` when no log directory was writable.
pub fn init_tracing(args: &GlobalArgs) -> Option<WorkerGuard> {
    let (file_layer, guard) = match file_appender() {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let env_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(env_filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_level(args));

    Registry::default()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

fn stderr_level(args: &GlobalArgs) -> LevelFilter {
    if args.quiet {
        return LevelFilter::OFF;
    }
    match args.verbose {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn file_appender() -> Option<RollingFileAppender> {
    let cache_dir = ojd_conf::project_dirs().map(|dirs| dirs.cache_dir().to_path_buf());

    cache_dir
        .into_iter()
        .chain(std::iter::once(env::temp_dir()))
        .find_map(|dir: PathBuf| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE)
                .build(&dir)
                .ok()
        })
}
