//! Command line interface for editor_release.
//!
//! Parses arguments, initialises logging and hands off to the build
//! command.

mod args;
pub mod commands;
mod output;

pub use args::Args;
pub use commands::execute_build;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    init_logging(args.verbose);
    let output = OutputManager::new(args.verbose, false);
    execute_build(args, &output).await
}

/// Parse arguments without executing (for testing)
pub fn parse_args() -> Args {
    Args::parse_args()
}

/// `info` by default, `debug` with `-v`; `RUST_LOG` overrides both.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init();
}
