use clap::Parser;
use stash_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Prefer the log file; fall back to stderr so a read-only state dir
    // does not stop the CLI.
    if let Err(err) = logging::init_logging(cli.verbose) {
        logging::init_logging_stderr(cli.verbose);
        tracing::warn!("log file unavailable, logging to stderr: {:#}", err);
    }

    if let Err(err) = cli.run().await {
        eprintln!("stash error: {:#}", err);
        std::process::exit(1);
    }
}
