//! CLI for stash.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_archive, run_eval, run_jobs, run_render, RunArgs};

/// Top-level CLI for stash.
#[derive(Debug, Parser)]
#[command(name = "stash")]
#[command(about = "stash: template-driven file placement and download archive", long_about = None)]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use this config file instead of ~/.config/stash/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download items listed as JSON lines (one object with a "url" key per line).
    Run(RunArgs),

    /// Render a format string against JSON metadata.
    Render {
        /// Format string, e.g. "{title!l:?/ /}{id:>04}".
        template: String,
        /// Metadata as a JSON object.
        #[arg(long, default_value = "{}")]
        json: String,
        /// Rendered in place of missing fields.
        #[arg(long, value_name = "VALUE")]
        default: Option<String>,
    },

    /// Evaluate a filter expression against JSON metadata.
    Eval {
        /// Expression, e.g. "width > 1000 and extension in ('jpg', 'png')".
        expr: String,
        /// Metadata as a JSON object.
        #[arg(long, default_value = "{}")]
        json: String,
    },

    /// Look up (or record) an item in a download archive.
    Archive {
        /// Archive database file.
        path: PathBuf,
        /// Category prefix for keys.
        #[arg(long)]
        category: String,
        /// Key format string.
        #[arg(long, default_value = "{filename}")]
        format: String,
        /// Item metadata as a JSON object.
        #[arg(long, default_value = "{}")]
        json: String,
        /// Record the item instead of only checking it.
        #[arg(long)]
        add: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            CliCommand::Run(args) => run_jobs(self.config.as_deref(), args).await?,
            CliCommand::Render {
                template,
                json,
                default,
            } => run_render(&template, &json, default)?,
            CliCommand::Eval { expr, json } => run_eval(&expr, &json)?,
            CliCommand::Archive {
                path,
                category,
                format,
                json,
                add,
            } => run_archive(&path, &category, &format, &json, add).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
