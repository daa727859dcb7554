//! CLI command handlers, one per file.

mod archive;
mod eval;
mod render;
mod run;

pub use archive::run_archive;
pub use eval::run_eval;
pub use render::run_render;
pub use run::{run_jobs, RunArgs};

use anyhow::{Context, Result};
use stash_core::value::Metadata;

/// Parse a `--json` argument into item metadata.
pub(crate) fn parse_metadata(json: &str) -> Result<Metadata> {
    serde_json::from_str(json).context("--json must be a JSON object")
}
