//! `stash run` – download items from JSON-lines input files.

use anyhow::{Context, Result};
use clap::Args;
use stash_core::config::{self, StashConfig};
use stash_core::job::{self, Item, Job};
use stash_core::value::Value;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Input files with one JSON item per line; "-" reads stdin.
    #[arg(required = true, value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Category for items that do not carry a "category" field.
    #[arg(long, default_value = "stash")]
    pub category: String,

    /// Base directory for downloads (overrides config).
    #[arg(short, long, value_name = "DIR")]
    pub destination: Option<String>,

    /// Only process items at these indices, e.g. "1-10,15".
    #[arg(long, value_name = "RANGE")]
    pub range: Option<String>,

    /// Only process items for which this expression is true.
    #[arg(long, value_name = "EXPR")]
    pub filter: Option<String>,

    /// Skip items whose URL was already seen in this run.
    #[arg(long)]
    pub unique: bool,

    /// Record downloads in this archive and skip recorded items.
    #[arg(long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Write <file>.json with each item's metadata.
    #[arg(long)]
    pub write_metadata: bool,

    /// Write straight to the target instead of a .part file.
    #[arg(long)]
    pub no_part: bool,

    /// Keep existing files and give new downloads a numbered name.
    #[arg(long)]
    pub no_skip: bool,

    /// Run up to N categories concurrently.
    #[arg(long, default_value = "1", value_name = "N")]
    pub jobs: usize,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, cfg: &mut StashConfig) {
        if let Some(dest) = &self.destination {
            cfg.base_directory = dest.clone();
        }
        if let Some(range) = &self.range {
            cfg.image_range = Some(range.clone());
        }
        if let Some(filter) = &self.filter {
            cfg.image_filter = Some(filter.clone());
        }
        if self.unique {
            cfg.image_unique = true;
        }
        if let Some(archive) = &self.archive {
            cfg.archive = Some(archive.clone());
        }
        if self.write_metadata {
            cfg.metadata_sidecar = true;
        }
        if self.no_part {
            cfg.part = false;
        }
        if self.no_skip {
            cfg.skip = false;
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Split items into one queue per category, keeping input order.
fn group_by_category(items: Vec<Item>, fallback: &str) -> BTreeMap<String, Vec<Item>> {
    let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in items {
        let category = match item.metadata.get("category") {
            Some(Value::Str(c)) if !c.is_empty() => c.clone(),
            _ => fallback.to_string(),
        };
        groups.entry(category).or_default().push(item);
    }
    groups
}

pub async fn run_jobs(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut cfg = match config_path {
        Some(path) => config::load_from(path)?,
        None => config::load_or_init()?,
    };
    args.apply(&mut cfg);
    tracing::debug!("effective config: {:?}", cfg);

    let mut items = Vec::new();
    for input in &args.inputs {
        let text = read_input(input)?;
        items.extend(
            job::parse_items(&text).with_context(|| format!("in {}", input.display()))?,
        );
    }

    let mut jobs = Vec::new();
    for (category, items) in group_by_category(items, &args.category) {
        let job = Job::from_config(&cfg, &category).await?;
        jobs.push((job, items));
    }

    let stats = job::run_jobs_parallel(jobs, args.jobs).await?;
    println!("{}", stats);
    if stats.failed > 0 {
        anyhow::bail!("{} item(s) failed", stats.failed);
    }
    Ok(())
}
