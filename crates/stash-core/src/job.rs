//! Download job driver.
//!
//! A job takes a stream of [`Item`]s of one category and, for each, runs the
//! predicate chain, places the file through [`PathFormat`], transfers it,
//! runs post-processors and records it in the archive.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::archive::DownloadArchive;
use crate::config::StashConfig;
use crate::path::PathFormat;
use crate::postprocess::{MetadataWriter, PostProcessor};
use crate::predicate::{
    build_predicate, FilterPredicate, Predicate, PredicateError, RangePredicate, UniquePredicate,
};
use crate::transfer::{self, extension_from_content_type};
use crate::value::{Metadata, Value};

/// One downloadable item: its URL plus the metadata describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub url: String,
    pub metadata: Metadata,
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("invalid item JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("item has no \"url\" string")]
    MissingUrl,
}

impl Item {
    pub fn new(url: impl Into<String>, metadata: Metadata) -> Self {
        Item {
            url: url.into(),
            metadata,
        }
    }

    /// Parse a JSON object whose `url` key names the item; every other key
    /// becomes metadata.
    pub fn from_json(line: &str) -> Result<Self, ItemError> {
        let mut metadata: Metadata = serde_json::from_str(line)?;
        match metadata.remove("url") {
            Some(Value::Str(url)) => Ok(Item { url, metadata }),
            _ => Err(ItemError::MissingUrl),
        }
    }
}

/// Parse newline-delimited item JSON. Blank lines and `#` comments are skipped.
pub fn parse_items(input: &str) -> Result<Vec<Item>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| Item::from_json(line).with_context(|| format!("line {}", n + 1)))
        .collect()
}

/// Per-item counts for a finished job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub downloaded: u32,
    pub skipped: u32,
    pub filtered: u32,
    pub failed: u32,
}

impl JobStats {
    pub fn merge(&mut self, other: JobStats) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.filtered += other.filtered;
        self.failed += other.failed;
    }
}

impl fmt::Display for JobStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} filtered, {} failed",
            self.downloaded, self.skipped, self.filtered, self.failed
        )
    }
}

/// Transfer options that do not affect naming.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub part: bool,
    pub part_directory: Option<PathBuf>,
    pub mtime: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            part: true,
            part_directory: None,
            mtime: true,
        }
    }
}

enum Outcome {
    Downloaded,
    Skipped,
}

pub struct Job {
    category: String,
    path: PathFormat,
    predicate: Box<dyn Predicate>,
    archive: Option<DownloadArchive>,
    postprocessors: Vec<Box<dyn PostProcessor>>,
    options: JobOptions,
}

impl Job {
    pub fn new(
        category: impl Into<String>,
        path: PathFormat,
        predicate: Box<dyn Predicate>,
        archive: Option<DownloadArchive>,
        postprocessors: Vec<Box<dyn PostProcessor>>,
        options: JobOptions,
    ) -> Self {
        Job {
            category: category.into(),
            path,
            predicate,
            archive,
            postprocessors,
            options,
        }
    }

    /// Build a job for `category` from configuration: path templates with
    /// category overrides, unique / range / filter predicates (in that
    /// order), the archive and the metadata sidecar writer.
    pub async fn from_config(cfg: &StashConfig, category: &str) -> Result<Self> {
        let path = PathFormat::new(&cfg.path_settings(category))?;

        let mut predicates: Vec<Box<dyn Predicate>> = Vec::new();
        if cfg.image_unique {
            predicates.push(Box::new(UniquePredicate::new()));
        }
        if let Some(spec) = &cfg.image_range {
            predicates.push(Box::new(RangePredicate::new(spec)?));
        }
        if let Some(expr) = &cfg.image_filter {
            predicates.push(Box::new(FilterPredicate::new(expr)?));
        }

        let archive = match cfg.archive_path() {
            Some(path) => Some(
                DownloadArchive::open(&path, category, cfg.archive_format(category), None)
                    .await
                    .with_context(|| format!("failed to open archive {}", path.display()))?,
            ),
            None => None,
        };

        let mut postprocessors: Vec<Box<dyn PostProcessor>> = Vec::new();
        if cfg.metadata_sidecar {
            postprocessors.push(Box::new(MetadataWriter::new()));
        }

        let options = JobOptions {
            part: cfg.part,
            part_directory: cfg.part_directory.clone(),
            mtime: cfg.mtime,
        };
        Ok(Job::new(
            category,
            path,
            build_predicate(predicates),
            archive,
            postprocessors,
            options,
        ))
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Process `items` in order. A predicate stop ends the run early without
    /// error; per-item failures are logged and counted.
    pub async fn run<I>(&mut self, items: I) -> Result<JobStats>
    where
        I: IntoIterator<Item = Item>,
    {
        if let Some(dir) = &self.options.part_directory {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create part directory {}", dir.display()))?;
        }

        let mut stats = JobStats::default();
        for Item { url, mut metadata } in items {
            if !matches!(metadata.get("category"), Some(Value::Str(c)) if !c.is_empty()) {
                metadata.insert("category".to_string(), Value::from(self.category.as_str()));
            }

            match self.predicate.check(&url, &metadata) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(url = %url, "filtered");
                    stats.filtered += 1;
                    continue;
                }
                Err(PredicateError::Stop(_)) => {
                    info!(category = %self.category, "stopping job");
                    break;
                }
                Err(PredicateError::Filter(e)) => {
                    warn!(url = %url, "{}", e);
                    stats.filtered += 1;
                    continue;
                }
            }

            match self.handle(&url, metadata).await {
                Ok(Outcome::Downloaded) => stats.downloaded += 1,
                Ok(Outcome::Skipped) => {
                    debug!(path = %self.path.path(), "skipping existing file");
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(url = %url, "download failed: {:#}", e);
                    stats.failed += 1;
                }
            }
        }

        for pp in &mut self.postprocessors {
            if let Err(e) = pp.finalize() {
                warn!(postprocessor = pp.name(), "finalize failed: {:#}", e);
            }
        }
        info!(category = %self.category, %stats, "job finished");
        Ok(stats)
    }

    async fn handle(&mut self, url: &str, metadata: Metadata) -> Result<Outcome> {
        self.path.set_directory(&metadata)?;
        self.path.set_filename(metadata);
        if self.path.exists(self.archive.as_ref()).await? {
            return Ok(Outcome::Skipped);
        }

        for pp in &mut self.postprocessors {
            pp.prepare(&mut self.path)
                .with_context(|| format!("{} prepare", pp.name()))?;
        }

        let mut resume_from = 0;
        if self.options.part {
            self.path
                .enable_part_file(self.options.part_directory.as_deref());
            resume_from = self.path.part_file_size();
            if resume_from > 0 {
                debug!(path = %self.path.temp_path().display(), resume_from, "resuming part file");
            }
        } else if self.path.extension().is_empty() {
            // Placeholder name until the transfer tells us the extension.
            self.path.set_extension("part", false);
        }

        let fetched = match transfer::fetch(url, self.path.temp_path(), resume_from).await {
            Ok(fetched) => fetched,
            Err(e) => {
                // Keep partial data only when a part file can resume it.
                if !self.options.part {
                    self.path.set_delete(true);
                    self.path.finalize()?;
                }
                return Err(e);
            }
        };

        if self.path.extension().is_empty() {
            let extension = fetched
                .content_type
                .as_deref()
                .and_then(extension_from_content_type)
                .map(str::to_string)
                .or_else(|| extension_from_url(url))
                .unwrap_or_else(|| "bin".to_string());
            self.path.set_extension(&extension, true);
        }
        if !self.options.mtime {
            self.path.metadata_mut().remove("_mtime");
        }

        for pp in &mut self.postprocessors {
            pp.run(&mut self.path)
                .with_context(|| format!("{} run", pp.name()))?;
        }
        self.path.finalize()?;
        for pp in &mut self.postprocessors {
            pp.run_after(&self.path)
                .with_context(|| format!("{} run_after", pp.name()))?;
        }

        if let Some(archive) = &self.archive {
            archive.add(self.path.metadata()).await?;
        }
        info!(path = %self.path.path(), size = fetched.size, "downloaded");
        Ok(Outcome::Downloaded)
    }
}

/// Extension of the last URL path segment, if it looks like one.
fn extension_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    let (_, ext) = name.rsplit_once('.')?;
    let valid = (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

/// Run several jobs with up to `max_concurrent` in flight at once and sum
/// their stats.
pub async fn run_jobs_parallel(
    jobs: Vec<(Job, Vec<Item>)>,
    max_concurrent: usize,
) -> Result<JobStats> {
    let max_concurrent = max_concurrent.max(1);
    let mut queue = jobs.into_iter();
    let mut join_set = tokio::task::JoinSet::new();
    let mut total = JobStats::default();

    loop {
        while join_set.len() < max_concurrent {
            let Some((mut job, items)) = queue.next() else {
                break;
            };
            join_set.spawn(async move { job.run(items).await });
        }

        let Some(res) = join_set.join_next().await else {
            break;
        };
        match res {
            Ok(Ok(stats)) => total.merge(stats),
            Ok(Err(e)) => {
                warn!("job failed: {:#}", e);
                total.failed += 1;
            }
            Err(e) => warn!("job task panicked: {}", e),
        }
    }
    Ok(total)
}
