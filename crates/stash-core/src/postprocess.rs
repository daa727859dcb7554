//! Hooks that run around each downloaded file.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::path::PathFormat;
use crate::value::Metadata;

/// A step attached to a job. `prepare` sees the item before the transfer,
/// `run` after the bytes are on disk but before `finalize` moves them,
/// `run_after` once the file sits at its real path. `finalize` is called once
/// when the job ends.
pub trait PostProcessor: Send {
    fn name(&self) -> &'static str;

    fn prepare(&mut self, _path: &mut PathFormat) -> Result<()> {
        Ok(())
    }

    fn run(&mut self, _path: &mut PathFormat) -> Result<()> {
        Ok(())
    }

    fn run_after(&mut self, _path: &PathFormat) -> Result<()> {
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes the item's metadata next to the file as `<file>.json`.
///
/// Keys starting with `_` are internal (e.g. `_mtime`) and left out.
#[derive(Debug, Default)]
pub struct MetadataWriter {
    written: usize,
}

impl MetadataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sidecar files written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

fn public_fields(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

impl PostProcessor for MetadataWriter {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn run_after(&mut self, path: &PathFormat) -> Result<()> {
        let mut sidecar = path.real_path().as_os_str().to_owned();
        sidecar.push(".json");
        let sidecar = PathBuf::from(sidecar);

        let mut json = serde_json::to_string_pretty(&public_fields(path.metadata()))?;
        json.push('\n');
        fs::write(&sidecar, json)
            .with_context(|| format!("failed to write {}", sidecar.display()))?;
        tracing::debug!(path = %sidecar.display(), "wrote metadata");
        self.written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.written > 0 {
            tracing::info!(count = self.written, "metadata files written");
        }
        Ok(())
    }
}
