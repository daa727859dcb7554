use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::path::{expand_path, PathRestrict, PathSettings, DEFAULT_REMOVE};
use crate::value::Value;

/// Per-category overrides (`[category.<name>]` tables).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
}

/// Global configuration loaded from `~/.config/stash/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StashConfig {
    /// Root of every download directory (`~` and `$VAR` are expanded).
    pub base_directory: String,
    /// Characters replaced with `_` in each path segment: "auto", "unix",
    /// "windows" or a literal character set.
    pub path_restrict: PathRestrict,
    /// Characters stripped from the whole path (`a-b` ranges allowed).
    pub path_remove: String,
    /// Treat files already on disk as downloaded. When false they are kept
    /// and new downloads get a numbered name.
    pub skip: bool,
    /// Rendered in place of metadata fields that do not exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords_default: Option<Value>,
    /// Filename template.
    pub filename: String,
    /// Directory templates, one per path segment.
    pub directory: Vec<String>,
    /// SQLite archive of downloaded items; disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    /// Archive key template, prefixed with the category.
    pub archive_format: String,
    /// Download into `.part` files and rename when complete.
    pub part: bool,
    /// Keep `.part` files in this directory instead of next to the target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_directory: Option<PathBuf>,
    /// Apply the item's `_mtime` to finished files.
    pub mtime: bool,
    /// Write `<file>.json` with the item's metadata.
    pub metadata_sidecar: bool,
    /// Index ranges of items to process, e.g. "1-10,15".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_range: Option<String>,
    /// Filter expression evaluated per item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_filter: Option<String>,
    /// Skip items whose URL was already seen in the same run.
    pub image_unique: bool,
    pub category: BTreeMap<String, CategoryConfig>,
}

impl Default for StashConfig {
    fn default() -> Self {
        let path = PathSettings::default();
        Self {
            base_directory: path.base_directory,
            path_restrict: PathRestrict::Auto,
            path_remove: DEFAULT_REMOVE.to_string(),
            skip: true,
            keywords_default: None,
            filename: path.filename,
            directory: path.directory,
            archive: None,
            archive_format: "{filename}".to_string(),
            part: true,
            part_directory: None,
            mtime: true,
            metadata_sidecar: false,
            image_range: None,
            image_filter: None,
            image_unique: false,
            category: BTreeMap::new(),
        }
    }
}

impl StashConfig {
    fn overrides(&self, category: &str) -> Option<&CategoryConfig> {
        self.category.get(category)
    }

    /// Path settings for items of `category`, with its overrides applied.
    pub fn path_settings(&self, category: &str) -> PathSettings {
        let overrides = self.overrides(category);
        let pick = |get: fn(&CategoryConfig) -> Option<&String>, global: &String| {
            overrides.and_then(get).unwrap_or(global).clone()
        };
        PathSettings {
            filename: pick(|c| c.filename.as_ref(), &self.filename),
            directory: overrides
                .and_then(|c| c.directory.clone())
                .unwrap_or_else(|| self.directory.clone()),
            base_directory: pick(|c| c.base_directory.as_ref(), &self.base_directory),
            restrict: self.path_restrict.clone(),
            remove: self.path_remove.clone(),
            default: self.keywords_default.clone(),
            skip_existing: self.skip,
        }
    }

    /// Archive key template for `category`.
    pub fn archive_format(&self, category: &str) -> &str {
        self.overrides(category)
            .and_then(|c| c.archive_format.as_deref())
            .unwrap_or(&self.archive_format)
    }

    /// Archive database path with `~` and variables expanded.
    pub fn archive_path(&self) -> Option<PathBuf> {
        self.archive
            .as_ref()
            .map(|p| PathBuf::from(expand_path(&p.to_string_lossy())))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("stash")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<StashConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = StashConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit file.
pub fn load_from(path: &Path) -> Result<StashConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: StashConfig =
        toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
