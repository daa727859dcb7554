//! Per-item path state machine.
//!
//! A [`PathFormat`] is built once per job from [`PathSettings`] and then
//! driven through `set_directory -> set_filename -> exists? -> open/write ->
//! set_extension? -> enable_part_file? -> finalize` for every item. It owns
//! the current item's metadata between `set_filename` and the next item.

mod finalize;
pub mod sanitize;

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};

use thiserror::Error;
use tracing::debug;

use crate::archive::DownloadArchive;
use crate::template::{FormatError, Template};
use crate::value::{Metadata, Value};
pub use sanitize::{Cleaner, PathRestrict, DEFAULT_REMOVE};

/// Which template a [`PathError::Format`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Filename,
    Directory,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateKind::Filename => "filename",
            TemplateKind::Directory => "directory",
        })
    }
}

#[derive(Debug, Error)]
pub enum PathError {
    #[error("invalid {kind} format string: {source}")]
    Format {
        kind: TemplateKind,
        #[source]
        source: FormatError,
    },
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Resolved path configuration for one job.
#[derive(Debug, Clone)]
pub struct PathSettings {
    pub filename: String,
    pub directory: Vec<String>,
    pub base_directory: String,
    pub restrict: PathRestrict,
    pub remove: String,
    /// Rendered for fields that cannot be resolved.
    pub default: Option<Value>,
    /// Existing files count as already downloaded; when false they are
    /// kept and the new file gets a numbered name instead.
    pub skip_existing: bool,
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            filename: "{filename}.{extension}".to_string(),
            directory: vec!["{category}".to_string()],
            base_directory: "./stash/".to_string(),
            restrict: PathRestrict::Auto,
            remove: DEFAULT_REMOVE.to_string(),
            default: None,
            skip_existing: true,
        }
    }
}

/// File open mode for [`PathFormat::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create or truncate.
    Write,
    /// Create or append (resuming a part file).
    Append,
}

#[derive(Debug)]
pub struct PathFormat {
    filename_template: Template,
    directory_templates: Vec<Template>,
    base_directory: String,
    clean_segment: Cleaner,
    clean_path: Cleaner,
    skip_existing: bool,

    metadata: Metadata,
    directory: String,
    real_directory: String,
    filename: String,
    extension: String,
    prefix: String,
    /// Put `prefix` in front of the filename instead of the extension.
    prefix_filename: bool,
    path: String,
    real_path: String,
    temp_path: String,
    delete: bool,
}

impl PathFormat {
    pub fn new(settings: &PathSettings) -> Result<Self, PathError> {
        let filename_template = Template::compile(&settings.filename, settings.default.clone())
            .map_err(|source| PathError::Format {
                kind: TemplateKind::Filename,
                source,
            })?;
        let directory_templates = settings
            .directory
            .iter()
            .map(|source| Template::compile(source, settings.default.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| PathError::Format {
                kind: TemplateKind::Directory,
                source,
            })?;

        Ok(PathFormat {
            filename_template,
            directory_templates,
            base_directory: expand_base_directory(&settings.base_directory),
            clean_segment: Cleaner::new(settings.restrict.charset(), "_"),
            clean_path: Cleaner::new(&settings.remove, ""),
            skip_existing: settings.skip_existing,
            metadata: Metadata::new(),
            directory: String::new(),
            real_directory: String::new(),
            filename: String::new(),
            extension: String::new(),
            prefix: String::new(),
            prefix_filename: false,
            path: String::new(),
            real_path: String::new(),
            temp_path: String::new(),
            delete: false,
        })
    }

    /// Render the directory templates for `metadata` and create the result.
    pub fn set_directory(&mut self, metadata: &Metadata) -> Result<(), PathError> {
        let segments: Vec<String> = self
            .directory_templates
            .iter()
            .filter_map(|template| {
                let rendered = template.render(metadata);
                let trimmed = rendered.trim();
                (!trimmed.is_empty()).then(|| self.clean_segment.clean(trimmed).into_owned())
            })
            .collect();

        let joined = format!("{}{}", self.base_directory, segments.join(MAIN_SEPARATOR_STR));
        let mut directory = self.clean_path.clean(&joined).into_owned();
        if !segments.is_empty() {
            directory.push(MAIN_SEPARATOR);
        }

        self.real_directory = real_directory(&directory);
        self.directory = directory;
        debug!(directory = %self.directory, "set directory");

        fs::create_dir_all(&self.real_directory).map_err(|source| PathError::CreateDir {
            path: PathBuf::from(&self.real_directory),
            source,
        })
    }

    /// Start a new item. The path is built right away when the metadata
    /// already names an extension.
    pub fn set_filename(&mut self, metadata: Metadata) {
        self.metadata = metadata;
        self.prefix.clear();
        self.prefix_filename = false;
        self.temp_path.clear();
        self.delete = false;
        self.extension = self
            .metadata
            .get("extension")
            .map(|v| match v {
                Value::Str(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        if !self.extension.is_empty() {
            self.build_path();
        }
    }

    /// Write `prefix + extension` into the metadata and rebuild the path.
    /// `real` also records it as the file's actual extension.
    pub fn set_extension(&mut self, extension: &str, real: bool) {
        if real {
            self.extension = extension.to_string();
        }
        self.metadata.insert(
            "extension".to_string(),
            Value::Str(format!("{}{}", self.prefix, extension)),
        );
        self.build_path();
    }

    pub fn build_path(&mut self) {
        let rendered = self.filename_template.render(&self.metadata);
        let segment = self.clean_segment.clean(&rendered);
        self.filename = self.clean_path.clean(&segment).into_owned();
        if self.prefix_filename {
            self.filename.insert_str(0, &self.prefix);
        }
        self.path = format!("{}{}", self.directory, self.filename);
        self.real_path = format!("{}{}", self.real_directory, self.filename);
        if self.temp_path.is_empty() {
            self.temp_path = self.real_path.clone();
        }
    }

    /// Pick the first free `N.`-prefixed name while the real path is taken.
    ///
    /// The prefix goes in front of the extension; filename templates that
    /// never render `{extension}` get it in front of the whole name.
    pub fn enumerate_file(&mut self) {
        let extension = self.extension.clone();
        let taken = self.real_path.clone();
        let mut num = 1u32;
        while Path::new(&self.real_path).exists() {
            self.prefix = format!("{num}.");
            self.temp_path.clear();
            self.set_extension(&extension, false);
            if !self.prefix_filename && self.real_path == taken {
                self.prefix_filename = true;
                self.temp_path.clear();
                self.build_path();
            }
            num += 1;
        }
        if num > 1 {
            debug!(path = %self.path, "renamed to avoid collision");
        }
    }

    /// Download into a `.part` file, optionally inside `part_directory`.
    pub fn enable_part_file(&mut self, part_directory: Option<&Path>) {
        if self.extension.is_empty() {
            self.set_extension("part", false);
        } else {
            self.temp_path.push_str(".part");
        }
        if let Some(dir) = part_directory {
            if let Some(name) = Path::new(&self.temp_path).file_name() {
                self.temp_path = dir.join(name).to_string_lossy().into_owned();
            }
        }
    }

    /// Size of an existing part file, 0 when absent.
    pub fn part_file_size(&self) -> u64 {
        fs::metadata(&self.temp_path).map(|m| m.len()).unwrap_or(0)
    }

    /// Settle on an empty extension and drop the dangling `.` it leaves.
    pub fn fix_extension(&mut self) {
        if !self.extension.is_empty() {
            return;
        }
        self.set_extension("", false);
        if self.path.ends_with('.') {
            self.path.pop();
            self.real_path.pop();
            self.temp_path = self.real_path.clone();
        }
    }

    /// Whether the current item is already present, either recorded in
    /// `archive` or on disk at its real path.
    pub async fn exists(&mut self, archive: Option<&DownloadArchive>) -> anyhow::Result<bool> {
        if let Some(archive) = archive {
            if archive.contains(&self.metadata).await? {
                self.fix_extension();
                return Ok(true);
            }
        }
        if self.extension.is_empty() || !Path::new(&self.real_path).exists() {
            return Ok(false);
        }
        if self.skip_existing {
            return Ok(true);
        }
        self.enumerate_file();
        Ok(false)
    }

    /// Open the temp path for writing.
    pub fn open(&self, mode: OpenMode) -> io::Result<File> {
        let mut options = File::options();
        options.create(true);
        match mode {
            OpenMode::Write => options.write(true).truncate(true),
            OpenMode::Append => options.append(true),
        };
        options.open(&self.temp_path)
    }

    /// Ask `finalize` to discard the downloaded file instead of keeping it.
    pub fn set_delete(&mut self, delete: bool) {
        self.delete = delete;
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Display form of the final path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn real_path(&self) -> &Path {
        Path::new(&self.real_path)
    }

    pub fn temp_path(&self) -> &Path {
        Path::new(&self.temp_path)
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references.
pub fn expand_path(path: &str) -> String {
    expand_vars(&expand_user(path))
}

/// [`expand_path`], then normalize separators and ensure a trailing one.
fn expand_base_directory(base: &str) -> String {
    let mut expanded = expand_path(base);
    if cfg!(windows) {
        expanded = expanded.replace('/', MAIN_SEPARATOR_STR);
    }
    if !expanded.is_empty() && !expanded.ends_with(MAIN_SEPARATOR) {
        expanded.push(MAIN_SEPARATOR);
    }
    expanded
}

fn expand_user(path: &str) -> String {
    let Some(rest) = path.strip_prefix('~') else {
        return path.to_string();
    };
    if !(rest.is_empty() || rest.starts_with(['/', MAIN_SEPARATOR])) {
        return path.to_string();
    }
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => format!("{}{}", home.to_string_lossy(), rest),
        None => path.to_string(),
    }
}

/// `$VAR` and `${VAR}`; unknown variables are left as written.
fn expand_vars(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match (name.is_empty(), std::env::var(name)) {
            (false, Ok(value)) => out.push_str(&value),
            _ => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &rest[pos + 1 + consumed..];
    }
    out.push_str(rest);
    out
}

#[cfg(windows)]
fn real_directory(directory: &str) -> String {
    match std::path::absolute(directory) {
        Ok(abs) => {
            let mut real = format!("\\\\?\\{}", abs.display());
            if !real.ends_with('\\') {
                real.push('\\');
            }
            real
        }
        Err(_) => directory.to_string(),
    }
}

#[cfg(not(windows))]
fn real_directory(directory: &str) -> String {
    directory.to_string()
}
