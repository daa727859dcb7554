//! Moving a finished download into place.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use super::{PathError, PathFormat};
use crate::value::Value;

impl PathFormat {
    /// Move the temp file to the real path (or delete it when flagged) and
    /// apply the item's `_mtime`, if any.
    pub fn finalize(&mut self) -> Result<(), PathError> {
        if self.delete {
            self.delete = false;
            debug!(path = %self.temp_path, "discarding file");
            return match fs::remove_file(&self.temp_path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if self.temp_path != self.real_path {
            move_file(Path::new(&self.temp_path), Path::new(&self.real_path))?;
        }

        if let Some(mtime) = self.metadata.get("_mtime").and_then(mtime_from_value) {
            if let Err(e) = set_mtime(Path::new(&self.real_path), mtime) {
                warn!(path = %self.real_path, error = %e, "failed to set file modification time");
            }
        }
        Ok(())
    }
}

/// Rename, falling back to copy + delete (e.g. across filesystems). The copy
/// is staged next to the destination and renamed in, so `to` never holds a
/// partial file.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    move_file_with(from, to, |from, to| fs::rename(from, to))
}

fn move_file_with<R>(from: &Path, to: &Path, rename: R) -> io::Result<()>
where
    R: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(from = %from.display(), to = %to.display(), error = %e, "rename failed, copying");
            let dir = match to.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let mut staged = tempfile::NamedTempFile::new_in(dir)?;
            io::copy(&mut File::open(from)?, staged.as_file_mut())?;
            staged.persist(to).map_err(|e| e.error)?;
            fs::remove_file(from)
        }
    }
}

/// Seconds since the epoch (int or float), an RFC 2822 date string, or a
/// timestamp. Falsy values and anything else are ignored.
fn mtime_from_value(value: &Value) -> Option<SystemTime> {
    if !value.is_truthy() {
        return None;
    }
    let secs = match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::Str(s) => chrono::DateTime::parse_from_rfc2822(s.trim()).ok()?.timestamp() as f64,
        Value::Timestamp(ts) => ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9,
        _ => return None,
    };
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    UNIX_EPOCH.checked_add(Duration::try_from_secs_f64(secs).ok()?)
}

fn set_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    File::options().write(true).open(path)?.set_modified(mtime)
}
