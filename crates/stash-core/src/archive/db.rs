//! SQLite-backed archive implementation.

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

use crate::template::Template;
use crate::value::{Metadata, Value};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Set of archived item keys.
///
/// Clones share the connection pool, so one archive can back several
/// concurrent jobs of the same category.
#[derive(Clone, Debug)]
pub struct DownloadArchive {
    pub(crate) pool: Pool<Sqlite>,
    keygen: Template,
}

impl DownloadArchive {
    /// Open (or create) the archive at `path`. Keys are `category` followed
    /// by `archive_format` rendered against the item.
    pub async fn open(
        path: impl AsRef<Path>,
        category: &str,
        archive_format: &str,
        default: Option<Value>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let keygen = keygen(category, archive_format, default)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create archive directory {}", parent.display()))?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await
            .with_context(|| format!("failed to open archive {}", path.display()))?;
        let archive = DownloadArchive { pool, keygen };
        archive.migrate().await?;
        Ok(archive)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS archive (entry TEXT PRIMARY KEY) WITHOUT ROWID")
            .execute(&self.pool)
            .await
            .context("failed to create archive table")?;
        Ok(())
    }

    /// The archive key for `metadata`.
    pub fn key_for(&self, metadata: &Metadata) -> String {
        self.keygen.render(metadata)
    }

    pub async fn contains(&self, metadata: &Metadata) -> Result<bool> {
        let key = self.key_for(metadata);
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM archive WHERE entry = ?1 LIMIT 1")
            .bind(&key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("archive lookup failed for {key:?}"))?;
        Ok(row.is_some())
    }

    /// Record `metadata`'s key. Adding an existing key is a no-op.
    pub async fn add(&self, metadata: &Metadata) -> Result<()> {
        self.claim(metadata).await.map(|_| ())
    }

    /// Record `metadata`'s key; returns whether it was newly inserted.
    /// Lets concurrent jobs sharing one archive agree on a single winner.
    pub async fn claim(&self, metadata: &Metadata) -> Result<bool> {
        let key = self.key_for(metadata);
        let result = sqlx::query("INSERT OR IGNORE INTO archive (entry) VALUES (?1)")
            .bind(&key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("archive insert failed for {key:?}"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of recorded keys.
    pub async fn len(&self) -> Result<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM archive")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}

/// The category is literal text in front of the format template.
fn keygen(category: &str, archive_format: &str, default: Option<Value>) -> Result<Template> {
    let source = format!(
        "{}{}",
        category.replace('{', "{{").replace('}', "}}"),
        archive_format
    );
    Template::compile(&source, default)
        .with_context(|| format!("invalid archive format {archive_format:?}"))
}

#[cfg(test)]
/// Open an in-memory archive for tests (no disk I/O).
pub(crate) async fn open_memory(category: &str, archive_format: &str) -> Result<DownloadArchive> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let archive = DownloadArchive {
        pool,
        keygen: keygen(category, archive_format, None)?,
    };
    archive.migrate().await?;
    Ok(archive)
}
