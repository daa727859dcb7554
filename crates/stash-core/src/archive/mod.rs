//! Persistent download archive (SQLite via sqlx).
//!
//! Records one key per downloaded item so later runs can skip it, even after
//! the file was moved or deleted. Keys are the item's category followed by
//! its rendered `archive_format` template.

mod db;

pub use db::*;
