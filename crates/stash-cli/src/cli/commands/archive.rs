//! `stash archive` – check or record one item in a download archive.

use anyhow::Result;
use stash_core::archive::DownloadArchive;
use std::path::Path;

use super::parse_metadata;

pub async fn run_archive(
    path: &Path,
    category: &str,
    format: &str,
    json: &str,
    add: bool,
) -> Result<()> {
    let metadata = parse_metadata(json)?;
    let archive = DownloadArchive::open(path, category, format, None).await?;
    let key = archive.key_for(&metadata);
    let state = if add {
        if archive.claim(&metadata).await? {
            "added"
        } else {
            "present"
        }
    } else if archive.contains(&metadata).await? {
        "present"
    } else {
        "absent"
    };
    println!("{:<8} {}", state, key);
    Ok(())
}
