//! Integration tests: configured jobs against a local HTTP server and
//! `text:` items, covering naming, resume, archive skips and predicates.

mod common;

use common::media_server::{self, MediaServerOptions};
use stash_core::archive::DownloadArchive;
use stash_core::config::StashConfig;
use stash_core::job::{parse_items, Item, Job};
use stash_core::value::{Metadata, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn body() -> Vec<u8> {
    (0u8..100).cycle().take(16 * 1024).collect()
}

fn config(root: &Path) -> StashConfig {
    StashConfig {
        base_directory: root.join("out").to_string_lossy().into_owned(),
        filename: "{id}.{extension}".to_string(),
        archive: Some(root.join("state").join("archive.sqlite3")),
        archive_format: "{id}".to_string(),
        ..StashConfig::default()
    }
}

fn item(url: &str, id: i64, extension: Option<&str>) -> Item {
    let mut meta = Metadata::new();
    meta.insert("id".to_string(), Value::Int(id));
    if let Some(ext) = extension {
        meta.insert("extension".to_string(), Value::from(ext));
    }
    Item::new(url, meta)
}

#[tokio::test]
async fn http_download_is_named_from_content_type_and_archived() {
    let body = body();
    let server = media_server::start(
        body.clone(),
        MediaServerOptions {
            content_type: "image/png",
            ..MediaServerOptions::default()
        },
    );
    let root = tempdir().unwrap();
    let cfg = config(root.path());
    let url = format!("{}image", server.url);

    let mut job = Job::from_config(&cfg, "site").await.unwrap();
    let stats = job.run(vec![item(&url, 1, None)]).await.unwrap();
    assert_eq!(stats.downloaded, 1, "{stats}");

    let target = root.path().join("out").join("site").join("1.png");
    assert_eq!(fs::read(&target).unwrap(), body);
    assert!(!root.path().join("out").join("site").join("1.part").exists());

    let archive = DownloadArchive::open(
        root.path().join("state").join("archive.sqlite3"),
        "site",
        "{id}",
        None,
    )
    .await
    .unwrap();
    assert_eq!(archive.len().await.unwrap(), 1);

    // A fresh job sees the archive entry and never contacts the server.
    let served = server.requests();
    let mut job = Job::from_config(&cfg, "site").await.unwrap();
    let stats = job.run(vec![item(&url, 1, None)]).await.unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(server.requests(), served);
}

#[tokio::test]
async fn part_file_resumes_with_range_request() {
    let body = body();
    let server = media_server::start(body.clone(), MediaServerOptions::default());
    let root = tempdir().unwrap();
    let cfg = config(root.path());

    let dir = root.path().join("out").join("site");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("2.bin.part"), &body[..1000]).unwrap();

    let mut job = Job::from_config(&cfg, "site").await.unwrap();
    let stats = job
        .run(vec![item(&format!("{}file", server.url), 2, Some("bin"))])
        .await
        .unwrap();
    assert_eq!(stats.downloaded, 1, "{stats}");
    assert_eq!(fs::read(dir.join("2.bin")).unwrap(), body);
    assert!(!dir.join("2.bin.part").exists());
}

#[tokio::test]
async fn ignored_range_restarts_the_part_file() {
    let body = body();
    let server = media_server::start(
        body.clone(),
        MediaServerOptions {
            support_ranges: false,
            ..MediaServerOptions::default()
        },
    );
    let root = tempdir().unwrap();
    let cfg = config(root.path());

    let dir = root.path().join("out").join("site");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("3.bin.part"), vec![0xffu8; 500]).unwrap();

    let mut job = Job::from_config(&cfg, "site").await.unwrap();
    let stats = job
        .run(vec![item(&format!("{}file", server.url), 3, Some("bin"))])
        .await
        .unwrap();
    assert_eq!(stats.downloaded, 1, "{stats}");
    assert_eq!(fs::read(dir.join("3.bin")).unwrap(), body);
}

#[tokio::test]
async fn configured_predicates_and_sidecars() {
    let root = tempdir().unwrap();
    let mut cfg = config(root.path());
    cfg.archive = None;
    cfg.image_filter = Some("size > 1".to_string());
    cfg.image_range = Some("1-4".to_string());
    cfg.metadata_sidecar = true;
    cfg.directory = vec!["{category}".to_string(), "{album!l}".to_string()];

    let items = parse_items(
        r#"
{"url": "text:one", "id": 1, "size": 5, "album": "Trip", "extension": "txt"}
{"url": "text:small", "id": 2, "size": 1, "album": "Trip", "extension": "txt"}
{"url": "text:three", "id": 3, "size": 9, "album": "Trip", "extension": "txt", "_mtime": 1000000}
{"url": "text:four", "id": 4, "size": 9, "album": "Trip", "extension": "txt"}
{"url": "text:five", "id": 5, "size": 9, "album": "Trip", "extension": "txt"}
"#,
    )
    .unwrap();

    let mut job = Job::from_config(&cfg, "notes").await.unwrap();
    let stats = job.run(items).await.unwrap();
    // The small item still counts towards the range; id 5 is past it.
    assert_eq!(stats.downloaded, 3, "{stats}");
    assert_eq!(stats.filtered, 1, "{stats}");

    let dir = root.path().join("out").join("notes").join("trip");
    assert_eq!(fs::read_to_string(dir.join("3.txt")).unwrap(), "three");
    assert!(dir.join("4.txt").exists());
    assert!(!dir.join("5.txt").exists());
    assert!(!dir.join("2.txt").exists());

    let mtime = fs::metadata(dir.join("3.txt")).unwrap().modified().unwrap();
    let secs = mtime.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    assert_eq!(secs, 1_000_000);

    let sidecar: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("1.txt.json")).unwrap()).unwrap();
    assert_eq!(sidecar["album"], "Trip");
    assert_eq!(sidecar["category"], "notes");
}

#[tokio::test]
async fn existing_files_are_enumerated_when_skip_is_off() {
    let root = tempdir().unwrap();
    let mut cfg = config(root.path());
    cfg.archive = None;
    cfg.skip = false;

    let dir = root.path().join("out").join("site");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("7.txt"), "old").unwrap();

    let mut job = Job::from_config(&cfg, "site").await.unwrap();
    let stats = job
        .run(vec![item("text:new", 7, Some("txt"))])
        .await
        .unwrap();
    assert_eq!(stats.downloaded, 1);
    assert_eq!(fs::read_to_string(dir.join("7.txt")).unwrap(), "old");
    assert_eq!(fs::read_to_string(dir.join("7.1.txt")).unwrap(), "new");
}
