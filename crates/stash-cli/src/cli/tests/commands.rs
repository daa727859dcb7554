//! Tests for render, eval and archive subcommands.

use super::parse;
use crate::cli::CliCommand;
use std::path::Path;

#[test]
fn cli_parse_render() {
    match parse(&["stash", "render", "{id:>04}", "--json", r#"{"id": 7}"#]).command {
        CliCommand::Render {
            template,
            json,
            default,
        } => {
            assert_eq!(template, "{id:>04}");
            assert_eq!(json, r#"{"id": 7}"#);
            assert!(default.is_none());
        }
        _ => panic!("expected Render"),
    }
}

#[test]
fn cli_parse_eval_default_json() {
    match parse(&["stash", "eval", "1 + 1"]).command {
        CliCommand::Eval { expr, json } => {
            assert_eq!(expr, "1 + 1");
            assert_eq!(json, "{}");
        }
        _ => panic!("expected Eval"),
    }
}

#[test]
fn cli_parse_archive() {
    let cli = parse(&[
        "stash",
        "--config",
        "/etc/stash.toml",
        "archive",
        "db.sqlite3",
        "--category",
        "site",
        "--add",
    ]);
    assert_eq!(cli.config.as_deref(), Some(Path::new("/etc/stash.toml")));
    match cli.command {
        CliCommand::Archive {
            path,
            category,
            format,
            add,
            ..
        } => {
            assert_eq!(path, Path::new("db.sqlite3"));
            assert_eq!(category, "site");
            assert_eq!(format, "{filename}");
            assert!(add);
        }
        _ => panic!("expected Archive"),
    }
}

#[tokio::test]
async fn archive_command_records_items() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("archive.sqlite3");
    let json = r#"{"filename": "a"}"#;
    super::super::commands::run_archive(&db, "site", "{filename}", json, true)
        .await
        .unwrap();
    let archive = stash_core::archive::DownloadArchive::open(&db, "site", "{filename}", None)
        .await
        .unwrap();
    let meta = serde_json::from_str(json).unwrap();
    assert!(archive.contains(&meta).await.unwrap());
}

#[test]
fn render_rejects_bad_json() {
    assert!(super::super::commands::run_render("{x}", "[1]", None).is_err());
    assert!(super::super::commands::run_render("{x", "{}", None).is_err());
}
