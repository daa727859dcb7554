//! Tests for the run subcommand.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use stash_core::config::StashConfig;
use std::path::PathBuf;

#[test]
fn cli_parse_run_defaults() {
    let cli = parse(&["stash", "run", "items.jsonl"]);
    match cli.command {
        CliCommand::Run(args) => {
            assert_eq!(args.inputs, vec![PathBuf::from("items.jsonl")]);
            assert_eq!(args.category, "stash");
            assert_eq!(args.jobs, 1);
            assert!(args.range.is_none());
            assert!(!args.unique);
            assert!(!args.no_part);
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_requires_input() {
    assert!(Cli::try_parse_from(["stash", "run"]).is_err());
}

#[test]
fn cli_parse_run_options() {
    let cli = parse(&[
        "stash",
        "-vv",
        "run",
        "a.jsonl",
        "-",
        "--range",
        "1-5",
        "--filter",
        "width > 100",
        "--unique",
        "--archive",
        "/tmp/archive.sqlite3",
        "-d",
        "/tmp/out",
        "--jobs",
        "4",
    ]);
    assert_eq!(cli.verbose, 2);
    match cli.command {
        CliCommand::Run(args) => {
            assert_eq!(args.inputs.len(), 2);
            assert_eq!(args.range.as_deref(), Some("1-5"));
            assert_eq!(args.filter.as_deref(), Some("width > 100"));
            assert!(args.unique);
            assert_eq!(args.jobs, 4);
            assert_eq!(args.destination.as_deref(), Some("/tmp/out"));
        }
        _ => panic!("expected Run with options"),
    }
}

#[test]
fn run_args_override_config() {
    let cli = parse(&[
        "stash",
        "run",
        "a.jsonl",
        "--range",
        "2-",
        "--no-part",
        "--no-skip",
        "--write-metadata",
    ]);
    let CliCommand::Run(args) = cli.command else {
        panic!("expected Run");
    };
    let mut cfg = StashConfig::default();
    args.apply(&mut cfg);
    assert_eq!(cfg.image_range.as_deref(), Some("2-"));
    assert!(!cfg.part);
    assert!(!cfg.skip);
    assert!(cfg.metadata_sidecar);
    assert!(cfg.image_filter.is_none());
}
