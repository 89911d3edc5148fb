// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::error::ErrorKind;

use super::cli_command;

// -- Version flag -----------------------------------------------------------

#[test]
fn version_short_lowercase_v() {
    let err = cli_command()
        .try_get_matches_from(["packlab", "-v"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayVersion);
}

#[test]
fn version_short_uppercase_v() {
    let err = cli_command()
        .try_get_matches_from(["packlab", "-V"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayVersion);
}

#[test]
fn version_long() {
    let err = cli_command()
        .try_get_matches_from(["packlab", "--version"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayVersion);
}

#[test]
fn version_uppercase_v_hidden_in_help() {
    let mut buf = Vec::new();
    cli_command().write_help(&mut buf).unwrap();
    let help = String::from_utf8(buf).unwrap();
    assert!(
        help.contains("-v, --version"),
        "help should show -v, --version"
    );
    assert!(
        !help.contains("-V,"),
        "help should not show -V as a visible flag"
    );
}

// -- Subcommand parsing -------------------------------------------------------

#[test]
fn task_list_parses_with_no_args() {
    let matches = cli_command().try_get_matches_from(["packlab", "task", "list"]);
    assert!(matches.is_ok(), "expected task list to parse, got {matches:?}");
}

#[test]
fn task_show_requires_id() {
    let err = cli_command()
        .try_get_matches_from(["packlab", "task", "show"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn device_list_parses() {
    let matches = cli_command().try_get_matches_from(["packlab", "device", "list"]);
    assert!(matches.is_ok(), "expected device list to parse, got {matches:?}");
}

#[test]
fn queue_stats_parses() {
    let matches = cli_command().try_get_matches_from(["packlab", "queue", "stats"]);
    assert!(matches.is_ok(), "expected queue stats to parse, got {matches:?}");
}

#[test]
fn unknown_subcommand_is_rejected() {
    let err = cli_command()
        .try_get_matches_from(["packlab", "bogus"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
}
