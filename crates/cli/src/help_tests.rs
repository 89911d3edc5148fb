// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

#[test]
fn all_subcommands_in_help() {
    let cmd = crate::cli_command();
    let help_text = commands();
    for sub in cmd.get_subcommands() {
        let name = sub.get_name();
        if name == "help" {
            continue;
        }
        let pattern = format!("  {}", name);
        assert!(
            help_text.contains(&pattern),
            "command '{name}' missing from help::commands()"
        );
    }
}

#[test]
fn commands_returns_plain_text() {
    let result = commands();
    assert!(!result.contains("\x1b["), "commands() should not contain ANSI codes");
}

#[test]
fn template_returns_plain_text() {
    assert!(!template().contains("\x1b["));
}

#[test]
fn after_help_returns_plain_text() {
    assert!(!after_help().contains("\x1b["));
}

#[test]
fn commands_has_resources_section() {
    let result = commands();
    assert!(result.contains("Resources:"));
    assert!(result.contains("  task"));
    assert!(result.contains("  device"));
    assert!(result.contains("  queue"));
}

#[test]
fn colorize_help_applies_header_color() {
    let result = colorize_help("Resources:");
    assert!(result.contains(&format!("{}Resources:{}", fg256(color::codes::HEADER), RESET)));
}

#[test]
fn colorize_help_applies_usage_color() {
    let result = colorize_help("Usage: packlab [OPTIONS] [COMMAND]");
    assert!(result.contains(&format!("{}Usage:{}", fg256(color::codes::HEADER), RESET)));
}

#[test]
fn colorize_help_applies_literal_to_commands() {
    let result = colorize_help("  task         Inspect and retry analysis tasks");
    assert!(result.contains(&format!("{}task{}", fg256(color::codes::LITERAL), RESET)));
}

#[test]
fn colorize_help_applies_literal_to_option_flags() {
    let result = colorize_help("  -o, --output <OUTPUT>    Output format [default: text]");
    assert!(result.contains(&format!("{}-o{}", fg256(color::codes::LITERAL), RESET)));
    assert!(result.contains(&format!("{}--output{}", fg256(color::codes::LITERAL), RESET)));
}

#[test]
fn colorize_help_applies_context_to_placeholders() {
    let result = colorize_help("  -o, --output <OUTPUT>    Output format");
    assert!(result.contains(&format!("{}<OUTPUT>{}", fg256(color::codes::CONTEXT), RESET)));
}

#[test]
fn colorize_help_applies_context_to_defaults() {
    let result = colorize_help(
        "  -o, --output <OUTPUT>    Output format [default: text] [possible values: text, json]",
    );
    assert!(result.contains(&format!("{}[default: text]{}", fg256(color::codes::CONTEXT), RESET)));
}

#[test]
fn colorize_help_skips_existing_ansi() {
    let input = "\x1b[38;5;74mAlready Colored\x1b[0m";
    assert_eq!(colorize_help(input), input);
}

#[test]
fn format_help_produces_output() {
    let help = format_help(crate::cli_command());
    assert!(!help.is_empty());
}

#[test]
fn format_help_ends_with_newline() {
    let help = format_help(crate::cli_command());
    assert!(help.ends_with('\n'));
}

#[test]
fn subcommand_help_uses_plain_base() {
    let cmd = crate::cli_command();
    let task = crate::find_subcommand(cmd, &["task", "list"]);
    let mut plain = task.styles(styles());
    let mut buf = Vec::new();
    plain.write_help(&mut buf).unwrap();
    let raw = String::from_utf8(buf).unwrap();
    assert!(!raw.contains("\x1b["));
}
