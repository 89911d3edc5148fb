// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn zero_epoch_renders_as_dash() {
    assert_eq!(format_time_ago(0), "-");
}

#[test]
fn recent_timestamp_renders_in_seconds() {
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let ago = format_time_ago(now_ms - 5_000);
    assert!(ago.ends_with('s'), "expected seconds suffix, got {ago}");
}

#[test]
fn output_format_defaults_to_text() {
    assert!(matches!(OutputFormat::default(), OutputFormat::Text));
}
