// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task activity records.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// One captured network flow, associated with the activity on screen when it
/// was captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    pub url: String,
    pub host: String,
    pub method: String,
    pub status_code: Option<u16>,
    pub timestamp_ms: u64,
}

/// A single exercised UI screen: a screenshot, a UI-hierarchy snapshot, and
/// the flows captured while it was on screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub task_id: TaskId,
    pub activity_name: String,
    pub screenshot_path: Option<String>,
    pub ui_hierarchy_path: Option<String>,
    pub flows: Vec<FlowRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_record_holds_flows_in_capture_order() {
        let rec = ActivityRecord {
            task_id: TaskId::new("t1"),
            activity_name: "MainActivity".into(),
            screenshot_path: Some("screenshots/1.png".into()),
            ui_hierarchy_path: Some("ui_hierarchy/1.xml".into()),
            flows: vec![
                FlowRecord {
                    url: "https://a.example/1".into(),
                    host: "a.example".into(),
                    method: "GET".into(),
                    status_code: Some(200),
                    timestamp_ms: 1,
                },
                FlowRecord {
                    url: "https://a.example/2".into(),
                    host: "a.example".into(),
                    method: "POST".into(),
                    status_code: Some(201),
                    timestamp_ms: 2,
                },
            ],
        };
        assert_eq!(rec.flows.len(), 2);
        assert_eq!(rec.flows[0].timestamp_ms, 1);
    }
}
