// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static analysis report child entity.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// Package metadata and counts produced by static analysis.
///
/// `basic_info` and `deep_analysis` are opaque JSON payloads owned by the
/// external static analyzer; this core only stores and forwards them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticReport {
    pub task_id: TaskId,
    pub package_name: Option<String>,
    pub app_name: Option<String>,
    pub activity_count: u32,
    pub service_count: u32,
    pub url_count: u32,
    pub domain_count: u32,
    /// Set when packer/obfuscation detection ran and found a match.
    pub packer_detected: Option<String>,
    pub basic_info: serde_json::Value,
    pub deep_analysis: serde_json::Value,
    /// URLs extracted from static analysis, fed into the primary-domain
    /// analyzer alongside the dynamic-capture URL list.
    pub static_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_report_round_trips_through_json() {
        let report = StaticReport {
            task_id: TaskId::new("t1"),
            package_name: Some("com.example.shop".into()),
            app_name: Some("Shop".into()),
            activity_count: 4,
            service_count: 1,
            url_count: 3,
            domain_count: 2,
            packer_detected: None,
            basic_info: serde_json::json!({"min_sdk": 21}),
            deep_analysis: serde_json::json!({}),
            static_urls: vec!["https://analytics.google.com/t".into()],
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: StaticReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.package_name.as_deref(), Some("com.example.shop"));
        assert_eq!(back.static_urls.len(), 1);
    }
}
