// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain-analysis child entities: the output of the primary-domain analyzer
//! and the IP-locality & registration lookup stage.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// Source of an app-domain row's locality data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalitySource {
    Primary,
    Secondary,
    /// Lookup failed or returned no usable locality; row still persisted so
    /// the UI can show every resolved domain.
    Unresolved,
}

/// One `(task_id, domain, ip)` row.
///
/// Rebuilt wholesale on every re-analysis of a task: the repository deletes
/// all existing rows for the task before inserting the fresh batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDomainRow {
    pub task_id: TaskId,
    pub domain: String,
    pub ip: String,
    pub province: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub source: LocalitySource,
}

/// Result of registration lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationEntry {
    pub service_licence: String,
    pub unit_name: String,
}

/// Registration lookup outcome for the task's app identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistrationResult {
    Registered(Vec<RegistrationEntry>),
    NotRegistered,
    /// Lookup failed; non-fatal to the task.
    Unknown { reason: String },
}

/// The `task_domain_analysis` child row: primary-domain result plus
/// registration result plus the per-resolved-IP locality rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainAnalysis {
    pub task_id: TaskId,
    pub primary_domain: Option<String>,
    pub confidence: f64,
    /// Every registrable domain in the winner's subdomain-expansion set.
    pub domain_set: Vec<String>,
    pub registration: Option<RegistrationResult>,
    pub app_domains: Vec<AppDomainRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_ip_rows_still_persist() {
        let row = AppDomainRow {
            task_id: TaskId::new("t1"),
            domain: "shop.com".into(),
            ip: String::new(),
            province: None,
            city: None,
            isp: None,
            source: LocalitySource::Unresolved,
        };
        assert_eq!(row.source, LocalitySource::Unresolved);
        assert!(row.ip.is_empty());
    }
}
