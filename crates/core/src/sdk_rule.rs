// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Third-party SDK rule catalog entity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdkRuleStatus {
    Active,
    Pending,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdkRuleSource {
    Builtin,
    Discovered,
    Manual,
}

/// One row of the `third_party_sdk_rules` catalog.
///
/// `domain` is unique, case-insensitive. A URL's registrable domain matches
/// a rule by exact equality or by being a subdomain of `domain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkRule {
    pub domain: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub provider: Option<String>,
    pub confidence: f64,
    pub priority: i32,
    pub status: SdkRuleStatus,
    pub source: SdkRuleSource,
    pub discover_count: u32,
    pub first_seen_task_id: Option<String>,
}

impl SdkRule {
    /// True if `candidate` (already lowercase, e.g. a registrable domain)
    /// matches this rule by exact equality or as a subdomain.
    pub fn matches(&self, candidate: &str) -> bool {
        if self.status != SdkRuleStatus::Active {
            return false;
        }
        let rule_domain = self.domain.to_ascii_lowercase();
        candidate == rule_domain || candidate.ends_with(&format!(".{rule_domain}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(domain: &str) -> SdkRule {
        SdkRule {
            domain: domain.into(),
            category: "analytics".into(),
            sub_category: None,
            provider: None,
            confidence: 0.9,
            priority: 1,
            status: SdkRuleStatus::Active,
            source: SdkRuleSource::Builtin,
            discover_count: 0,
            first_seen_task_id: None,
        }
    }

    #[test]
    fn matches_exact_domain() {
        assert!(rule("google-analytics.com").matches("google-analytics.com"));
    }

    #[test]
    fn matches_subdomain_but_not_unrelated_domain() {
        let r = rule("doubleclick.net");
        assert!(r.matches("stats.doubleclick.net"));
        assert!(!r.matches("notdoubleclick.net"));
        assert!(!r.matches("doubleclick.net.evil.com"));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let mut r = rule("doubleclick.net");
        r.status = SdkRuleStatus::Disabled;
        assert!(!r.matches("doubleclick.net"));
    }
}
