// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Primary-Domain Analyzer: a deterministic, pure scoring
//! pipeline over the merged static+dynamic URL corpus.

use packlab_core::SdkRule;
use std::collections::{HashMap, HashSet};

use crate::package_match;
use crate::registrable::{self, Registrable};

const API_MARKERS: &[&str] = &["/api/", "/v1/", "/v2/", "/v3/", "/rest/", "/graphql", "/json"];
const AUTH_MARKERS: &[&str] = &["/login", "/auth", "/oauth", "/token", "/signin", "/sso"];
const CDN_HINTS: &[&str] = &["cdn", "static", "img", "image", "assets", "cache", "resource"];
const EXCLUDED_TLDS: &[&str] = &["org", "edu", "gov", "int", "mil"];

/// Per-domain accumulator built from the merged URL corpus.
#[derive(Debug, Clone, Default)]
struct DomainDetail {
    count: u32,
    paths: HashSet<String>,
    subdomains: HashSet<String>,
    api_marker: bool,
    auth_marker: bool,
}

/// One scored candidate, retained for the selection step and for tests.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub domain: String,
    pub subdomains: Vec<String>,
    pub package_match: f64,
    pub frequency: f64,
    pub path_diversity: f64,
    pub subdomain_count: f64,
    pub api_marker: f64,
    pub auth_marker: f64,
    pub cdn_penalty: f64,
    pub excluded: bool,
}

impl Candidate {
    pub fn total_score(&self) -> f64 {
        if self.excluded {
            return 0.0;
        }
        (self.package_match
            + self.frequency
            + self.path_diversity
            + self.subdomain_count
            + self.api_marker
            + self.auth_marker
            + self.cdn_penalty)
            .max(0.0)
    }
}

/// Result of a complete selection run.
#[derive(Debug, Clone)]
pub struct Selection {
    pub primary_domain: String,
    pub confidence: f64,
    /// Winner plus every one of its sub-hosts, for downstream IP-locality
    /// resolution.
    pub domain_set: Vec<String>,
}

/// Runs the full pipeline: build domain details, score, exclude, select,
/// expand. Returns `None` if no candidate survives.
pub fn analyze(
    dynamic_urls: &[String],
    static_urls: &[String],
    package_name: &str,
    apk_filename: &str,
    sdk_rules: &[SdkRule],
    common_words: &HashSet<String>,
) -> Option<Selection> {
    let details = build_domain_details(dynamic_urls.iter().chain(static_urls.iter()));
    if details.is_empty() {
        return None;
    }

    let max_count = details.values().map(|d| d.count).max().unwrap_or(1).max(1);
    let max_paths = details
        .values()
        .map(|d| d.paths.len())
        .max()
        .unwrap_or(1)
        .max(1);
    let max_subdomains = details
        .values()
        .map(|d| d.subdomains.len())
        .max()
        .unwrap_or(1)
        .max(1);

    let mut candidates: Vec<Candidate> = details
        .into_iter()
        .map(|(domain, detail)| {
            score_candidate(
                &domain,
                &detail,
                package_name,
                apk_filename,
                sdk_rules,
                common_words,
                max_count,
                max_paths,
                max_subdomains,
            )
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.total_score()
            .partial_cmp(&a.total_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let winner = candidates.into_iter().find(|c| !c.excluded)?;
    let total = winner.total_score();
    let confidence = if winner.package_match > 0.0 {
        total / 40.0
    } else {
        total / 25.0
    }
    .min(1.0);

    let mut domain_set = vec![winner.domain.clone()];
    domain_set.extend(winner.subdomains.iter().cloned());

    Some(Selection {
        primary_domain: winner.domain,
        confidence,
        domain_set,
    })
}

fn build_domain_details<'a>(urls: impl Iterator<Item = &'a String>) -> HashMap<String, DomainDetail> {
    let mut details: HashMap<String, DomainDetail> = HashMap::new();
    for url in urls {
        let Some((host, path)) = split_host_path(url) else {
            continue;
        };
        let Some(Registrable { domain, is_subdomain }) = registrable::extract(&host) else {
            continue;
        };
        let entry = details.entry(domain).or_default();
        entry.count += 1;
        entry.paths.insert(path);
        if is_subdomain {
            entry.subdomains.insert(host);
        }
        let lower = url.to_ascii_lowercase();
        if API_MARKERS.iter().any(|m| lower.contains(m)) {
            entry.api_marker = true;
        }
        if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
            entry.auth_marker = true;
        }
    }
    details
}

/// Splits a URL into `(host, path)` without a full URL-parsing dependency;
/// the corpus here is always `scheme://host[:port][/path]`.
fn split_host_path(url: &str) -> Option<(String, String)> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = authority.split(':').next().unwrap_or(authority);
    if host.is_empty() {
        return None;
    }
    Some((host.to_ascii_lowercase(), format!("/{path}")))
}

#[allow(clippy::too_many_arguments)]
fn score_candidate(
    domain: &str,
    detail: &DomainDetail,
    package_name: &str,
    apk_filename: &str,
    sdk_rules: &[SdkRule],
    common_words: &HashSet<String>,
    max_count: u32,
    max_paths: usize,
    max_subdomains: usize,
) -> Candidate {
    let package_match = package_match::score(domain, package_name, apk_filename, common_words);
    let frequency = detail.count as f64 / max_count as f64 * 8.0;
    let path_diversity = detail.paths.len() as f64 / max_paths as f64 * 5.0;
    let subdomain_count = detail.subdomains.len() as f64 / max_subdomains as f64 * 4.0;
    let api_marker = if detail.api_marker { 5.0 } else { 0.0 };
    let auth_marker = if detail.auth_marker { 3.0 } else { 0.0 };
    let cdn_penalty = if CDN_HINTS.iter().any(|h| domain.contains(h)) {
        -2.0
    } else {
        0.0
    };

    let self_owned = package_match::is_app_own_domain(domain, package_name, apk_filename, common_words);
    let tld = domain.rsplit('.').next().unwrap_or("");
    let tld_excluded = EXCLUDED_TLDS.contains(&tld);
    let sdk_excluded = !self_owned && sdk_rules.iter().any(|r| r.matches(domain));
    let excluded = tld_excluded || sdk_excluded;

    Candidate {
        domain: domain.to_string(),
        subdomains: detail.subdomains.iter().cloned().collect(),
        package_match,
        frequency,
        path_diversity,
        subdomain_count,
        api_marker,
        auth_marker,
        cdn_penalty: if self_owned { 0.0 } else { cdn_penalty },
        excluded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packlab_core::{SdkRuleSource, SdkRuleStatus};

    fn sdk_rule(domain: &str) -> SdkRule {
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

    fn words() -> HashSet<String> {
        package_match::default_common_words()
    }

    #[test]
    fn own_domain_beats_sdk_and_cdn_candidates() {
        let dynamic = vec![
            "https://api.shop.com/v1/x".to_string(),
            "https://api.shop.com/login".to_string(),
            "https://cdn.shop.com/a.css".to_string(),
        ];
        let static_urls = vec!["https://analytics.google.com/t".to_string()];
        let rules = vec![sdk_rule("google.com")];

        let selection = analyze(
            &dynamic,
            &static_urls,
            "com.example.shop",
            "shop_v1.apk",
            &rules,
            &words(),
        )
        .expect("a candidate should win");

        assert_eq!(selection.primary_domain, "shop.com");
        assert!(selection.confidence >= 0.8);
        assert!(selection.domain_set.contains(&"cdn.shop.com".to_string()));
        assert!(!selection.domain_set.contains(&"google.com".to_string()));
    }

    #[test]
    fn empty_corpus_yields_no_selection() {
        assert!(analyze(&[], &[], "com.example.shop", "shop_v1.apk", &[], &words()).is_none());
    }

    #[test]
    fn excluded_tld_is_never_selected() {
        let urls = vec!["https://shop.org/home".to_string()];
        assert!(analyze(&urls, &[], "com.example.shop", "shop_v1.apk", &[], &words()).is_none());
    }

    #[test]
    fn self_recognition_overrides_sdk_exclusion() {
        let urls = vec!["https://shop.com/api/v1/ping".to_string()];
        let rules = vec![sdk_rule("shop.com")];
        let selection = analyze(&urls, &[], "com.example.shop", "shop_v1.apk", &rules, &words())
            .expect("self-recognized domain should still be selected");
        assert_eq!(selection.primary_domain, "shop.com");
    }

    #[test]
    fn candidate_monotonicity_more_urls_never_decreases_score() {
        let base = vec!["https://shop.com/a".to_string()];
        let more = vec![
            "https://shop.com/a".to_string(),
            "https://shop.com/b".to_string(),
            "https://shop.com/c".to_string(),
        ];
        let before = analyze(&base, &[], "com.example.shop", "shop_v1.apk", &[], &words()).unwrap();
        let after = analyze(&more, &[], "com.example.shop", "shop_v1.apk", &[], &words()).unwrap();
        assert!(after.confidence >= before.confidence);
    }
}
