// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IP-Locality & Registration Lookup orchestration: resolves
//! every domain in a [`crate::analyzer::Selection`]'s domain set against
//! multiple resolvers, queries locality for each unique IP (cached, bulk
//! rate-limited), looks up app registration once, and persists the result.

use packlab_adapters::{LocalityClient, MultiResolver, RegistrationClient};
use packlab_core::{AppDomainRow, DomainAnalysis, LocalitySource, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Sleep between per-IP locality lookups to avoid upstream throttling.
const BULK_LOOKUP_SLEEP: Duration = Duration::from_millis(500);

/// Process-lifetime cache of locality results keyed by IP string.
#[derive(Default)]
pub struct LocalityCache {
    entries: Mutex<HashMap<String, (Option<packlab_adapters::LocalityRecord>, LocalitySource)>>,
}

impl LocalityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, ip: &str) -> Option<(Option<packlab_adapters::LocalityRecord>, LocalitySource)> {
        self.entries.lock().get(ip).cloned()
    }

    fn insert(
        &self,
        ip: String,
        record: Option<packlab_adapters::LocalityRecord>,
        source: LocalitySource,
    ) {
        self.entries.lock().insert(ip, (record, source));
    }
}

/// Wires DNS resolution, the locality client, and the registration client
/// into a single per-task lookup.
pub struct LocalityLookup<'a> {
    pub resolver: &'a MultiResolver,
    pub locality: &'a LocalityClient,
    pub registration: &'a RegistrationClient,
    pub cache: &'a LocalityCache,
}

impl<'a> LocalityLookup<'a> {
    /// Resolves `domain_set`, queries locality for every unique IP, and
    /// returns the `task_app_domains` rows.
    pub async fn resolve_domains(&self, task_id: &TaskId, domain_set: &[String]) -> Vec<AppDomainRow> {
        let mut rows = Vec::new();
        for domain in domain_set {
            let resolved = self.resolver.resolve_all(domain).await;
            if resolved.is_empty() {
                rows.push(AppDomainRow {
                    task_id: task_id.clone(),
                    domain: domain.clone(),
                    ip: String::new(),
                    province: None,
                    city: None,
                    isp: None,
                    source: LocalitySource::Unresolved,
                });
                continue;
            }
            for resolved_ip in resolved {
                let (record, source) = self.locality_for_ip(&resolved_ip.ip).await;
                rows.push(AppDomainRow {
                    task_id: task_id.clone(),
                    domain: domain.clone(),
                    ip: resolved_ip.ip,
                    province: record.as_ref().and_then(|r| r.province.clone()),
                    city: record.as_ref().and_then(|r| r.city.clone()),
                    isp: record.as_ref().and_then(|r| r.isp.clone()),
                    source,
                });
                tokio::time::sleep(BULK_LOOKUP_SLEEP).await;
            }
        }
        rows
    }

    async fn locality_for_ip(
        &self,
        ip: &str,
    ) -> (Option<packlab_adapters::LocalityRecord>, LocalitySource) {
        if let Some(cached) = self.cache.get(ip) {
            return cached;
        }
        let (record, source) = match self.locality.lookup(ip).await {
            Ok(record) => (Some(record), LocalitySource::Primary),
            Err(err) => {
                tracing::warn!(ip, error = %err, "ip locality lookup failed");
                (None, LocalitySource::Unresolved)
            }
        };
        self.cache.insert(ip.to_string(), record.clone(), source);
        (record, source)
    }

    /// Registration lookup for the task's app identity. Non-fatal on failure: callers persist
    /// [`packlab_core::RegistrationResult::Unknown`] rather than aborting.
    pub async fn lookup_registration(
        &self,
        app_name: &str,
    ) -> packlab_core::RegistrationResult {
        match self.registration.lookup(app_name).await {
            Ok(result) => result,
            Err(err) => packlab_core::RegistrationResult::Unknown {
                reason: err.to_string(),
            },
        }
    }
}

/// Assembles the `task_domain_analysis` row from a selection plus the
/// locality/registration results, ready for [`packlab_storage`] persistence.
pub fn build_domain_analysis(
    task_id: TaskId,
    selection: Option<crate::analyzer::Selection>,
    registration: packlab_core::RegistrationResult,
    app_domains: Vec<AppDomainRow>,
) -> DomainAnalysis {
    match selection {
        Some(s) => DomainAnalysis {
            task_id,
            primary_domain: Some(s.primary_domain),
            confidence: s.confidence,
            domain_set: s.domain_set,
            registration: Some(registration),
            app_domains,
        },
        None => DomainAnalysis {
            task_id,
            primary_domain: None,
            confidence: 0.0,
            domain_set: Vec::new(),
            registration: Some(registration),
            app_domains,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_returns_prior_insert_without_another_lookup() {
        let cache = LocalityCache::new();
        assert!(cache.get("1.2.3.4").is_none());
        let record = packlab_adapters::LocalityRecord {
            country: Some("CN".into()),
            province: Some("Guangdong".into()),
            city: None,
            district: None,
            isp: None,
        };
        cache.insert("1.2.3.4".into(), Some(record), LocalitySource::Primary);
        let (cached, source) = cache.get("1.2.3.4").unwrap();
        assert_eq!(source, LocalitySource::Primary);
        assert_eq!(cached.unwrap().province.as_deref(), Some("Guangdong"));
    }

    #[test]
    fn build_domain_analysis_without_selection_has_no_primary_domain() {
        let analysis = build_domain_analysis(
            TaskId::new("t1"),
            None,
            packlab_core::RegistrationResult::NotRegistered,
            Vec::new(),
        );
        assert!(analysis.primary_domain.is_none());
        assert_eq!(analysis.confidence, 0.0);
    }
}
