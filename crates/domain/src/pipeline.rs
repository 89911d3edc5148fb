// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ties the primary-domain analyzer and the locality/registration lookup
//! together into the single post-capture step the orchestrator invokes:
//! analyze, resolve, look up registration, persist.

use std::collections::HashSet;

use packlab_core::{SdkRule, TaskId};
use packlab_storage::TaskRepository;

use crate::analyzer;
use crate::locality::{build_domain_analysis, LocalityLookup};
use crate::Result;

/// Runs the full domain-analysis step and persists the result. Errors here
/// are surfaced to the caller but are non-fatal to the task's own
/// completion.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    repo: &dyn TaskRepository,
    lookup: &LocalityLookup<'_>,
    task_id: &TaskId,
    dynamic_urls: &[String],
    static_urls: &[String],
    package_name: &str,
    apk_filename: &str,
    app_name: &str,
    sdk_rules: &[SdkRule],
    common_words: &HashSet<String>,
) -> Result<()> {
    let selection = analyzer::analyze(dynamic_urls, static_urls, package_name, apk_filename, sdk_rules, common_words);

    let domain_set = selection
        .as_ref()
        .map(|s| s.domain_set.clone())
        .unwrap_or_default();
    let app_domains = lookup.resolve_domains(task_id, &domain_set).await;
    let registration = lookup.lookup_registration(app_name).await;

    let analysis = build_domain_analysis(task_id.clone(), selection, registration, app_domains);
    repo.save_domain_analysis(analysis).await?;
    Ok(())
}
