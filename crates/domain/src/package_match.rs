// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Package-name / APK-filename matching against a registrable domain's main
//! label.

use std::collections::HashSet;

/// Built-in common-words set, used when the caller supplies an empty one.
/// Labels this generic carry no signal about which domain a package or APK
/// filename actually belongs to, so they're filtered out before comparison.
const GENERIC_LABELS: &[&str] = &[
    "www", "com", "net", "org", "app", "apps", "mobile", "android", "ios",
    "service", "services", "inc", "ltd", "co", "group", "tech", "technology",
    "technologies", "the", "official", "global",
];

const FILE_EXTENSION_LABELS: &[&str] = &["apk", "png", "jpg", "jpeg", "xapk"];

pub fn default_common_words() -> HashSet<String> {
    GENERIC_LABELS.iter().map(|s| s.to_string()).collect()
}

/// The first label of a registrable domain, e.g. `shop` for `shop.com`.
pub fn main_label(registrable_domain: &str) -> &str {
    registrable_domain.split('.').next().unwrap_or(registrable_domain)
}

fn is_meaningful(token: &str, common_words: &HashSet<String>) -> bool {
    token.len() >= 2 && !common_words.contains(token) && !FILE_EXTENSION_LABELS.contains(&token)
}

fn apk_tokens(apk_filename: &str, common_words: &HashSet<String>) -> Vec<String> {
    apk_filename
        .split(|c: char| c == '_' || c == '-' || c == '.')
        .map(|s| s.to_ascii_lowercase())
        .filter(|s| is_meaningful(s, common_words))
        .collect()
}

fn package_labels(package_name: &str, common_words: &HashSet<String>) -> Vec<String> {
    package_name
        .split('.')
        .map(|s| s.to_ascii_lowercase())
        .filter(|s| is_meaningful(s, common_words))
        .collect()
}

/// Exact match scores 15, mutual containment scores 13.5, otherwise 0.
fn compare(label: &str, token: &str) -> f64 {
    if label == token {
        15.0
    } else if label.contains(token) || token.contains(label) {
        13.5
    } else {
        0.0
    }
}

/// Package-name match score (0, 13.5, or 15) for `domain`'s main label
/// against the APK filename first, then the package name with its last
/// label checked first. `common_words` filters out labels that carry no
/// match signal; pass [`default_common_words`] absent an operator override.
pub fn score(registrable_domain: &str, package_name: &str, apk_filename: &str, common_words: &HashSet<String>) -> f64 {
    let label = main_label(registrable_domain);

    for token in apk_tokens(apk_filename, common_words) {
        let s = compare(label, &token);
        if s > 0.0 {
            return s;
        }
    }
    for token in package_labels(package_name, common_words).iter().rev() {
        let s = compare(label, token);
        if s > 0.0 {
            return s;
        }
    }
    0.0
}

/// Self-recognition override: true if `domain`'s main label
/// mutually contains a label (length >= 3) of either the package name or
/// the APK filename. Bypasses SDK exclusion when true.
pub fn is_app_own_domain(registrable_domain: &str, package_name: &str, apk_filename: &str, common_words: &HashSet<String>) -> bool {
    let label = main_label(registrable_domain);
    if label.len() < 3 {
        return false;
    }
    let candidates = apk_tokens(apk_filename, common_words)
        .into_iter()
        .chain(package_labels(package_name, common_words));
    candidates
        .filter(|t| t.len() >= 3)
        .any(|t| label.contains(&t) || t.contains(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words() -> HashSet<String> {
        default_common_words()
    }

    #[test]
    fn exact_apk_label_scores_fifteen() {
        assert_eq!(score("shop.com", "com.example.other", "shop_v1.apk", &words()), 15.0);
    }

    #[test]
    fn containment_scores_thirteen_point_five() {
        assert_eq!(score("shopmall.com", "com.example.other", "shop_v1.apk", &words()), 13.5);
    }

    #[test]
    fn package_last_label_checked_first() {
        // "shop" is the last package label; it should win even though the
        // domain's main label also loosely matches "example".
        assert_eq!(score("shop.com", "com.example.shop", "unrelated.apk", &words()), 15.0);
    }

    #[test]
    fn no_match_scores_zero() {
        assert_eq!(score("google.com", "com.example.shop", "shop_v1.apk", &words()), 0.0);
    }

    #[test]
    fn self_recognition_requires_three_char_overlap() {
        assert!(is_app_own_domain("shop.com", "com.example.shop", "shop_v1.apk", &words()));
        assert!(!is_app_own_domain("ab.com", "com.example.xy", "xy.apk", &words()));
    }

    #[test]
    fn custom_common_words_filter_an_extra_label() {
        let mut custom = words();
        custom.insert("shop".to_string());
        assert_eq!(score("shop.com", "com.example.shop", "unrelated.apk", &custom), 0.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;

    use proptest::prelude::*;

    fn arb_common_words() -> HashSet<String> {
        default_common_words()
    }

    proptest! {
        #[test]
        fn score_is_always_zero_or_thirteen_five_or_fifteen(
            domain in "[a-z]{2,12}\\.com",
            package in "[a-z]{1,10}(\\.[a-z]{1,10}){1,4}",
            apk in "[a-z0-9_-]{1,20}\\.apk",
        ) {
            let s = score(&domain, &package, &apk, &arb_common_words());
            prop_assert!(s == 0.0 || s == 13.5 || s == 15.0);
        }

        #[test]
        fn exact_main_label_match_always_scores_at_least_thirteen_five(label in "[a-z]{4,10}") {
            let domain = format!("{label}.com");
            let apk_filename = format!("{label}.apk");
            let s = score(&domain, "com.example.other", &apk_filename, &arb_common_words());
            prop_assert_eq!(s, 15.0);
        }

        #[test]
        fn short_main_label_never_triggers_self_recognition(label in "[a-z]{1,2}") {
            prop_assert!(!is_app_own_domain(&format!("{label}.com"), "com.example.other", "other.apk", &arb_common_words()));
        }
    }
}
