// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registrable-domain extraction: turns a URL host into
//! the domain that is actually registered, collapsing everything below it
//! into a subdomain.

/// Second-level TLDs under which the registrable domain is three labels,
/// not two (e.g. `shop.com.cn`, not `com.cn`). Hard-coded;
/// not exhaustive, but covers the common cases a mobile-app's own traffic
/// and its third-party SDKs are likely to use.
const SECOND_LEVEL_TLDS: &[&str] = &[
    "com.cn", "net.cn", "org.cn", "gov.cn", "edu.cn",
    "co.uk", "org.uk", "me.uk",
    "co.jp", "ne.jp", "or.jp",
    "com.au", "net.au", "org.au",
    "com.br", "com.tw", "com.hk", "co.kr", "co.in", "com.sg",
];

/// Labels that are plausible final path segments of a URL but are not valid
/// TLDs (the host parser may see `foo.png` style junk from malformed flow
/// capture). Rejecting these avoids minting bogus registrable domains.
const FILE_EXTENSION_LABELS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "css", "js", "json", "html", "htm", "php",
    "png", "ico", "svg", "woff", "woff2", "ttf", "map", "txt", "xml",
];

/// A host accepted by [`extract`]: either a registrable domain (DNS name)
/// or a bare public IPv4/IPv6 literal kept as its own "domain".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registrable {
    /// The registrable domain (e.g. `shop.com`) or the bare IP literal.
    pub domain: String,
    /// True if every label of `domain` beyond the registrable suffix was
    /// stripped, i.e. `host != domain` — this host is itself a subdomain.
    pub is_subdomain: bool,
}

/// Parses `host` (already lowercased, no port) into a [`Registrable`], or
/// `None` if the host must be rejected: empty, leading
/// dot, a TLD equal to a known file-extension label, or a private-range
/// IPv4 address (RFC1918, including `127/8`).
pub fn extract(host: &str) -> Option<Registrable> {
    let host = host.trim();
    if host.is_empty() || host.starts_with('.') {
        return None;
    }

    if let Some(ip) = parse_ipv4(host) {
        if is_private_ipv4(ip) {
            return None;
        }
        return Some(Registrable {
            domain: host.to_string(),
            is_subdomain: false,
        });
    }
    if host.contains(':') {
        // IPv6 literal (no RFC1918-equivalent filtering attempted; spec
        // only calls out IPv4 private ranges).
        return Some(Registrable {
            domain: host.to_string(),
            is_subdomain: false,
        });
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    let last = labels[labels.len() - 1];
    if FILE_EXTENSION_LABELS.contains(&last) {
        return None;
    }

    let suffix_len = second_level_suffix_len(&labels).unwrap_or(1);
    let registrable_len = suffix_len + 1;
    if labels.len() < registrable_len {
        return None;
    }
    let registrable = labels[labels.len() - registrable_len..].join(".");
    Some(Registrable {
        domain: registrable.clone(),
        is_subdomain: registrable != host,
    })
}

/// Returns the suffix label count (2 for `com.cn`, 1 for a plain `com`) if
/// the host's last two labels form a known second-level TLD.
fn second_level_suffix_len(labels: &[&str]) -> Option<usize> {
    if labels.len() < 2 {
        return None;
    }
    let candidate = format!("{}.{}", labels[labels.len() - 2], labels[labels.len() - 1]);
    SECOND_LEVEL_TLDS.contains(&candidate.as_str()).then_some(2)
}

fn parse_ipv4(host: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    for (i, part) in parts.iter().enumerate() {
        octets[i] = part.parse::<u8>().ok()?;
    }
    Some(octets)
}

/// RFC1918 private ranges plus loopback (`127/8`).
fn is_private_ipv4(octets: [u8; 4]) -> bool {
    match octets {
        [10, ..] => true,
        [127, ..] => true,
        [172, b, ..] if (16..=31).contains(&b) => true,
        [192, 168, ..] => true,
        [169, 254, ..] => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_two_label_host_is_its_own_registrable_domain() {
        let r = extract("shop.com").unwrap();
        assert_eq!(r.domain, "shop.com");
        assert!(!r.is_subdomain);
    }

    #[test]
    fn subdomain_collapses_to_registrable_domain() {
        let r = extract("api.shop.com").unwrap();
        assert_eq!(r.domain, "shop.com");
        assert!(r.is_subdomain);
    }

    #[test]
    fn second_level_tld_keeps_three_labels() {
        let r = extract("mall.shop.com.cn").unwrap();
        assert_eq!(r.domain, "shop.com.cn");
        assert!(r.is_subdomain);

        let r2 = extract("shop.com.cn").unwrap();
        assert_eq!(r2.domain, "shop.com.cn");
        assert!(!r2.is_subdomain);
    }

    #[test]
    fn rejects_private_and_loopback_ipv4() {
        assert!(extract("10.0.0.1").is_none());
        assert!(extract("192.168.1.1").is_none());
        assert!(extract("127.0.0.1").is_none());
        assert!(extract("172.16.0.5").is_none());
    }

    #[test]
    fn keeps_public_ipv4_as_bare_domain() {
        let r = extract("8.8.8.8").unwrap();
        assert_eq!(r.domain, "8.8.8.8");
        assert!(!r.is_subdomain);
    }

    #[test]
    fn rejects_empty_and_leading_dot_hosts() {
        assert!(extract("").is_none());
        assert!(extract(".shop.com").is_none());
    }

    #[test]
    fn rejects_file_extension_tld() {
        assert!(extract("thing.png").is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn extract_never_panics(host in "[a-z0-9.:-]{0,60}") {
            let _ = extract(&host);
        }

        #[test]
        fn accepted_domain_is_always_a_suffix_of_the_host(
            label in "[a-z]{1,10}", sub in "[a-z]{1,10}"
        ) {
            let host = format!("{sub}.{label}.com");
            if let Some(r) = extract(&host) {
                prop_assert!(host == r.domain || host.ends_with(&format!(".{}", r.domain)));
            }
        }

        #[test]
        fn two_label_com_host_is_its_own_registrable_domain(label in "[a-z]{1,15}") {
            let host = format!("{label}.com");
            let r = extract(&host).unwrap();
            prop_assert_eq!(r.domain, host);
            prop_assert!(!r.is_subdomain);
        }

        #[test]
        fn private_ipv4_octets_are_always_rejected(b in 0u8..=255, c in 0u8..=255, d in 0u8..=255) {
            prop_assert!(extract(&format!("10.{b}.{c}.{d}")).is_none());
            prop_assert!(extract(&format!("192.168.{c}.{d}")).is_none());
            prop_assert!(extract(&format!("127.{b}.{c}.{d}")).is_none());
        }
    }
}
