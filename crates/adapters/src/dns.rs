// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-resolver DNS lookup: every candidate domain is resolved against at
//! least two upstream resolvers so IP-locality results can be attributed
//! per carrier.

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

use crate::error::Result;

/// One upstream resolver, named for the carrier it is meant to represent
///. The identity of the
/// resolvers backing each name is configurable, not hard-coded.
#[derive(Debug, Clone)]
pub struct NamedResolver {
    pub name: String,
    pub resolver: TokioAsyncResolver,
}

/// One `(domain, ip, resolver_name)` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIp {
    pub domain: String,
    pub ip: String,
    pub resolver_name: String,
}

/// Resolves a batch of domains against every configured upstream, emitting
/// one result per `(domain, ip, resolver)` triple.
pub struct MultiResolver {
    resolvers: Vec<NamedResolver>,
}

impl MultiResolver {
    pub fn new(resolvers: Vec<NamedResolver>) -> Self {
        Self { resolvers }
    }

    /// Builds a resolver for a single upstream IP, e.g. `"114.114.114.114"`.
    pub fn named_resolver(name: &str, upstream_ip: std::net::IpAddr) -> Result<NamedResolver> {
        let group = NameServerConfigGroup::from_ips_clear(&[upstream_ip], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
        Ok(NamedResolver {
            name: name.to_string(),
            resolver,
        })
    }

    pub async fn resolve_all(&self, domain: &str) -> Vec<ResolvedIp> {
        let mut out = Vec::new();
        for named in &self.resolvers {
            match named.resolver.lookup_ip(domain).await {
                Ok(lookup) => {
                    for ip in lookup.iter() {
                        out.push(ResolvedIp {
                            domain: domain.to_string(),
                            ip: ip.to_string(),
                            resolver_name: named.name.clone(),
                        });
                    }
                }
                Err(err) => {
                    tracing::warn!(domain, resolver = %named.name, error = %err, "dns lookup failed");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_ip_carries_resolver_identity() {
        let r = ResolvedIp {
            domain: "shop.com".into(),
            ip: "1.2.3.4".into(),
            resolver_name: "telecom".into(),
        };
        assert_eq!(r.resolver_name, "telecom");
    }
}
