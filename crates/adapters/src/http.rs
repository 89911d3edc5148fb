// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP clients for the two external services domain analysis depends on:
//! the IP-locality API (primary + secondary) and the registration-lookup
//! ("beian") API.

use packlab_core::{RegistrationEntry, RegistrationResult};
use serde::Deserialize;
use std::time::Duration;

use crate::env;
use crate::error::{AdapterError, Result};

const RATE_LIMIT_MARKER: &str = "访问过于频繁";
const RATE_LIMIT_SLEEP: Duration = Duration::from_secs(3);
const RATE_LIMIT_MAX_ATTEMPTS: u32 = 3;

/// One IP-locality result.
#[derive(Debug, Clone, Default)]
pub struct LocalityRecord {
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub isp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LocalityApiConfig {
    pub primary_url: String,
    pub secondary_url: String,
    pub token: String,
}

/// Queries the primary locality API, falling back to secondary on failure,
/// retrying the primary up to [`RATE_LIMIT_MAX_ATTEMPTS`] times on the
/// rate-limit marker.
pub struct LocalityClient {
    http: reqwest::Client,
    config: LocalityApiConfig,
}

impl LocalityClient {
    pub fn new(config: LocalityApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(env::locality_api_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub async fn lookup(&self, ip: &str) -> Result<LocalityRecord> {
        match self.query(&self.config.primary_url, ip).await {
            Ok(record) => Ok(record),
            Err(err) => {
                tracing::warn!(ip, error = %err, "primary locality api failed, falling back");
                self.query(&self.config.secondary_url, ip).await
            }
        }
    }

    async fn query(&self, base_url: &str, ip: &str) -> Result<LocalityRecord> {
        for attempt in 1..=RATE_LIMIT_MAX_ATTEMPTS {
            let resp = self
                .http
                .get(base_url)
                .query(&[("ip", ip)])
                .header("token", &self.config.token)
                .send()
                .await?;
            let body = resp.text().await?;
            if body.contains(RATE_LIMIT_MARKER) {
                if attempt == RATE_LIMIT_MAX_ATTEMPTS {
                    return Err(AdapterError::RateLimited);
                }
                tokio::time::sleep(RATE_LIMIT_SLEEP).await;
                continue;
            }
            return parse_locality_body(&body);
        }
        Err(AdapterError::RateLimited)
    }
}

/// Strips an optional JSONP wrapper (`callback({...})`) before parsing.
fn unwrap_jsonp(body: &str) -> &str {
    let trimmed = body.trim();
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(open), Some(close)) if open < close && !trimmed.starts_with('{') => {
            &trimmed[open + 1..close]
        }
        _ => trimmed,
    }
}

#[derive(Debug, Deserialize)]
struct LocalityApiResponse {
    ret: i64,
    data: Vec<String>,
}

fn parse_locality_body(body: &str) -> Result<LocalityRecord> {
    let json = unwrap_jsonp(body);
    let parsed: LocalityApiResponse = serde_json::from_str(json)
        .map_err(|e| AdapterError::BadResponse(format!("locality api: {e}")))?;
    if parsed.ret != 0 && parsed.data.is_empty() {
        return Err(AdapterError::BadResponse(format!(
            "locality api returned ret={}",
            parsed.ret
        )));
    }
    let get = |i: usize| parsed.data.get(i).filter(|s| !s.is_empty()).cloned();
    Ok(LocalityRecord {
        country: get(0),
        province: get(1),
        city: get(2),
        district: get(3),
        isp: get(4),
    })
}

#[derive(Debug, Clone)]
pub struct RegistrationApiConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_version: String,
}

#[derive(Debug, Deserialize)]
struct RegistrationApiResponse {
    #[serde(rename = "StateCode")]
    state_code: i32,
    #[serde(rename = "Reason")]
    reason: Option<String>,
    #[serde(rename = "Result")]
    result: Option<RegistrationApiResult>,
}

#[derive(Debug, Deserialize)]
struct RegistrationApiResult {
    #[serde(rename = "List")]
    list: Vec<RegistrationApiEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistrationApiEntry {
    #[serde(rename = "ServiceLicence")]
    service_licence: String,
    #[serde(rename = "UnitName")]
    unit_name: String,
}

pub struct RegistrationClient {
    http: reqwest::Client,
    config: RegistrationApiConfig,
}

impl RegistrationClient {
    pub fn new(config: RegistrationApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(env::registration_api_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    pub async fn lookup(&self, app_name: &str) -> Result<RegistrationResult> {
        let resp = self
            .http
            .get(&self.config.api_url)
            .query(&[
                ("keyword", app_name),
                ("page", "1"),
                ("APIKey", self.config.api_key.as_str()),
                ("ChinazVer", self.config.api_version.as_str()),
            ])
            .send()
            .await?;
        let parsed: RegistrationApiResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::BadResponse(format!("registration api: {e}")))?;

        match parsed.state_code {
            1 => {
                let list = parsed.result.map(|r| r.list).unwrap_or_default();
                if list.is_empty() {
                    Ok(RegistrationResult::NotRegistered)
                } else {
                    Ok(RegistrationResult::Registered(
                        list.into_iter()
                            .map(|e| RegistrationEntry {
                                service_licence: e.service_licence,
                                unit_name: e.unit_name,
                            })
                            .collect(),
                    ))
                }
            }
            _ => Ok(RegistrationResult::Unknown {
                reason: parsed.reason.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_jsonp_callback() {
        let body = r#"jsonpCallback({"ret":0,"data":["CN","Guangdong","Shenzhen","Nanshan","China Telecom"]})"#;
        let record = parse_locality_body(body).unwrap();
        assert_eq!(record.province.as_deref(), Some("Guangdong"));
        assert_eq!(record.isp.as_deref(), Some("China Telecom"));
    }

    #[test]
    fn plain_json_without_jsonp_parses() {
        let body = r#"{"ret":0,"data":["CN","","Shenzhen","",""]}"#;
        let record = parse_locality_body(body).unwrap();
        assert_eq!(record.country.as_deref(), Some("CN"));
        assert_eq!(record.province, None);
        assert_eq!(record.city.as_deref(), Some("Shenzhen"));
    }

    #[test]
    fn rate_limit_marker_detected() {
        let body = "访问过于频繁，请稍后再试";
        assert!(body.contains(RATE_LIMIT_MARKER));
    }
}
