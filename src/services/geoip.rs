//! IP geolocation service
//!
//! Best-effort lookups against free geolocation APIs with a database-backed
//! cache. A lookup failure never propagates: callers always get a map and
//! unresolved entries stay `None`.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::GeoipConfig;
use crate::db::IpCacheRepository;
use crate::utils::net::is_private_ip_str;

const PRIVATE_LOCATION: &str = "本地/内网";

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpApiCoResponse {
    error: Option<serde_json::Value>,
    country_name: Option<String>,
    region: Option<String>,
    city: Option<String>,
}

/// Geolocation lookup with caching and a bounded external-call budget.
pub struct GeoipService {
    pool: SqlitePool,
    config: GeoipConfig,
    client: reqwest::Client,
    primary_base: String,
    fallback_base: String,
}

impl GeoipService {
    pub fn new(pool: SqlitePool, config: GeoipConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(StdDuration::from_secs(config.connect_timeout_secs))
            .timeout(StdDuration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            pool,
            config,
            client,
            primary_base: "http://ip-api.com".to_string(),
            fallback_base: "https://ipapi.co".to_string(),
        })
    }

    /// Override the lookup endpoints; used by tests to point at a mock server.
    pub fn with_sources(mut self, primary_base: String, fallback_base: String) -> Self {
        self.primary_base = primary_base;
        self.fallback_base = fallback_base;
        self
    }

    /// Resolve locations for a batch of IPs.
    ///
    /// Cache hits are free; at most `max_lookups_per_batch` IPs go out to the
    /// external sources, with a short delay between consecutive calls.
    /// Unresolvable entries map to `None`.
    pub async fn resolve_batch(&self, ips: &[String]) -> HashMap<String, Option<String>> {
        let mut result: HashMap<String, Option<String>> = HashMap::new();
        let cache = IpCacheRepository::new(&self.pool);
        let freshness_cutoff = Utc::now() - Duration::days(self.config.cache_ttl_days);
        let mut external_calls = 0usize;

        for ip in ips {
            if result.contains_key(ip) {
                continue;
            }

            if ip.is_empty() || ip == "-" {
                result.insert(ip.clone(), Some("-".to_string()));
                continue;
            }

            // Fresh cache entry wins; a stale one is kept as a fallback in
            // case the budget runs out before this IP is re-queried.
            let mut stale_location = None;
            match cache.get(ip).await {
                Ok(Some(cached)) => {
                    if cached.updated_at > freshness_cutoff {
                        result.insert(ip.clone(), Some(cached.location));
                        continue;
                    }
                    stale_location = Some(cached.location);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(ip = %ip, error = %e, "IP location cache read failed");
                }
            }

            match is_private_ip_str(ip) {
                Some(true) => {
                    // Internal address, nothing to look up
                    if let Err(e) = cache.upsert(ip, PRIVATE_LOCATION).await {
                        warn!(ip = %ip, error = %e, "IP location cache write failed");
                    }
                    result.insert(ip.clone(), Some(PRIVATE_LOCATION.to_string()));
                    continue;
                }
                None => {
                    result.insert(ip.clone(), None);
                    continue;
                }
                Some(false) => {}
            }

            if !self.config.enabled || external_calls >= self.config.max_lookups_per_batch {
                result.insert(ip.clone(), stale_location);
                continue;
            }

            if external_calls > 0 {
                tokio::time::sleep(StdDuration::from_millis(self.config.lookup_delay_ms)).await;
            }
            external_calls += 1;

            match self.query_location(ip).await {
                Some(location) => {
                    if let Err(e) = cache.upsert(ip, &location).await {
                        warn!(ip = %ip, error = %e, "IP location cache write failed");
                    }
                    result.insert(ip.clone(), Some(location));
                }
                None => {
                    result.insert(ip.clone(), stale_location);
                }
            }
        }

        result
    }

    /// Query the external sources in order; first structured success wins.
    async fn query_location(&self, ip: &str) -> Option<String> {
        if let Some(location) = self.query_ip_api(ip).await {
            return Some(location);
        }
        self.query_ipapi_co(ip).await
    }

    async fn query_ip_api(&self, ip: &str) -> Option<String> {
        let url = format!(
            "{}/json/{}?lang=zh-CN&fields=status,message,country,regionName,city",
            self.primary_base, ip
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(ip = %ip, status = %r.status(), "ip-api.com returned non-success");
                return None;
            }
            Err(e) => {
                debug!(ip = %ip, error = %e, "ip-api.com request failed");
                return None;
            }
        };

        let data: IpApiResponse = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                debug!(ip = %ip, error = %e, "ip-api.com response unparseable");
                return None;
            }
        };

        if data.status != "success" {
            return None;
        }
        join_parts(&[data.country, data.region_name, data.city])
    }

    async fn query_ipapi_co(&self, ip: &str) -> Option<String> {
        let url = format!("{}/{}/json/", self.fallback_base, ip);
        let response = match self
            .client
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(ip = %ip, status = %r.status(), "ipapi.co returned non-success");
                return None;
            }
            Err(e) => {
                debug!(ip = %ip, error = %e, "ipapi.co request failed");
                return None;
            }
        };

        let data: IpApiCoResponse = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                debug!(ip = %ip, error = %e, "ipapi.co response unparseable");
                return None;
            }
        };

        if data.error.is_some() {
            return None;
        }
        join_parts(&[data.country_name, data.region, data.city])
    }

    /// Drop cache entries past the freshness window.
    pub async fn purge_stale(&self) -> u64 {
        let cache = IpCacheRepository::new(&self.pool);
        match cache.purge_stale(self.config.cache_ttl_days).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "IP location cache purge failed");
                0
            }
        }
    }
}

/// Concatenate the non-empty location parts, matching the upstream format
/// (e.g. "中国浙江省杭州市").
fn join_parts(parts: &[Option<String>; 3]) -> Option<String> {
    let joined: String = parts
        .iter()
        .filter_map(|p| p.as_deref())
        .filter(|p| !p.is_empty())
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
