// Copyright 2025 Alejandro Martínez Corriá and the Thinkube contributors
// SPDX-License-Identifier: Apache-2.0

use crate::cache::{CachedResponse, ResponseStore};
use crate::error::{BadgeError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_REGISTRY_URL: &str = "https://thunderstore.io";

/// Package metrics as reported by the registry.
///
/// Missing or null fields become `0` downloads, a `0.0` rating and an
/// `"unknown"` version.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(from = "RawMetrics")]
pub struct MetricsRecord {
    pub downloads: u64,
    pub rating_score: f64,
    pub latest_version: String,
}

#[derive(Deserialize)]
struct RawMetrics {
    downloads: Option<serde_json::Number>,
    rating_score: Option<f64>,
    latest_version: Option<String>,
}

/// Whole download count; fractional values truncate and negatives clamp to 0.
fn download_count(number: &serde_json::Number) -> u64 {
    number
        .as_u64()
        .or_else(|| number.as_f64().map(|f| if f > 0.0 { f as u64 } else { 0 }))
        .unwrap_or(0)
}

impl From<RawMetrics> for MetricsRecord {
    fn from(raw: RawMetrics) -> Self {
        Self {
            downloads: raw.downloads.as_ref().map(download_count).unwrap_or(0),
            rating_score: raw.rating_score.unwrap_or(0.0),
            latest_version: raw.latest_version.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// `.` and `..` cannot be sent as literal path segments.
pub fn is_dot_segment(segment: &str) -> bool {
    matches!(segment, "." | "..")
}

/// How long upstream responses stay cached, by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub found_ttl: Duration,
    pub not_found_ttl: Duration,
}

impl CachePolicy {
    pub fn ttl_for_status(&self, status: u16) -> Duration {
        if (200..300).contains(&status) {
            self.found_ttl
        } else {
            self.not_found_ttl
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            found_ttl: Duration::from_secs(600),
            not_found_ttl: Duration::from_secs(300),
        }
    }
}

pub struct MetricsClient {
    client: Client,
    base_url: Url,
    cache: Arc<dyn ResponseStore>,
    policy: CachePolicy,
}

impl MetricsClient {
    pub fn new(
        base_url: impl Into<String>,
        cache: Arc<dyn ResponseStore>,
        policy: CachePolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                "thunderstore-badge/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| BadgeError::InvalidRegistryUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BadgeError::InvalidRegistryUrl(base_url.to_string()));
        }

        Ok(Self {
            client,
            base_url,
            cache,
            policy,
        })
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Builds the metrics URL with `namespace` and `package` each kept as a
    /// single escaped path segment.
    pub fn metrics_url(&self, namespace: &str, package: &str) -> String {
        // `Url` leaves `%` alone, so escape it first or `%2F` would reach the
        // registry unchanged.
        let namespace = namespace.replace('%', "%25");
        let package = package.replace('%', "%25");

        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "api",
                "v1",
                "package-metrics",
                namespace.as_str(),
                package.as_str(),
                "",
            ]);
        }
        url.to_string()
    }

    /// Fetches metrics for a package, serving from the cache when possible.
    ///
    /// A cache miss performs exactly one upstream request. The fresh response
    /// is written to the cache from a detached task, so the write neither
    /// delays this call nor reports failures to it.
    pub async fn fetch_metrics(&self, namespace: &str, package: &str) -> Result<MetricsRecord> {
        if is_dot_segment(namespace) || is_dot_segment(package) {
            return Err(BadgeError::BadRequest(format!(
                "Invalid package path: {}/{}",
                namespace, package
            )));
        }
        let url = self.metrics_url(namespace, package);

        let response = match self.cache.lookup(&url).await {
            Some(cached) => {
                debug!(
                    "Cache hit for {}/{} (cached at {})",
                    namespace, package, cached.cached_at
                );
                cached
            }
            None => {
                info!(namespace, package, "Cache miss");
                let fresh = self.fetch_upstream(&url).await?;
                self.store_detached(url, fresh.clone());
                fresh
            }
        };

        if !response.is_success() {
            debug!(
                "Registry returned status {} for {}/{}",
                response.status, namespace, package
            );
            return Err(BadgeError::PackageNotFound(format!("{}/{}", namespace, package)));
        }

        let record: MetricsRecord = serde_json::from_slice(&response.body)?;
        debug!(
            downloads = record.downloads,
            rating_score = record.rating_score,
            latest_version = %record.latest_version,
            "Metrics for {}/{}",
            namespace,
            package
        );
        Ok(record)
    }

    async fn fetch_upstream(&self, url: &str) -> Result<CachedResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(CachedResponse::new(
            status,
            body,
            self.policy.ttl_for_status(status),
        ))
    }

    fn store_detached(&self, url: String, response: CachedResponse) {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            if let Err(e) = cache.store(url.clone(), response).await {
                warn!("Failed to cache response for {}: {}", url, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{NoopStore, ResponseCache};
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const METRICS_PATH: &str = "/api/v1/package-metrics/riskofrain2/BepInExPack/";

    fn client_for(server: &MockServer, cache: Arc<dyn ResponseStore>) -> MetricsClient {
        MetricsClient::new(
            server.uri(),
            cache,
            CachePolicy::default(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    /// Waits for a detached cache write to land.
    async fn wait_for_entry(cache: &dyn ResponseStore, key: &str) -> CachedResponse {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(entry) = cache.lookup(key).await {
                    return entry;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cache entry was never written")
    }

    #[test]
    fn test_metrics_url() {
        let client = MetricsClient::new(
            "https://thunderstore.io/",
            Arc::new(NoopStore),
            CachePolicy::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.metrics_url("riskofrain2", "BepInExPack"),
            "https://thunderstore.io/api/v1/package-metrics/riskofrain2/BepInExPack/"
        );
    }

    #[test]
    fn test_metrics_url_escapes_segments() {
        let client = MetricsClient::new(
            "https://thunderstore.io",
            Arc::new(NoopStore),
            CachePolicy::default(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.metrics_url("a/../../../evil", "pkg"),
            "https://thunderstore.io/api/v1/package-metrics/a%2F..%2F..%2F..%2Fevil/pkg/"
        );
        assert_eq!(
            client.metrics_url("a%2Fb", "p?q#r"),
            "https://thunderstore.io/api/v1/package-metrics/a%252Fb/p%3Fq%23r/"
        );
    }

    #[test]
    fn test_invalid_registry_url() {
        let result = MetricsClient::new(
            "not a url",
            Arc::new(NoopStore),
            CachePolicy::default(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(BadgeError::InvalidRegistryUrl(_))));
    }

    #[tokio::test]
    async fn test_escaped_slash_stays_inside_metrics_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "latest_version": "1.0.0"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(NoopStore));
        client.fetch_metrics("a/../../../evil", "pkg").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url.path(),
            "/api/v1/package-metrics/a%2F..%2F..%2F..%2Fevil/pkg/"
        );
    }

    #[tokio::test]
    async fn test_dot_segments_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(NoopStore));
        for (namespace, package) in [("..", "pkg"), ("ns", "."), ("..", "..")] {
            let err = client.fetch_metrics(namespace, package).await.unwrap_err();
            assert!(matches!(err, BadgeError::BadRequest(_)));
        }
        server.verify().await;
    }

    #[test]
    fn test_ttl_by_status() {
        let policy = CachePolicy::default();
        assert_eq!(policy.ttl_for_status(200), Duration::from_secs(600));
        assert_eq!(policy.ttl_for_status(404), Duration::from_secs(300));
        assert_eq!(policy.ttl_for_status(500), Duration::from_secs(300));
    }

    #[test]
    fn test_record_defaults() {
        let record: MetricsRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record.downloads, 0);
        assert_eq!(record.rating_score, 0.0);
        assert_eq!(record.latest_version, "unknown");

        let record: MetricsRecord = serde_json::from_str(r#"{"downloads": 45231.0}"#).unwrap();
        assert_eq!(record.downloads, 45231);
        let record: MetricsRecord = serde_json::from_str(r#"{"downloads": 12.9}"#).unwrap();
        assert_eq!(record.downloads, 12);
        let record: MetricsRecord = serde_json::from_str(r#"{"downloads": -5}"#).unwrap();
        assert_eq!(record.downloads, 0);

        let record: MetricsRecord =
            serde_json::from_str(r#"{"downloads": null, "latest_version": null}"#).unwrap();
        assert_eq!(record.downloads, 0);
        assert_eq!(record.latest_version, "unknown");

        let record: MetricsRecord = serde_json::from_str(
            r#"{"downloads": 45231, "rating_score": 12, "latest_version": "5.4.2100"}"#,
        )
        .unwrap();
        assert_eq!(record.downloads, 45231);
        assert_eq!(record.rating_score, 12.0);
        assert_eq!(record.latest_version, "5.4.2100");
    }

    #[tokio::test]
    async fn test_fetch_metrics_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METRICS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "downloads": 45231,
                "rating_score": 3,
                "latest_version": "5.4.2100"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(NoopStore));
        let record = client.fetch_metrics("riskofrain2", "BepInExPack").await.unwrap();
        assert_eq!(record.downloads, 45231);
        assert_eq!(record.latest_version, "5.4.2100");
    }

    #[tokio::test]
    async fn test_fetch_metrics_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/package-metrics/nobody/nothing/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(NoopStore));
        match client.fetch_metrics("nobody", "nothing").await.unwrap_err() {
            BadgeError::PackageNotFound(name) => assert_eq!(name, "nobody/nothing"),
            other => panic!("Expected PackageNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(NoopStore));
        let err = client.fetch_metrics("a", "b").await.unwrap_err();
        assert!(matches!(err, BadgeError::PackageNotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METRICS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(NoopStore));
        let err = client.fetch_metrics("riskofrain2", "BepInExPack").await.unwrap_err();
        assert!(matches!(err, BadgeError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_http_error() {
        let client = MetricsClient::new(
            "http://127.0.0.1:1",
            Arc::new(NoopStore),
            CachePolicy::default(),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.fetch_metrics("a", "b").await.unwrap_err();
        assert!(matches!(err, BadgeError::HttpError(_)));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(METRICS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "downloads": 10
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(ResponseCache::new(100));
        let client = client_for(&server, cache.clone());
        let first = client.fetch_metrics("riskofrain2", "BepInExPack").await.unwrap();
        wait_for_entry(cache.as_ref(), &client.metrics_url("riskofrain2", "BepInExPack")).await;
        let second = client.fetch_metrics("riskofrain2", "BepInExPack").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.latest_version, "unknown");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_not_found_is_cached_with_short_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(ResponseCache::new(100));
        let client = client_for(&server, cache.clone());
        assert!(client.fetch_metrics("a", "b").await.is_err());
        let cached = wait_for_entry(cache.as_ref(), &client.metrics_url("a", "b")).await;
        assert!(client.fetch_metrics("a", "b").await.is_err());

        assert_eq!(cached.status, 404);
        assert_eq!(cached.ttl, Duration::from_secs(300));
        server.verify().await;
    }

    struct FailingStore;

    #[async_trait]
    impl ResponseStore for FailingStore {
        async fn lookup(&self, _key: &str) -> Option<CachedResponse> {
            None
        }

        async fn store(&self, _key: String, _response: CachedResponse) -> Result<()> {
            Err(BadgeError::CacheError("store unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_fail_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "downloads": 1,
                "latest_version": "1.0.0"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(FailingStore));
        assert!(client.fetch_metrics("a", "b").await.is_ok());
        assert!(client.fetch_metrics("a", "b").await.is_ok());
        server.verify().await;
    }
}
