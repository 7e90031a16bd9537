//! Background request interception.
//!
//! The agent sits between the application and the transport, independent of
//! any page lifecycle, and applies a per-request caching strategy over a
//! key-value byte store:
//!
//! - **Cache-first** (scripts, styles, images, fonts): serve a cached copy
//!   immediately when one exists and refresh it from the network in the
//!   background without blocking the response.
//! - **Network-first** (documents, API reads): bounded-timeout network
//!   attempt, overwriting the cache on success and falling back to the
//!   newest cached copy on failure. When neither works the agent responds
//!   with a synthesized, machine-readable error rather than failing.
//!
//! Cache entries are keyed by generation tag and URL; activating the agent
//! for a new deployment purges every prior-generation entry before traffic
//! is accepted. Only 2xx responses are ever written (a 304 re-stamps the
//! existing entry).
//!
//! Known characteristic: concurrent cache-first requests for the same URL
//! may both read a stale entry and trigger overlapping refreshes. Writes
//! are last-writer-wins per key; there is no single-flight deduplication.

use crate::cache::ByteStore;
use crate::config::AgentConfig;
use crate::error::{NetError, Result};
use crate::monitor::{ConnectionMonitor, QualityTier};
use crate::transport::{HttpTransport, TransportRequest};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the intercepted request is fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Api,
    Script,
    Stylesheet,
    Image,
    Font,
}

/// Caching strategy selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Serve cache immediately, refresh in the background.
    CacheFirst,
    /// Try the network first, fall back to cache.
    NetworkFirst,
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    Network,
    Cache,
    SynthesizedError,
}

/// Machine-readable failure carried by a synthesized response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum FailureReason {
    /// Network and cache both failed under the network-first strategy.
    NoCacheAvailable { url: String, detail: String },
}

/// A request intercepted on its way to the network.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub destination: Destination,
}

impl InterceptedRequest {
    pub fn new(url: impl Into<String>, destination: Destination) -> Self {
        Self {
            url: url.into(),
            destination,
        }
    }
}

/// Response produced by the agent.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub status: u16,
    pub body: Bytes,
    pub served_from: ServedFrom,
    /// Set when the body came from the cache.
    pub stored_at: Option<DateTime<Utc>>,
    /// Set on synthesized error responses.
    pub failure: Option<FailureReason>,
}

impl AgentResponse {
    fn network(status: u16, body: Bytes) -> Self {
        Self {
            status,
            body,
            served_from: ServedFrom::Network,
            stored_at: None,
            failure: None,
        }
    }

    fn cached(entry: &CachedResponse) -> Self {
        Self {
            status: entry.status,
            body: entry.body.clone(),
            served_from: ServedFrom::Cache,
            stored_at: Some(entry.stored_at),
            failure: None,
        }
    }
}

/// A decoded cache entry.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
    pub strategy: FetchStrategy,
}

/// On-store JSON envelope. Bodies may be binary, so they travel as base64.
#[derive(Serialize, Deserialize)]
struct Envelope {
    status: u16,
    body: String,
    stored_at: DateTime<Utc>,
    strategy: FetchStrategy,
}

fn encode_entry(status: u16, body: &[u8], stored_at: DateTime<Utc>, strategy: FetchStrategy) -> Result<Vec<u8>> {
    let envelope = Envelope {
        status,
        body: BASE64.encode(body),
        stored_at,
        strategy,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

fn decode_entry(raw: &[u8]) -> Option<CachedResponse> {
    let envelope: Envelope = serde_json::from_slice(raw).ok()?;
    let body = BASE64.decode(&envelope.body).ok()?;
    Some(CachedResponse {
        status: envelope.status,
        body: Bytes::from(body),
        stored_at: envelope.stored_at,
        strategy: envelope.strategy,
    })
}

/// Path patterns that force the network-first strategy regardless of the
/// declared destination.
const NETWORK_FIRST_PATH_PATTERNS: &[&str] = &[r"/api/", r"/rpc/", r"/graphql"];

/// Page-independent request interception agent.
pub struct InterceptAgent {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn ByteStore>,
    monitor: Arc<ConnectionMonitor>,
    /// Deployment version tag; prior-generation entries are purged on
    /// activation.
    generation: String,
    /// Hot in-memory tier in front of the store.
    hot: Cache<String, CachedResponse>,
    network_first_paths: RegexSet,
    active: AtomicBool,
}

impl InterceptAgent {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn ByteStore>,
        monitor: Arc<ConnectionMonitor>,
        generation: impl Into<String>,
    ) -> Self {
        let hot = Cache::builder()
            .max_capacity(AgentConfig::HOT_TIER_CAPACITY)
            .time_to_live(AgentConfig::HOT_TIER_TTL)
            .build();
        let network_first_paths =
            RegexSet::new(NETWORK_FIRST_PATH_PATTERNS).expect("static patterns are valid");

        Self {
            transport,
            store,
            monitor,
            generation: generation.into(),
            hot,
            network_first_paths,
            active: AtomicBool::new(false),
        }
    }

    /// Purge cache entries from prior generations and start accepting
    /// traffic. Returns the number of purged entries.
    pub fn activate(&self) -> Result<usize> {
        let prefix = format!("{}|", self.generation);
        let mut purged = 0usize;

        for key in self.store.list_keys()? {
            if !key.starts_with(&prefix) && self.store.delete(&key)? {
                purged += 1;
            }
        }

        self.active.store(true, Ordering::SeqCst);
        info!(
            "Interception agent activated for generation {} ({} stale entries purged)",
            self.generation, purged
        );
        Ok(purged)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    /// Select the caching strategy for a request.
    ///
    /// Static classification: asset destinations are cache-first, documents
    /// and API reads network-first; path patterns override either way
    /// toward network-first.
    pub fn classify(&self, request: &InterceptedRequest) -> FetchStrategy {
        let path = url::Url::parse(&request.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| request.url.clone());
        if self.network_first_paths.is_match(&path) {
            return FetchStrategy::NetworkFirst;
        }

        match request.destination {
            Destination::Document | Destination::Api => FetchStrategy::NetworkFirst,
            Destination::Script
            | Destination::Stylesheet
            | Destination::Image
            | Destination::Font => FetchStrategy::CacheFirst,
        }
    }

    /// Handle one intercepted request.
    pub async fn intercept(&self, request: InterceptedRequest) -> Result<AgentResponse> {
        if !self.is_active() {
            return Err(NetError::Config {
                message: "interception agent is not activated".to_string(),
            });
        }

        match self.classify(&request) {
            FetchStrategy::CacheFirst => self.cache_first(&request).await,
            FetchStrategy::NetworkFirst => self.network_first(&request).await,
        }
    }

    /// Maintenance: drop expired entries from the store.
    pub fn cleanup_expired(&self) -> Result<usize> {
        self.store.cleanup_expired()
    }

    /// Store statistics for observability.
    pub fn store_stats(&self) -> Result<crate::cache::StoreStats> {
        self.store.stats()
    }

    // === Strategies ===

    async fn cache_first(&self, request: &InterceptedRequest) -> Result<AgentResponse> {
        if let Some(cached) = self.read_cache(&request.url) {
            debug!("{} served from cache, refreshing in background", request.url);
            self.spawn_refresh(request.url.clone());
            return Ok(AgentResponse::cached(&cached));
        }

        let response = self
            .transport
            .execute(TransportRequest::get(request.url.as_str()))
            .await?;
        if response.is_success() {
            self.write_cache(
                &request.url,
                response.status,
                &response.body,
                FetchStrategy::CacheFirst,
            );
        }
        Ok(AgentResponse::network(response.status, response.body))
    }

    async fn network_first(&self, request: &InterceptedRequest) -> Result<AgentResponse> {
        let timeout = self.network_first_timeout();
        let attempt = self
            .transport
            .execute(TransportRequest::get(request.url.as_str()).with_timeout(timeout))
            .await;

        match attempt {
            Ok(response) if response.is_success() => {
                self.write_cache(
                    &request.url,
                    response.status,
                    &response.body,
                    FetchStrategy::NetworkFirst,
                );
                Ok(AgentResponse::network(response.status, response.body))
            }
            Ok(response) if response.is_not_modified() => {
                match self.read_cache(&request.url) {
                    Some(cached) => {
                        self.touch(&request.url, &cached);
                        Ok(AgentResponse::cached(&cached))
                    }
                    // 304 with nothing cached locally; pass it through
                    None => Ok(AgentResponse::network(response.status, response.body)),
                }
            }
            Ok(response) => self.fall_back(
                request,
                format!("HTTP {} from {}", response.status, request.url),
            ),
            Err(error) => self.fall_back(request, error.to_string()),
        }
    }

    /// Serve the newest cached copy, or synthesize an error response.
    fn fall_back(&self, request: &InterceptedRequest, detail: String) -> Result<AgentResponse> {
        if let Some(cached) = self.read_cache(&request.url) {
            warn!(
                "Network failed for {} ({}), serving cached copy from {}",
                request.url, detail, cached.stored_at
            );
            return Ok(AgentResponse::cached(&cached));
        }

        let failure = FailureReason::NoCacheAvailable {
            url: request.url.clone(),
            detail,
        };
        let body = serde_json::to_vec(&failure)?;
        Ok(AgentResponse {
            status: 503,
            body: Bytes::from(body),
            served_from: ServedFrom::SynthesizedError,
            stored_at: None,
            failure: Some(failure),
        })
    }

    // === Cache plumbing ===

    fn key(&self, url: &str) -> String {
        format!("{}|{}", self.generation, url)
    }

    fn read_cache(&self, url: &str) -> Option<CachedResponse> {
        let key = self.key(url);
        if let Some(hit) = self.hot.get(&key) {
            return Some(hit);
        }

        match self.store.get(&key) {
            Ok(Some(raw)) => match decode_entry(&raw) {
                Some(entry) => {
                    self.hot.insert(key, entry.clone());
                    Some(entry)
                }
                None => {
                    warn!("Undecodable cache entry for {}, dropping", url);
                    let _ = self.store.delete(&key);
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!("Cache read failed for {}: {}", url, error);
                None
            }
        }
    }

    /// Write a response to both tiers. Responses outside 2xx never create
    /// entries.
    fn write_cache(&self, url: &str, status: u16, body: &[u8], strategy: FetchStrategy) {
        if !(200..=299).contains(&status) {
            return;
        }

        let stored_at = Utc::now();
        let key = self.key(url);
        match encode_entry(status, body, stored_at, strategy) {
            Ok(raw) => {
                if let Err(error) = self.store.put(&key, &raw, AgentConfig::STORE_TTL) {
                    warn!("Cache write failed for {}: {}", url, error);
                    return;
                }
                self.hot.insert(
                    key,
                    CachedResponse {
                        status,
                        body: Bytes::copy_from_slice(body),
                        stored_at,
                        strategy,
                    },
                );
            }
            Err(error) => warn!("Cache encode failed for {}: {}", url, error),
        }
    }

    /// Re-stamp an entry whose content the server confirmed unchanged.
    fn touch(&self, url: &str, cached: &CachedResponse) {
        let stored_at = Utc::now();
        let key = self.key(url);
        if let Ok(raw) = encode_entry(cached.status, &cached.body, stored_at, cached.strategy) {
            let _ = self.store.put(&key, &raw, AgentConfig::STORE_TTL);
            self.hot.insert(
                key,
                CachedResponse {
                    stored_at,
                    ..cached.clone()
                },
            );
        }
    }

    fn network_first_timeout(&self) -> Duration {
        if self.monitor.tier() == QualityTier::Slow {
            AgentConfig::NETWORK_FIRST_TIMEOUT * 2
        } else {
            AgentConfig::NETWORK_FIRST_TIMEOUT
        }
    }

    /// Fire-and-forget cache refresh; never blocks the response that
    /// triggered it.
    fn spawn_refresh(&self, url: String) {
        let transport = self.transport.clone();
        let store = self.store.clone();
        let hot = self.hot.clone();
        let key = self.key(&url);

        tokio::spawn(async move {
            match transport.execute(TransportRequest::get(url.as_str())).await {
                Ok(response) if response.is_success() => {
                    let stored_at = Utc::now();
                    match encode_entry(
                        response.status,
                        &response.body,
                        stored_at,
                        FetchStrategy::CacheFirst,
                    ) {
                        Ok(raw) => {
                            if store.put(&key, &raw, AgentConfig::STORE_TTL).is_ok() {
                                hot.insert(
                                    key,
                                    CachedResponse {
                                        status: response.status,
                                        body: response.body,
                                        stored_at,
                                        strategy: FetchStrategy::CacheFirst,
                                    },
                                );
                                debug!("Background refresh updated {}", url);
                            }
                        }
                        Err(error) => debug!("Background refresh encode failed: {}", error),
                    }
                }
                Ok(response) => {
                    debug!(
                        "Background refresh for {} got HTTP {}, keeping cached copy",
                        url, response.status
                    );
                }
                Err(error) => {
                    debug!("Background refresh for {} failed: {}", url, error);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::monitor::NullSignals;
    use crate::retry::FailureStreak;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Scripted {
        Status(u16, &'static [u8]),
        Timeout,
    }

    /// Transport fake serving scripted outcomes per URL.
    struct ScriptedTransport {
        outcomes: Mutex<HashMap<String, Scripted>>,
        requests: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(HashMap::new()),
                requests: AtomicUsize::new(0),
            })
        }

        fn script(&self, url: &str, outcome: Scripted) {
            self.outcomes.lock().unwrap().insert(url.to_string(), outcome);
        }

        fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .get(&request.url)
                .cloned()
                .unwrap_or(Scripted::Status(200, b"fresh"));
            match outcome {
                Scripted::Status(status, body) => Ok(TransportResponse {
                    status,
                    body: Bytes::from_static(body),
                }),
                Scripted::Timeout => Err(NetError::Timeout(request.timeout)),
            }
        }
    }

    fn agent_with(
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        generation: &str,
    ) -> InterceptAgent {
        let monitor = Arc::new(ConnectionMonitor::new(
            Arc::new(NullSignals),
            FailureStreak::new(),
        ));
        let agent = InterceptAgent::new(transport, store, monitor, generation);
        agent.activate().unwrap();
        agent
    }

    fn api_request() -> InterceptedRequest {
        InterceptedRequest::new("https://app.roamsheet.io/api/timesheets", Destination::Api)
    }

    fn script_request() -> InterceptedRequest {
        InterceptedRequest::new("https://app.roamsheet.io/assets/app.js", Destination::Script)
    }

    #[tokio::test]
    async fn test_classification() {
        let agent = agent_with(ScriptedTransport::new(), Arc::new(MemoryStore::new()), "v1");

        assert_eq!(agent.classify(&script_request()), FetchStrategy::CacheFirst);
        assert_eq!(agent.classify(&api_request()), FetchStrategy::NetworkFirst);
        assert_eq!(
            agent.classify(&InterceptedRequest::new(
                "https://app.roamsheet.io/",
                Destination::Document
            )),
            FetchStrategy::NetworkFirst
        );
        // Path pattern overrides an asset destination
        assert_eq!(
            agent.classify(&InterceptedRequest::new(
                "https://app.roamsheet.io/api/export.png",
                Destination::Image
            )),
            FetchStrategy::NetworkFirst
        );
    }

    #[tokio::test]
    async fn test_inactive_agent_rejects() {
        let monitor = Arc::new(ConnectionMonitor::new(
            Arc::new(NullSignals),
            FailureStreak::new(),
        ));
        let agent = InterceptAgent::new(
            ScriptedTransport::new(),
            Arc::new(MemoryStore::new()),
            monitor,
            "v1",
        );

        let err = agent.intercept(script_request()).await.unwrap_err();
        assert!(matches!(err, NetError::Config { .. }));
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_caches() {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(transport.clone(), store.clone(), "v1");

        let response = agent.intercept(script_request()).await.unwrap();
        assert_eq!(response.served_from, ServedFrom::Network);
        assert_eq!(response.status, 200);

        let keys = store.list_keys().unwrap();
        assert_eq!(keys, vec!["v1|https://app.roamsheet.io/assets/app.js"]);
    }

    #[tokio::test]
    async fn test_cache_first_hit_serves_cache_and_refreshes() {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(transport.clone(), store.clone(), "v1");

        // Prime the cache
        agent.intercept(script_request()).await.unwrap();
        let primed_requests = transport.request_count();

        let response = agent.intercept(script_request()).await.unwrap();
        assert_eq!(response.served_from, ServedFrom::Cache);
        assert!(response.stored_at.is_some());
        assert_eq!(response.body, Bytes::from_static(b"fresh"));

        // The background refresh lands afterwards, off the response path
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.request_count(), primed_requests + 1);
    }

    #[tokio::test]
    async fn test_error_status_is_never_cached() {
        let transport = ScriptedTransport::new();
        transport.script(
            "https://app.roamsheet.io/assets/app.js",
            Scripted::Status(500, b"boom"),
        );
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(transport.clone(), store.clone(), "v1");

        let response = agent.intercept(script_request()).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.served_from, ServedFrom::Network);
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_network_first_success_overwrites_cache() {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(transport.clone(), store.clone(), "v1");

        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Status(200, b"week-31"),
        );
        agent.intercept(api_request()).await.unwrap();

        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Status(200, b"week-32"),
        );
        let response = agent.intercept(api_request()).await.unwrap();
        assert_eq!(response.served_from, ServedFrom::Network);
        assert_eq!(response.body, Bytes::from_static(b"week-32"));

        // Cache now holds the fresh copy
        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Timeout,
        );
        let fallback = agent.intercept(api_request()).await.unwrap();
        assert_eq!(fallback.served_from, ServedFrom::Cache);
        assert_eq!(fallback.body, Bytes::from_static(b"week-32"));
    }

    #[tokio::test]
    async fn test_network_first_failure_without_cache_synthesizes() {
        let transport = ScriptedTransport::new();
        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Timeout,
        );
        let agent = agent_with(transport, Arc::new(MemoryStore::new()), "v1");

        let response = agent.intercept(api_request()).await.unwrap();
        assert_eq!(response.served_from, ServedFrom::SynthesizedError);
        assert_eq!(response.status, 503);
        assert!(matches!(
            response.failure,
            Some(FailureReason::NoCacheAvailable { .. })
        ));

        // The body is machine-readable JSON
        let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["reason"], "no_cache_available");
    }

    #[tokio::test]
    async fn test_network_first_error_status_falls_back_to_cache() {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(transport.clone(), store, "v1");

        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Status(200, b"good"),
        );
        agent.intercept(api_request()).await.unwrap();

        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Status(502, b"bad gateway"),
        );
        let response = agent.intercept(api_request()).await.unwrap();
        assert_eq!(response.served_from, ServedFrom::Cache);
        assert_eq!(response.body, Bytes::from_static(b"good"));
    }

    #[tokio::test]
    async fn test_not_modified_restamps_entry() {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());
        let agent = agent_with(transport.clone(), store.clone(), "v1");

        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Status(200, b"payload"),
        );
        agent.intercept(api_request()).await.unwrap();

        transport.script(
            "https://app.roamsheet.io/api/timesheets",
            Scripted::Status(304, b""),
        );
        let second = agent.intercept(api_request()).await.unwrap();
        assert_eq!(second.served_from, ServedFrom::Cache);
        assert_eq!(second.body, Bytes::from_static(b"payload"));
        // Entry was re-stamped, not rewritten from the 304 body
        assert!(second.stored_at.is_some());
        assert_eq!(store.list_keys().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_activation_purges_prior_generation() {
        let transport = ScriptedTransport::new();
        let store = Arc::new(MemoryStore::new());

        // Entries written under v1
        let v1 = agent_with(transport.clone(), store.clone(), "v1");
        v1.intercept(script_request()).await.unwrap();
        assert_eq!(store.list_keys().unwrap().len(), 1);

        // New deployment tagged v2
        let v2 = agent_with(transport.clone(), store.clone(), "v2");
        assert!(v2.is_active());
        assert!(store
            .list_keys()
            .unwrap()
            .iter()
            .all(|k| k.starts_with("v2|")));

        // The v1 entry is no longer retrievable
        let response = v2.intercept(script_request()).await.unwrap();
        assert_eq!(response.served_from, ServedFrom::Network);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let stored_at = Utc::now();
        let raw = encode_entry(200, b"\x00\x01binary", stored_at, FetchStrategy::CacheFirst)
            .unwrap();
        let decoded = decode_entry(&raw).unwrap();

        assert_eq!(decoded.status, 200);
        assert_eq!(decoded.body, Bytes::from_static(b"\x00\x01binary"));
        assert_eq!(decoded.strategy, FetchStrategy::CacheFirst);
    }

    #[test]
    fn test_undecodable_entry_is_dropped() {
        assert!(decode_entry(b"not json").is_none());
    }
}
