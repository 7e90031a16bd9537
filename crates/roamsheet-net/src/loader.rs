//! Resource load orchestration.
//!
//! Wraps individual resource fetches (scripts, stylesheets, images, JSON)
//! with priority, fallback, and critical-vs-optional classification,
//! delegating retries to the backoff controller. Loads are idempotent per
//! URL; batch preloading caps in-flight fetches to avoid saturating a
//! constrained link.

use crate::config::LoaderConfig;
use crate::error::{NetError, Result};
use crate::monitor::{ConnectionMonitor, QualityTier};
use crate::retry::RetryController;
use crate::transport::{HttpTransport, TransportRequest};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Kind of resource being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Script,
    Stylesheet,
    Image,
    Json,
}

/// Description of one resource to load. Immutable once a load begins.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub url: String,
    /// Numerically lower values load first.
    pub priority: u32,
    /// Critical resources surface failures; optional ones degrade silently.
    pub critical: bool,
    pub fallback_url: Option<String>,
    pub kind: ResourceKind,
    pub timeout: Duration,
}

impl ResourceDescriptor {
    pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            url: url.into(),
            priority: 10,
            critical: false,
            fallback_url: None,
            kind,
            timeout: LoaderConfig::DEFAULT_RESOURCE_TIMEOUT,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome summary of a batch preload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub loaded: usize,
    pub failed: usize,
    /// Already loaded before the batch ran.
    pub skipped: usize,
}

/// Priority- and quality-aware resource loader.
pub struct ResourceLoader {
    transport: Arc<dyn HttpTransport>,
    retry: Arc<RetryController>,
    monitor: Arc<ConnectionMonitor>,
    loaded: RwLock<HashSet<String>>,
    failures: RwLock<HashMap<String, String>>,
}

impl ResourceLoader {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        retry: Arc<RetryController>,
        monitor: Arc<ConnectionMonitor>,
    ) -> Self {
        Self {
            transport,
            retry,
            monitor,
            loaded: RwLock::new(HashSet::new()),
            failures: RwLock::new(HashMap::new()),
        }
    }

    /// Check whether a URL has already been loaded.
    pub fn is_loaded(&self, url: &str) -> bool {
        self.loaded.read().expect("loaded lock poisoned").contains(url)
    }

    /// Recorded failures by URL (most recent error message).
    pub fn failures(&self) -> HashMap<String, String> {
        self.failures.read().expect("failure lock poisoned").clone()
    }

    /// Load a resource.
    ///
    /// Idempotent per URL: an already-loaded URL short-circuits to
    /// `Ok(true)` without touching the network. A critical resource that
    /// exhausts its retries tries `fallback_url` once with a fresh backoff
    /// budget before surfacing the failure; an optional resource records
    /// the failure and returns `Ok(false)`.
    pub async fn load(&self, descriptor: &ResourceDescriptor) -> Result<bool> {
        if self.is_loaded(&descriptor.url) {
            debug!("{} already loaded, skipping", descriptor.url);
            return Ok(true);
        }

        match self.fetch(&descriptor.url, descriptor.timeout).await {
            Ok(()) => {
                self.mark_loaded(&descriptor.url);
                Ok(true)
            }
            Err(error) if descriptor.critical => {
                if let Some(fallback) = &descriptor.fallback_url {
                    warn!(
                        "Critical resource {} failed ({}), trying fallback {}",
                        descriptor.url, error, fallback
                    );
                    match self.fetch(fallback, descriptor.timeout).await {
                        Ok(()) => {
                            self.mark_loaded(&descriptor.url);
                            return Ok(true);
                        }
                        Err(fallback_error) => {
                            self.record_failure(&descriptor.url, &fallback_error);
                            return Err(fallback_error);
                        }
                    }
                }
                self.record_failure(&descriptor.url, &error);
                Err(error)
            }
            Err(error) => {
                // Degraded UI is acceptable for optional resources
                warn!("Optional resource {} failed: {}", descriptor.url, error);
                self.record_failure(&descriptor.url, &error);
                Ok(false)
            }
        }
    }

    /// Preload resources in priority-ordered batches.
    ///
    /// Concurrency within a batch is capped (2 while slow, 4 otherwise) and
    /// a pause is inserted between batches on a slow connection. Critical
    /// failures are counted, not surfaced; callers inspect the report.
    pub async fn preload(&self, descriptors: Vec<ResourceDescriptor>) -> BatchReport {
        let mut batches: BTreeMap<u32, Vec<ResourceDescriptor>> = BTreeMap::new();
        for descriptor in descriptors {
            batches.entry(descriptor.priority).or_default().push(descriptor);
        }

        let mut report = BatchReport::default();
        let batch_count = batches.len();

        for (index, (priority, batch)) in batches.into_iter().enumerate() {
            let slow = self.monitor.tier() == QualityTier::Slow;
            let cap = if slow {
                LoaderConfig::BATCH_CONCURRENCY_SLOW
            } else {
                LoaderConfig::BATCH_CONCURRENCY_FAST
            };
            debug!(
                "Preloading batch priority={} ({} resources, {} concurrent)",
                priority,
                batch.len(),
                cap
            );

            let semaphore = Arc::new(Semaphore::new(cap));
            let outcomes = futures::future::join_all(batch.into_iter().map(|descriptor| {
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    if self.is_loaded(&descriptor.url) {
                        return Outcome::Skipped;
                    }
                    match self.load(&descriptor).await {
                        Ok(true) => Outcome::Loaded,
                        Ok(false) | Err(_) => Outcome::Failed,
                    }
                }
            }))
            .await;

            for outcome in outcomes {
                match outcome {
                    Outcome::Loaded => report.loaded += 1,
                    Outcome::Failed => report.failed += 1,
                    Outcome::Skipped => report.skipped += 1,
                }
            }

            // Give a constrained link room to breathe between batches
            if slow && index + 1 < batch_count {
                tokio::time::sleep(LoaderConfig::INTER_BATCH_PAUSE).await;
            }
        }

        info!(
            "Preload finished: {} loaded, {} failed, {} skipped",
            report.loaded, report.failed, report.skipped
        );
        report
    }

    /// Repair a resource that failed after it was already loaded.
    ///
    /// Drops the loaded mark and fetches again; image URLs get a
    /// cache-busting query suffix so intermediaries cannot serve the broken
    /// copy back.
    pub async fn repair(&self, url: &str, kind: ResourceKind) -> Result<bool> {
        self.loaded.write().expect("loaded lock poisoned").remove(url);

        let fetch_url = if kind == ResourceKind::Image {
            cache_busted(url)
        } else {
            url.to_string()
        };

        info!("Repairing resource {} via {}", url, fetch_url);
        match self
            .fetch(&fetch_url, LoaderConfig::DEFAULT_RESOURCE_TIMEOUT)
            .await
        {
            Ok(()) => {
                self.mark_loaded(url);
                Ok(true)
            }
            Err(error) => {
                self.record_failure(url, &error);
                Err(error)
            }
        }
    }

    fn mark_loaded(&self, url: &str) {
        self.loaded
            .write()
            .expect("loaded lock poisoned")
            .insert(url.to_string());
        self.failures.write().expect("failure lock poisoned").remove(url);
    }

    fn record_failure(&self, url: &str, error: &NetError) {
        self.failures
            .write()
            .expect("failure lock poisoned")
            .insert(url.to_string(), error.to_string());
    }

    /// Fetch one URL through the retry controller. Each call is its own
    /// retry session with a full backoff budget.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<()> {
        let transport = self.transport.clone();
        let url_owned = url.to_string();
        self.retry
            .execute(url, move |attempt| {
                let transport = transport.clone();
                let url = url_owned.clone();
                async move {
                    let request = TransportRequest::get(url.as_str())
                        .with_timeout(timeout)
                        .with_cancel(attempt);
                    transport.execute(request).await?.require_success(&url)?;
                    Ok(())
                }
            })
            .await
    }
}

enum Outcome {
    Loaded,
    Failed,
    Skipped,
}

/// Append a cache-busting query parameter to a URL.
fn cache_busted(raw: &str) -> String {
    let stamp = chrono::Utc::now().timestamp_millis().to_string();
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed
                .query_pairs_mut()
                .append_pair(LoaderConfig::CACHE_BUST_PARAM, &stamp);
            parsed.to_string()
        }
        Err(_) => format!("{}?{}={}", raw, LoaderConfig::CACHE_BUST_PARAM, stamp),
    }
}
