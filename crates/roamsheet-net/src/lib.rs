//! Roamsheet network resilience layer.
//!
//! Keeps the Roamsheet client usable over unreliable mobile networks by
//! combining connection-quality sensing, backoff-based retry, tiered
//! response caching, and a page-independent request interception agent.
//! The UI shell and data-access layer sit above this crate; transport,
//! platform signals, and the cache store are injected at construction.
//!
//! # Example
//!
//! ```rust,ignore
//! use roamsheet_net::NetStack;
//!
//! #[tokio::main]
//! async fn main() -> roamsheet_net::Result<()> {
//!     let stack = NetStack::builder("https://app.roamsheet.io")
//!         .generation("2024.31.2")
//!         .build()?;
//!
//!     // Fetch an API payload through the interception agent
//!     let response = stack.agent().intercept(
//!         roamsheet_net::InterceptedRequest::new(
//!             "https://app.roamsheet.io/api/timesheets",
//!             roamsheet_net::Destination::Api,
//!         ),
//!     ).await?;
//!     println!("served from {:?}", response.served_from);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod monitor;
pub mod retry;
pub mod transport;

// Re-export commonly used types
pub use agent::{
    AgentResponse, Destination, FailureReason, FetchStrategy, InterceptAgent,
    InterceptedRequest, ServedFrom,
};
pub use cache::{ByteStore, MemoryStore, SqliteStore, StoreConfig, StoreStats};
pub use cancel::{CancellationToken, CancelledError};
pub use diagnostics::{DiagnosticRun, Diagnostics, OverallRating, QuickStatus, TestResult};
pub use error::{NetError, Result};
pub use loader::{BatchReport, ResourceDescriptor, ResourceKind, ResourceLoader};
pub use monitor::{
    ConnectionMonitor, ConnectionState, ConnectivitySignals, NullSignals, QualityTier,
    SignalEvent, SignalSample, TierSubscription,
};
pub use retry::{DeviceProfile, FailureStreak, RetryConfig, RetryController, RetryStats};
pub use transport::{
    HttpTransport, Method, ReqwestTransport, TransportRequest, TransportResponse,
};

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// The assembled resilience layer.
///
/// Every service is constructed once at startup and shared by reference;
/// there are no ambient globals. Create one via [`NetStack::builder`].
pub struct NetStack {
    monitor: Arc<ConnectionMonitor>,
    retry: Arc<RetryController>,
    loader: Arc<ResourceLoader>,
    agent: Arc<InterceptAgent>,
    diagnostics: Arc<Diagnostics>,
    streak: FailureStreak,
}

impl NetStack {
    /// Create a builder rooted at the application origin.
    pub fn builder(origin: impl Into<String>) -> NetStackBuilder {
        NetStackBuilder::new(origin)
    }

    // === Service accessors ===

    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    pub fn retry(&self) -> &Arc<RetryController> {
        &self.retry
    }

    pub fn loader(&self) -> &Arc<ResourceLoader> {
        &self.loader
    }

    pub fn agent(&self) -> &Arc<InterceptAgent> {
        &self.agent
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    // === Connectivity convenience ===

    /// Current connection state snapshot.
    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.current_state()
    }

    pub fn tier(&self) -> QualityTier {
        self.monitor.tier()
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// Register a tier-transition listener for UI indicators.
    pub fn subscribe<F>(&self, callback: F) -> TierSubscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.monitor.subscribe(callback)
    }

    /// User-facing recovery trigger: reset the failure streak and re-probe
    /// connectivity, returning the fresh state.
    pub fn force_reconnect(&self) -> ConnectionState {
        info!("Recovery requested: resetting failure streak and re-probing");
        self.streak.reset();
        self.monitor.refresh()
    }

    /// Status summary for dashboards and support tooling.
    pub fn status(&self) -> StackStatus {
        StackStatus {
            connection: self.connection_state(),
            failure_streak: self.streak.get(),
            cache: self.agent.store_stats().ok(),
            resource_failures: self.loader.failures().len(),
            agent_generation: self.agent.generation().to_string(),
        }
    }

    /// Tear down background tasks and listener registrations.
    pub fn shutdown(&self) {
        self.monitor.shutdown();
    }
}

impl std::fmt::Debug for NetStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetStack").finish_non_exhaustive()
    }
}

impl Drop for NetStack {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Summary returned by [`NetStack::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StackStatus {
    pub connection: ConnectionState,
    pub failure_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<StoreStats>,
    pub resource_failures: usize,
    pub agent_generation: String,
}

/// Builder for [`NetStack`].
pub struct NetStackBuilder {
    origin: String,
    generation: String,
    transport: Option<Arc<dyn HttpTransport>>,
    store: Option<Arc<dyn ByteStore>>,
    signals: Option<Arc<dyn ConnectivitySignals>>,
    device: DeviceProfile,
    retry_config: RetryConfig,
    cache_db: Option<PathBuf>,
    background_monitoring: bool,
}

impl NetStackBuilder {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            generation: "dev".to_string(),
            transport: None,
            store: None,
            signals: None,
            device: DeviceProfile::mobile(),
            retry_config: RetryConfig::default(),
            cache_db: None,
            background_monitoring: false,
        }
    }

    /// Deployment version tag; cache entries from other tags are purged on
    /// startup.
    pub fn generation(mut self, tag: impl Into<String>) -> Self {
        self.generation = tag.into();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn ByteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn signals(mut self, signals: Arc<dyn ConnectivitySignals>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn device(mut self, device: DeviceProfile) -> Self {
        self.device = device;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Persist the response cache at this SQLite path instead of in memory.
    pub fn cache_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_db = Some(path.into());
        self
    }

    /// Enable periodic background connectivity verification.
    pub fn background_monitoring(mut self, enabled: bool) -> Self {
        self.background_monitoring = enabled;
        self
    }

    /// Assemble and start the stack. The agent's generation purge runs
    /// before this returns. Must be called from within a Tokio runtime;
    /// the monitor's event pump is spawned here.
    pub fn build(self) -> Result<NetStack> {
        let origin = url::Url::parse(&self.origin).map_err(|e| NetError::Config {
            message: format!("Invalid origin {}: {}", self.origin, e),
        })?;

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new()?),
        };

        let store: Arc<dyn ByteStore> = match (self.store, self.cache_db) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SqliteStore::new(path)?),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let signals: Arc<dyn ConnectivitySignals> =
            self.signals.unwrap_or_else(|| Arc::new(NullSignals));

        let streak = FailureStreak::new();

        let monitor = Arc::new(ConnectionMonitor::new(signals, streak.clone()));
        monitor.start();
        if self.background_monitoring {
            monitor.start_monitoring();
        }

        let retry = Arc::new(RetryController::new(
            monitor.clone(),
            streak.clone(),
            self.retry_config,
            self.device,
        ));

        let loader = Arc::new(ResourceLoader::new(
            transport.clone(),
            retry.clone(),
            monitor.clone(),
        ));

        let agent = Arc::new(InterceptAgent::new(
            transport.clone(),
            store,
            monitor.clone(),
            self.generation,
        ));
        agent.activate()?;

        let diagnostics = Arc::new(Diagnostics::new(
            transport,
            monitor.clone(),
            self.device,
            origin,
        ));

        info!("Network resilience layer started");
        Ok(NetStack {
            monitor,
            retry,
            loader,
            agent,
            diagnostics,
            streak,
        })
    }
}
