//! Connection quality monitoring.
//!
//! Derives a coarse quality tier (`Fast`/`Slow`/`Offline`) from platform
//! connectivity hints and keeps it current across online/offline events,
//! connectivity changes, and visibility-regained events. Every other service
//! in the layer reads the tier from here; nothing else mutates it.
//!
//! Platform hints arrive through the [`ConnectivitySignals`] capability
//! trait. When the platform exposes no connectivity API, [`NullSignals`]
//! stands in: the tier is optimistically `Fast` while online, corrected to
//! `Slow` once the shared failure streak shows sustained degradation.

use crate::config::MonitorConfig;
use crate::retry::FailureStreak;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Coarse connection quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Fast,
    Slow,
    Offline,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Fast => write!(f, "fast"),
            QualityTier::Slow => write!(f, "slow"),
            QualityTier::Offline => write!(f, "offline"),
        }
    }
}

/// Snapshot of connection state, re-derived on every connectivity signal.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionState {
    pub online: bool,
    pub tier: QualityTier,
    /// Platform-reported effective bandwidth class, or "unknown".
    pub effective_type: String,
    /// Measured downlink in Mbps; 0.0 when the platform reports none.
    pub downlink_mbps: f64,
    /// Measured round-trip time in ms; 0 when the platform reports none.
    pub rtt_ms: u32,
    pub last_updated: DateTime<Utc>,
}

/// Raw connectivity hints sampled from the platform.
#[derive(Debug, Clone, Default)]
pub struct SignalSample {
    pub online: bool,
    pub effective_type: Option<String>,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
}

impl SignalSample {
    /// True when the platform exposes no connectivity hints at all.
    pub fn hints_absent(&self) -> bool {
        self.effective_type.is_none() && self.downlink_mbps.is_none() && self.rtt_ms.is_none()
    }
}

/// Platform connectivity events that trigger re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Online,
    Offline,
    ConnectivityChange,
    /// The page became visible again after backgrounding. Mobile platforms
    /// often misreport immediately after resume, so handling is debounced.
    VisibilityRegained,
}

/// Capability provider for platform connectivity signals.
///
/// Selected once at construction; absence of a platform API is expressed by
/// passing [`NullSignals`] rather than checked at call sites.
pub trait ConnectivitySignals: Send + Sync {
    /// Sample the current platform hints.
    fn sample(&self) -> SignalSample;

    /// Subscribe to connectivity events. Implementations that never emit
    /// events may return a receiver whose sender side is already closed.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SignalEvent>;
}

/// Null-object provider for platforms without a connectivity API.
///
/// Always reports online with no hints and never emits events.
pub struct NullSignals;

impl ConnectivitySignals for NullSignals {
    fn sample(&self) -> SignalSample {
        SignalSample {
            online: true,
            ..Default::default()
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SignalEvent> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }
}

/// Derive the quality tier from a sample and the shared failure streak.
///
/// Deterministic: offline wins; the slow checks take precedence over the
/// fast ones; the ambiguous middle defaults to slow.
fn derive_tier(sample: &SignalSample, streak: u32) -> QualityTier {
    if !sample.online {
        return QualityTier::Offline;
    }

    if sample.hints_absent() {
        // Optimistic default without a connectivity API, corrected once the
        // failure streak shows the optimism was misplaced.
        return if streak > MonitorConfig::STREAK_DEGRADE_THRESHOLD {
            QualityTier::Slow
        } else {
            QualityTier::Fast
        };
    }

    let class_is_slow = sample
        .effective_type
        .as_deref()
        .map(|t| MonitorConfig::SLOW_EFFECTIVE_TYPES.contains(&t))
        .unwrap_or(false);
    let downlink_is_slow = sample
        .downlink_mbps
        .map(|d| d < MonitorConfig::SLOW_DOWNLINK_MBPS)
        .unwrap_or(false);
    let rtt_is_slow = sample
        .rtt_ms
        .map(|r| r > MonitorConfig::SLOW_RTT_MS)
        .unwrap_or(false);

    if class_is_slow || downlink_is_slow || rtt_is_slow {
        return QualityTier::Slow;
    }

    let class_is_fast = sample.effective_type.as_deref() == Some(MonitorConfig::FAST_EFFECTIVE_TYPE);
    let downlink_is_fast = sample
        .downlink_mbps
        .map(|d| d > MonitorConfig::FAST_DOWNLINK_MBPS)
        .unwrap_or(false);

    if class_is_fast || downlink_is_fast {
        QualityTier::Fast
    } else {
        QualityTier::Slow
    }
}

fn state_from_sample(sample: &SignalSample, tier: QualityTier) -> ConnectionState {
    ConnectionState {
        online: sample.online,
        tier,
        effective_type: sample
            .effective_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        downlink_mbps: sample.downlink_mbps.unwrap_or(0.0),
        rtt_ms: sample.rtt_ms.unwrap_or(0),
        last_updated: Utc::now(),
    }
}

type Listener = Box<dyn Fn(ConnectionState) + Send + Sync>;
type ListenerMap = Arc<Mutex<HashMap<u64, Listener>>>;

/// RAII guard for a tier-change subscription. Dropping it unregisters the
/// listener.
pub struct TierSubscription {
    id: u64,
    listeners: std::sync::Weak<Mutex<HashMap<u64, Listener>>>,
}

impl Drop for TierSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().expect("listener lock poisoned").remove(&self.id);
        }
    }
}

/// Connection quality monitor.
pub struct ConnectionMonitor {
    signals: Arc<dyn ConnectivitySignals>,
    streak: FailureStreak,
    state_tx: watch::Sender<ConnectionState>,
    listeners: ListenerMap,
    next_listener_id: AtomicU64,
    event_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    periodic_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    monitoring_active: Arc<AtomicBool>,
}

impl ConnectionMonitor {
    /// Create a monitor over the given signal provider.
    ///
    /// The initial state is derived immediately; call [`start`] to begin
    /// consuming platform events.
    ///
    /// [`start`]: ConnectionMonitor::start
    pub fn new(signals: Arc<dyn ConnectivitySignals>, streak: FailureStreak) -> Self {
        let sample = signals.sample();
        let tier = derive_tier(&sample, streak.get());
        let (state_tx, _state_rx) = watch::channel(state_from_sample(&sample, tier));

        Self {
            signals,
            streak,
            state_tx,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: AtomicU64::new(0),
            event_task: Mutex::new(None),
            periodic_task: Mutex::new(None),
            monitoring_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start consuming platform connectivity events.
    pub fn start(self: &Arc<Self>) {
        let mut events = self.signals.subscribe();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event == SignalEvent::VisibilityRegained {
                    tokio::time::sleep(MonitorConfig::VISIBILITY_DEBOUNCE).await;
                }
                monitor.reevaluate();
            }
            debug!("Connectivity event stream closed");
        });
        *self.event_task.lock().expect("task lock poisoned") = Some(handle);
    }

    /// Get the current connection state snapshot.
    pub fn current_state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Get the current quality tier.
    pub fn tier(&self) -> QualityTier {
        self.state_tx.borrow().tier
    }

    /// Check if the connection is currently online.
    pub fn is_online(&self) -> bool {
        self.state_tx.borrow().online
    }

    /// Register a listener invoked on tier transitions only (not on every
    /// raw signal). The returned guard unregisters on drop.
    pub fn subscribe<F>(&self, callback: F) -> TierSubscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .insert(id, Box::new(callback));
        TierSubscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Suspend until the tier leaves `Offline`.
    pub async fn wait_until_online(&self) {
        let mut rx = self.state_tx.subscribe();
        loop {
            if rx.borrow().tier != QualityTier::Offline {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Force a re-sample and re-derivation, returning the fresh state.
    ///
    /// Used by the recovery trigger and the periodic verification task.
    pub fn refresh(&self) -> ConnectionState {
        self.reevaluate();
        self.current_state()
    }

    /// Re-sample the provider and update state, notifying listeners when
    /// the tier transitions.
    fn reevaluate(&self) {
        let sample = self.signals.sample();
        let tier = derive_tier(&sample, self.streak.get());
        let previous = self.state_tx.borrow().tier;
        let state = state_from_sample(&sample, tier);

        self.state_tx.send_replace(state.clone());

        if tier != previous {
            info!("Connection tier changed: {} -> {}", previous, tier);
            let listeners = self.listeners.lock().expect("listener lock poisoned");
            for listener in listeners.values() {
                listener(state.clone());
            }
        }
    }

    /// Start periodic background verification of connectivity.
    ///
    /// Re-checks frequently while offline and occasionally while online.
    pub fn start_monitoring(self: &Arc<Self>) {
        if self.monitoring_active.swap(true, Ordering::SeqCst) {
            debug!("Background monitoring already active");
            return;
        }

        let monitor = Arc::clone(self);
        let active = Arc::clone(&self.monitoring_active);
        let handle = tokio::spawn(async move {
            info!("Starting background connectivity verification");
            while active.load(Ordering::SeqCst) {
                let interval = if monitor.is_online() {
                    MonitorConfig::ONLINE_VERIFY_INTERVAL
                } else {
                    MonitorConfig::OFFLINE_RECHECK_INTERVAL
                };
                tokio::time::sleep(interval).await;
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                monitor.reevaluate();
            }
            info!("Background connectivity verification stopped");
        });
        *self.periodic_task.lock().expect("task lock poisoned") = Some(handle);
    }

    /// Stop periodic background verification.
    pub fn stop_monitoring(&self) {
        self.monitoring_active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.periodic_task.lock().expect("task lock poisoned").take() {
            handle.abort();
        }
    }

    /// Tear down all background tasks and listeners.
    pub fn shutdown(&self) {
        self.stop_monitoring();
        if let Some(handle) = self.event_task.lock().expect("task lock poisoned").take() {
            handle.abort();
        }
        self.listeners.lock().expect("listener lock poisoned").clear();
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
