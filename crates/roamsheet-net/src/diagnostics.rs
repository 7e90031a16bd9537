//! On-demand connection diagnostics.
//!
//! Runs a fixed battery of synthetic probes (reachability, latency,
//! throughput, burst stability, name resolution) against the application
//! origin and produces a scored report with remediation hints. A single run
//! is allowed at a time; individual probe failures are recorded and never
//! abort the rest of the battery.

use crate::config::DiagnosticsConfig;
use crate::error::{NetError, Result};
use crate::monitor::{ConnectionMonitor, QualityTier};
use crate::retry::DeviceProfile;
use crate::transport::{HttpTransport, TransportRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Overall connection rating from joint probe thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallRating {
    Excellent,
    Good,
    Poor,
    Critical,
}

impl std::fmt::Display for OverallRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallRating::Excellent => write!(f, "excellent"),
            OverallRating::Good => write!(f, "good"),
            OverallRating::Poor => write!(f, "poor"),
            OverallRating::Critical => write!(f, "critical"),
        }
    }
}

/// Result of one probe in the battery.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// A completed diagnostic run. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRun {
    pub timestamp: DateTime<Utc>,
    pub results: Vec<TestResult>,
    pub overall: OverallRating,
    pub recommendations: Vec<String>,
}

/// Cheap status snapshot for frequent polling.
#[derive(Debug, Clone, Serialize)]
pub struct QuickStatus {
    pub online: bool,
    pub tier: QualityTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Diagnostics orchestrator.
pub struct Diagnostics {
    transport: Arc<dyn HttpTransport>,
    monitor: Arc<ConnectionMonitor>,
    device: DeviceProfile,
    origin: url::Url,
    /// Same-origin paths probed for reachability; the first one doubles as
    /// the latency/throughput/stability target.
    probe_paths: Vec<String>,
    resolve_hosts: Vec<String>,
    running: AtomicBool,
    history: Mutex<VecDeque<DiagnosticRun>>,
}

impl Diagnostics {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        monitor: Arc<ConnectionMonitor>,
        device: DeviceProfile,
        origin: url::Url,
    ) -> Self {
        let resolve_hosts = origin
            .host_str()
            .map(|h| vec![h.to_string()])
            .unwrap_or_default();
        Self {
            transport,
            monitor,
            device,
            origin,
            probe_paths: vec!["/".to_string(), "/favicon.ico".to_string()],
            resolve_hosts,
            running: AtomicBool::new(false),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_probe_paths(mut self, paths: Vec<String>) -> Self {
        if !paths.is_empty() {
            self.probe_paths = paths;
        }
        self
    }

    pub fn with_resolve_hosts(mut self, hosts: Vec<String>) -> Self {
        self.resolve_hosts = hosts;
        self
    }

    /// Completed runs, oldest first, bounded by the history cap.
    pub fn history(&self) -> Vec<DiagnosticRun> {
        self.history
            .lock()
            .expect("history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Cheap snapshot: monitor state plus one optional quick latency probe.
    pub async fn quick_status(&self) -> QuickStatus {
        let state = self.monitor.current_state();
        if !state.online {
            return QuickStatus {
                online: false,
                tier: state.tier,
                latency_ms: None,
            };
        }

        let started = Instant::now();
        let latency_ms = match self
            .transport
            .execute(TransportRequest::head(self.probe_url(&self.probe_paths[0])))
            .await
        {
            Ok(_) => Some(started.elapsed().as_millis() as u64),
            Err(_) => None,
        };

        QuickStatus {
            online: state.online,
            tier: state.tier,
            latency_ms,
        }
    }

    /// Run the full probe battery.
    ///
    /// Not reentrant: a second call while a run is in flight is rejected
    /// with `DiagnosticAlreadyRunning`.
    pub async fn run_full(&self) -> Result<DiagnosticRun> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(NetError::DiagnosticAlreadyRunning);
        }

        info!("Starting diagnostic battery");
        let run = self.run_battery().await;
        self.running.store(false, Ordering::SeqCst);

        let mut history = self.history.lock().expect("history lock poisoned");
        history.push_back(run.clone());
        while history.len() > DiagnosticsConfig::HISTORY_CAP {
            history.pop_front();
        }

        Ok(run)
    }

    async fn run_battery(&self) -> DiagnosticRun {
        let mut results = Vec::new();

        for path in &self.probe_paths {
            results.push(self.probe_reachability(path).await);
        }

        let latency = self.probe_latency().await;
        let mean_latency_ms = latency
            .details
            .as_ref()
            .and_then(|d| d.get("mean_ms"))
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::MAX);
        results.push(latency);

        results.push(self.probe_throughput().await);

        let stability = self.probe_stability().await;
        let stability_pct = stability
            .details
            .as_ref()
            .and_then(|d| d.get("success_rate"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        results.push(stability);

        let name_resolution = self.probe_name_resolution().await;
        let resolution_ok = name_resolution.success;
        results.push(name_resolution);

        let success_rate = if results.is_empty() {
            0.0
        } else {
            results.iter().filter(|r| r.success).count() as f64 / results.len() as f64 * 100.0
        };

        let overall = rate(success_rate, mean_latency_ms, stability_pct);
        let recommendations = self.recommendations(
            overall,
            mean_latency_ms,
            stability_pct,
            resolution_ok,
        );

        info!(
            "Diagnostic battery finished: {} (success rate {:.0}%, stability {:.0}%)",
            overall, success_rate, stability_pct
        );

        DiagnosticRun {
            timestamp: Utc::now(),
            results,
            overall,
            recommendations,
        }
    }

    // === Probes ===

    async fn probe_reachability(&self, path: &str) -> TestResult {
        let url = self.probe_url(path);
        let started = Instant::now();
        let outcome = self
            .transport
            .execute(
                TransportRequest::head(url.as_str())
                    .with_timeout(DiagnosticsConfig::PROBE_TIMEOUT),
            )
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            // Any response at all proves the origin is reachable
            Ok(response) => TestResult {
                name: format!("Reachability {}", path),
                success: true,
                duration_ms,
                error: None,
                details: Some(serde_json::json!({ "status": response.status })),
            },
            Err(error) => TestResult {
                name: format!("Reachability {}", path),
                success: false,
                duration_ms,
                error: Some(error.to_string()),
                details: None,
            },
        }
    }

    async fn probe_latency(&self) -> TestResult {
        let url = self.probe_url(&self.probe_paths[0]);
        let started = Instant::now();
        let mut samples_ms: Vec<u64> = Vec::new();
        let mut last_error = None;

        for _ in 0..DiagnosticsConfig::LATENCY_SAMPLES {
            let sample_start = Instant::now();
            match self
                .transport
                .execute(
                    TransportRequest::get(url.as_str())
                        .with_timeout(DiagnosticsConfig::PROBE_TIMEOUT),
                )
                .await
            {
                Ok(_) => samples_ms.push(sample_start.elapsed().as_millis() as u64),
                Err(error) => {
                    debug!("Latency sample failed: {}", error);
                    last_error = Some(error.to_string());
                }
            }
        }

        // All samples count; the mean is naive by design
        let mean_ms = if samples_ms.is_empty() {
            None
        } else {
            Some(samples_ms.iter().sum::<u64>() as f64 / samples_ms.len() as f64)
        };

        TestResult {
            name: "Network Latency".to_string(),
            success: mean_ms.is_some(),
            duration_ms: started.elapsed().as_millis() as u64,
            error: if mean_ms.is_some() { None } else { last_error },
            details: mean_ms.map(|mean| {
                serde_json::json!({
                    "samples_ms": samples_ms,
                    "mean_ms": mean,
                })
            }),
        }
    }

    async fn probe_throughput(&self) -> TestResult {
        let url = self.probe_url(&self.probe_paths[0]);
        let started = Instant::now();
        let outcome = self
            .transport
            .execute(
                TransportRequest::get(url.as_str()).with_timeout(DiagnosticsConfig::PROBE_TIMEOUT),
            )
            .await;
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;

        match outcome {
            Ok(response) => {
                let bytes = response.body.len() as f64;
                let kbps = if elapsed.as_secs_f64() > 0.0 {
                    bytes * 8.0 / 1000.0 / elapsed.as_secs_f64()
                } else {
                    0.0
                };
                TestResult {
                    name: "Throughput".to_string(),
                    success: true,
                    duration_ms,
                    error: None,
                    details: Some(serde_json::json!({
                        "bytes": bytes as u64,
                        "kbps": kbps,
                    })),
                }
            }
            Err(error) => TestResult {
                name: "Throughput".to_string(),
                success: false,
                duration_ms,
                error: Some(error.to_string()),
                details: None,
            },
        }
    }

    async fn probe_stability(&self) -> TestResult {
        let url = self.probe_url(&self.probe_paths[0]);
        let started = Instant::now();
        let total = DiagnosticsConfig::BURST_PROBES;

        let outcomes = futures::future::join_all((0..total).map(|_| {
            let transport = self.transport.clone();
            let url = url.clone();
            async move {
                transport
                    .execute(
                        TransportRequest::get(url.as_str())
                            .with_timeout(DiagnosticsConfig::PROBE_TIMEOUT),
                    )
                    .await
                    .is_ok()
            }
        }))
        .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let success_rate = succeeded as f64 / total as f64 * 100.0;

        TestResult {
            name: "Connection Stability".to_string(),
            success: success_rate >= DiagnosticsConfig::STABILITY_PASS_PCT,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
            details: Some(serde_json::json!({
                "succeeded": succeeded,
                "total": total,
                "success_rate": success_rate,
            })),
        }
    }

    async fn probe_name_resolution(&self) -> TestResult {
        let started = Instant::now();
        let mut failed: Vec<String> = Vec::new();

        for host in &self.resolve_hosts {
            let lookup = tokio::time::timeout(
                DiagnosticsConfig::PROBE_TIMEOUT,
                tokio::net::lookup_host((host.as_str(), 443)),
            )
            .await;
            let resolved = match lookup {
                Ok(Ok(mut addrs)) => addrs.next().is_some(),
                _ => false,
            };
            if !resolved {
                warn!("Name resolution failed for {}", host);
                failed.push(host.clone());
            }
        }

        TestResult {
            name: "Name Resolution".to_string(),
            success: failed.is_empty(),
            duration_ms: started.elapsed().as_millis() as u64,
            error: if failed.is_empty() {
                None
            } else {
                Some(format!("Unresolvable hosts: {}", failed.join(", ")))
            },
            details: Some(serde_json::json!({
                "hosts": self.resolve_hosts,
                "failed": failed,
            })),
        }
    }

    // === Scoring helpers ===

    fn recommendations(
        &self,
        overall: OverallRating,
        mean_latency_ms: f64,
        stability_pct: f64,
        resolution_ok: bool,
    ) -> Vec<String> {
        let mut out = Vec::new();
        let tier = self.monitor.tier();

        if tier == QualityTier::Offline {
            out.push(
                "You appear to be offline. Check airplane mode and move to an area with \
                 coverage, then use Retry."
                    .to_string(),
            );
        } else if tier == QualityTier::Slow {
            out.push(
                "Your connection is slow. Switch to Wi-Fi if available; entries will sync \
                 faster."
                    .to_string(),
            );
        }

        if mean_latency_ms > 2000.0 && mean_latency_ms != f64::MAX {
            out.push(
                "Very high latency detected, which often indicates carrier proxy \
                 interference. Try a different network."
                    .to_string(),
            );
        }

        if stability_pct < DiagnosticsConfig::GOOD_STABILITY_PCT {
            out.push(
                "The connection is dropping requests. Stay stationary while submitting \
                 timesheets, or retry later."
                    .to_string(),
            );
        }

        if !resolution_ok {
            // Dedicated remediation steps for carrier/browser interference
            out.push("Name resolution is failing. Corrective steps:".to_string());
            out.push("1. Disable any data-saver or proxy feature in your browser.".to_string());
            out.push("2. Toggle airplane mode to re-register with the carrier.".to_string());
            out.push("3. Switch to a different Wi-Fi network or hotspot.".to_string());
            out.push("4. If the problem persists, update or change your browser.".to_string());
        }

        if self.device.constrained
            && matches!(overall, OverallRating::Poor | OverallRating::Critical)
        {
            out.push(
                "Close background apps that may be competing for bandwidth on this device."
                    .to_string(),
            );
        }

        if out.is_empty() {
            out.push("Connection looks healthy. No action needed.".to_string());
        }

        out
    }

    fn probe_url(&self, path: &str) -> String {
        self.origin
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.origin, path))
    }
}

/// Joint-threshold rating of the scored dimensions.
///
/// The `Excellent` stability bound is exclusive: exactly 80% stability is
/// not excellent, though the stability probe itself passes at 80%.
fn rate(success_rate: f64, mean_latency_ms: f64, stability_pct: f64) -> OverallRating {
    if success_rate >= DiagnosticsConfig::EXCELLENT_SUCCESS_PCT
        && mean_latency_ms < DiagnosticsConfig::EXCELLENT_LATENCY_MS
        && stability_pct > DiagnosticsConfig::STABILITY_PASS_PCT
    {
        OverallRating::Excellent
    } else if success_rate >= DiagnosticsConfig::GOOD_SUCCESS_PCT
        && mean_latency_ms < DiagnosticsConfig::GOOD_LATENCY_MS
        && stability_pct >= DiagnosticsConfig::GOOD_STABILITY_PCT
    {
        OverallRating::Good
    } else if success_rate >= DiagnosticsConfig::POOR_SUCCESS_PCT
        && stability_pct >= DiagnosticsConfig::POOR_STABILITY_PCT
    {
        OverallRating::Poor
    } else {
        OverallRating::Critical
    }
}
