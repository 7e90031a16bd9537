//! Centralized configuration for the network resilience layer.
//!
//! The source deployments accumulated slightly different copies of these
//! constants at every call site; they are consolidated here as the single
//! policy, and every value is a tunable default rather than a contract.

use std::time::Duration;

/// Transport-level configuration.
pub struct TransportConfig;

impl TransportConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const QUICK_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
    pub const USER_AGENT: &'static str = "Roamsheet/1.0";
}

/// Connection quality monitoring thresholds.
pub struct MonitorConfig;

impl MonitorConfig {
    /// Effective bandwidth classes treated as the two lowest tiers.
    pub const SLOW_EFFECTIVE_TYPES: &'static [&'static str] = &["slow-2g", "2g"];
    /// Effective bandwidth class treated as top-tier.
    pub const FAST_EFFECTIVE_TYPE: &'static str = "4g";
    /// Downlink below this is slow regardless of class.
    pub const SLOW_DOWNLINK_MBPS: f64 = 0.5;
    /// Downlink above this is fast unless the class says otherwise.
    pub const FAST_DOWNLINK_MBPS: f64 = 2.0;
    /// Round-trip time above this is slow regardless of class.
    pub const SLOW_RTT_MS: u32 = 2000;
    /// Mobile platforms misreport immediately after resume; wait this long
    /// after a visibility-regained event before re-sampling.
    pub const VISIBILITY_DEBOUNCE: Duration = Duration::from_millis(300);
    /// With no connectivity hints available, degrade the optimistic Fast
    /// default to Slow once the shared failure streak passes this.
    pub const STREAK_DEGRADE_THRESHOLD: u32 = 3;
    /// Background re-verification interval while online.
    pub const ONLINE_VERIFY_INTERVAL: Duration = Duration::from_secs(300);
    /// Background re-check interval while offline.
    pub const OFFLINE_RECHECK_INTERVAL: Duration = Duration::from_secs(30);
}

/// Resource loader configuration.
pub struct LoaderConfig;

impl LoaderConfig {
    /// Concurrent fetches per batch on a fast connection.
    pub const BATCH_CONCURRENCY_FAST: usize = 4;
    /// Concurrent fetches per batch on a slow connection.
    pub const BATCH_CONCURRENCY_SLOW: usize = 2;
    /// Pause between priority batches on a slow connection.
    pub const INTER_BATCH_PAUSE: Duration = Duration::from_millis(500);
    pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(15);
    /// Query parameter appended to image URLs on repair.
    pub const CACHE_BUST_PARAM: &'static str = "rsbust";
}

/// Interception agent configuration.
pub struct AgentConfig;

impl AgentConfig {
    /// Bounded timeout for the network attempt under the freshness-first
    /// strategy. Doubled while the connection is slow.
    pub const NETWORK_FIRST_TIMEOUT: Duration = Duration::from_secs(5);
    /// Hot in-memory tier capacity (entries).
    pub const HOT_TIER_CAPACITY: u64 = 64;
    /// Hot in-memory tier TTL.
    pub const HOT_TIER_TTL: Duration = Duration::from_secs(60);
    /// Default TTL for persisted cache entries (1 day).
    pub const STORE_TTL: Duration = Duration::from_secs(86_400);
    /// Persisted cache size bound (64 MB).
    pub const STORE_MAX_BYTES: u64 = 67_108_864;
}

/// Diagnostics battery configuration.
pub struct DiagnosticsConfig;

impl DiagnosticsConfig {
    /// Number of latency samples taken per run. All samples are reported
    /// and the mean is computed naively, outliers included.
    pub const LATENCY_SAMPLES: usize = 5;
    /// Number of rapid requests in the burst stability probe.
    pub const BURST_PROBES: usize = 10;
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
    /// Completed runs kept for trend inspection.
    pub const HISTORY_CAP: usize = 20;

    // Scoring thresholds. The stability test itself passes at >= 80; the
    // Excellent rating requires strictly more than 80.
    pub const STABILITY_PASS_PCT: f64 = 80.0;
    pub const EXCELLENT_LATENCY_MS: f64 = 200.0;
    pub const GOOD_LATENCY_MS: f64 = 1000.0;
    pub const EXCELLENT_SUCCESS_PCT: f64 = 90.0;
    pub const GOOD_SUCCESS_PCT: f64 = 75.0;
    pub const POOR_SUCCESS_PCT: f64 = 50.0;
    pub const GOOD_STABILITY_PCT: f64 = 60.0;
    pub const POOR_STABILITY_PCT: f64 = 30.0;
}
