//! Retry execution with exponential backoff and jitter.
//!
//! Provides:
//! - Exponential backoff with a uniform jitter term and a hard cap
//! - Quality-tier and device-profile delay multipliers
//! - A process-wide failure streak that escalates caution under sustained
//!   degradation and resets on any success
//! - Offline-aware retries: a retry due while the connection is offline
//!   waits for connectivity instead of burning an attempt
//!
//! Within one session attempts are strictly sequential; the next attempt
//! never starts before the previous outcome is known.

use crate::cancel::CancellationToken;
use crate::error::{NetError, Result};
use crate::monitor::{ConnectionMonitor, QualityTier};
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared count of consecutive failed attempts across all operations.
///
/// Incremented on every failed attempt regardless of which operation it
/// belongs to; reset to zero on any success. Distinguishes sustained
/// degradation from isolated transient errors.
#[derive(Debug, Clone, Default)]
pub struct FailureStreak(Arc<AtomicU32>);

impl FailureStreak {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Record one failed attempt, returning the new streak length.
    pub fn record_failure(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reset the streak on success or explicit recovery.
    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries beyond the first attempt.
    pub max_retries: u32,
    /// Base delay; doubles each retry.
    pub base_delay: Duration,
    /// Cap on the exponential term (jitter included, multipliers excluded).
    pub max_delay: Duration,
    /// Whether to add uniform random jitter (0..1000 ms) to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Execution context the layer runs in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceProfile {
    /// Higher-latency execution context (mobile hardware / webview).
    pub constrained: bool,
}

impl DeviceProfile {
    pub fn desktop() -> Self {
        Self { constrained: false }
    }

    pub fn mobile() -> Self {
        Self { constrained: true }
    }
}

/// One in-flight retried operation. Created per `execute` call, destroyed
/// on success or final failure; never shared across operations.
#[derive(Debug)]
pub struct RetrySession {
    pub operation_id: Uuid,
    pub label: String,
    /// 1-based count of attempts made so far; never exceeds
    /// `max_retries + 1`.
    pub attempt: u32,
    pub started_at: Instant,
}

impl RetrySession {
    fn new(label: &str) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            label: label.to_string(),
            attempt: 0,
            started_at: Instant::now(),
        }
    }
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total backoff delay accumulated.
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded.
    pub success: bool,
    /// Last error message if failed.
    pub last_error: Option<String>,
}

/// Backoff-driven retry executor.
pub struct RetryController {
    monitor: Arc<ConnectionMonitor>,
    streak: FailureStreak,
    config: RetryConfig,
    device: DeviceProfile,
}

impl RetryController {
    pub fn new(
        monitor: Arc<ConnectionMonitor>,
        streak: FailureStreak,
        config: RetryConfig,
        device: DeviceProfile,
    ) -> Self {
        Self {
            monitor,
            streak,
            config,
            device,
        }
    }

    /// Current length of the shared failure streak.
    pub fn failure_streak(&self) -> u32 {
        self.streak.get()
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `retry_index` (0-based), for the given
    /// tier and streak:
    /// `min(max_delay, base * 2^index + jitter) * quality * device`.
    pub fn delay_for_retry(&self, retry_index: u32, tier: QualityTier, streak: u32) -> Duration {
        let exponential =
            self.config.base_delay.as_millis() as f64 * 2f64.powi(retry_index as i32);
        let jitter = if self.config.jitter {
            rand::rng().random_range(0.0..1000.0)
        } else {
            0.0
        };
        let capped = (exponential + jitter).min(self.config.max_delay.as_millis() as f64);

        let quality = quality_multiplier(tier, streak);
        let device = device_multiplier(self.device, streak);

        Duration::from_millis((capped * quality * device) as u64)
    }

    /// Execute an operation with retries.
    ///
    /// The closure receives an attempt-scoped cancellation token; cancelling
    /// it fails that attempt only. Cancelling `session` abandons the whole
    /// operation and surfaces `Cancelled` immediately.
    pub async fn execute<F, Fut, T>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_cancellable(label, CancellationToken::new(), op)
            .await
    }

    /// Execute with a caller-owned session token, returning only the result.
    pub async fn execute_cancellable<F, Fut, T>(
        &self,
        label: &str,
        session_token: CancellationToken,
        op: F,
    ) -> Result<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (result, _stats) = self
            .execute_with_stats(label, session_token, op)
            .await;
        result
    }

    /// Execute with retries, also returning per-operation statistics.
    pub async fn execute_with_stats<F, Fut, T>(
        &self,
        label: &str,
        session_token: CancellationToken,
        mut op: F,
    ) -> (Result<T>, RetryStats)
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut session = RetrySession::new(label);
        let mut stats = RetryStats::default();

        loop {
            if session_token.is_cancelled() {
                stats.last_error = Some(NetError::Cancelled.to_string());
                return (Err(NetError::Cancelled), stats);
            }

            session.attempt += 1;
            stats.attempts = session.attempt;

            let attempt_token = session_token.attempt();
            match op(attempt_token).await {
                Ok(value) => {
                    self.streak.reset();
                    if session.attempt > 1 {
                        debug!(
                            "{} [{}] succeeded after {} attempts",
                            session.label, session.operation_id, session.attempt
                        );
                    }
                    stats.success = true;
                    return (Ok(value), stats);
                }
                Err(error) => {
                    stats.last_error = Some(error.to_string());
                    let streak = self.streak.record_failure();

                    // Caller-initiated abandonment surfaces as-is; an
                    // attempt-level cancellation (internal timeout) is an
                    // ordinary retryable failure.
                    if matches!(error, NetError::Cancelled) && session_token.is_cancelled() {
                        return (Err(NetError::Cancelled), stats);
                    }

                    let retryable =
                        error.is_retryable() || matches!(error, NetError::Cancelled);
                    if !retryable {
                        debug!(
                            "{} [{}] failed with non-retryable error: {}",
                            session.label, session.operation_id, error
                        );
                        return (Err(error), stats);
                    }

                    if session.attempt > self.config.max_retries {
                        warn!(
                            "{} [{}] exhausted after {} attempts: {}",
                            session.label, session.operation_id, session.attempt, error
                        );
                        return (Err(error), stats);
                    }

                    let tier = self.monitor.tier();
                    let delay = self.delay_for_retry(session.attempt - 1, tier, streak);
                    stats.total_delay += delay;

                    warn!(
                        "{} [{}] attempt {}/{} failed: {}. Retrying in {:?} (streak {})",
                        session.label,
                        session.operation_id,
                        session.attempt,
                        self.config.max_retries + 1,
                        error,
                        delay,
                        streak
                    );

                    tokio::time::sleep(delay).await;

                    // Connectivity may have dropped during the backoff wait;
                    // suspend rather than burn an attempt on a request known
                    // to fail.
                    if self.monitor.tier() == QualityTier::Offline {
                        debug!(
                            "{} [{}] offline before retry, waiting for connectivity",
                            session.label, session.operation_id
                        );
                        self.monitor.wait_until_online().await;
                    }
                }
            }
        }
    }
}

fn quality_multiplier(tier: QualityTier, streak: u32) -> f64 {
    if tier == QualityTier::Slow {
        2.0
    } else if streak > 3 {
        1.5
    } else {
        1.0
    }
}

fn device_multiplier(device: DeviceProfile, streak: u32) -> f64 {
    if !device.constrained {
        1.0
    } else if streak > 2 {
        2.0
    } else {
        1.5
    }
}
