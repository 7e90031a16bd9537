//! Integration tests for the assembled resilience stack.
//!
//! Drives the public `NetStack` surface end to end with a scripted
//! transport and a hand-cranked signal provider: retry escalation, offline
//! suspension, cache strategies, generation purges, and the diagnostics
//! battery.

use async_trait::async_trait;
use bytes::Bytes;
use roamsheet_net::{
    ByteStore, ConnectivitySignals, Destination, DeviceProfile, HttpTransport, InterceptedRequest,
    MemoryStore, NetError, NetStack, QualityTier, ResourceDescriptor, ResourceKind, RetryConfig,
    ServedFrom, SignalEvent, SignalSample, TransportRequest, TransportResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One scripted transport outcome.
#[derive(Clone, Copy)]
enum Outcome {
    Ok(u16, &'static str),
    Timeout,
    Reset,
}

impl Outcome {
    fn produce(self, request: &TransportRequest) -> roamsheet_net::Result<TransportResponse> {
        match self {
            Outcome::Ok(status, body) => Ok(TransportResponse {
                status,
                body: Bytes::from_static(body.as_bytes()),
            }),
            Outcome::Timeout => Err(NetError::Timeout(request.timeout)),
            Outcome::Reset => Err(NetError::ConnectionReset {
                url: request.url.clone(),
                message: "connection reset by peer".to_string(),
            }),
        }
    }
}

/// Transport fake: per-URL outcome queues with a configurable fallback.
struct ScriptedTransport {
    queues: Mutex<HashMap<String, VecDeque<Outcome>>>,
    defaults: Mutex<HashMap<String, Outcome>>,
    delay: Duration,
    requests: AtomicUsize,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            queues: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            delay,
            requests: AtomicUsize::new(0),
        })
    }

    fn enqueue(&self, url: &str, outcomes: &[Outcome]) {
        let mut queues = self.queues.lock().unwrap();
        queues
            .entry(url.to_string())
            .or_default()
            .extend(outcomes.iter().copied());
    }

    fn set_default(&self, url: &str, outcome: Outcome) {
        self.defaults
            .lock()
            .unwrap()
            .insert(url.to_string(), outcome);
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> roamsheet_net::Result<TransportResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }

        let queued = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|q| q.pop_front());
        let outcome = queued.unwrap_or_else(|| {
            self.defaults
                .lock()
                .unwrap()
                .get(&request.url)
                .copied()
                .unwrap_or(Outcome::Ok(200, "ok"))
        });
        outcome.produce(&request)
    }
}

/// Hand-cranked connectivity provider.
struct TestSignals {
    sample: Mutex<SignalSample>,
    senders: Mutex<Vec<mpsc::UnboundedSender<SignalEvent>>>,
}

impl TestSignals {
    fn new(sample: SignalSample) -> Arc<Self> {
        Arc::new(Self {
            sample: Mutex::new(sample),
            senders: Mutex::new(Vec::new()),
        })
    }

    fn online_fast() -> Arc<Self> {
        Self::new(SignalSample {
            online: true,
            effective_type: Some("4g".to_string()),
            downlink_mbps: Some(10.0),
            rtt_ms: Some(50),
        })
    }

    fn online_slow() -> Arc<Self> {
        Self::new(SignalSample {
            online: true,
            effective_type: Some("2g".to_string()),
            downlink_mbps: Some(0.2),
            rtt_ms: Some(900),
        })
    }

    fn go_offline(&self) {
        *self.sample.lock().unwrap() = SignalSample {
            online: false,
            ..Default::default()
        };
        self.emit(SignalEvent::Offline);
    }

    fn go_online_fast(&self) {
        *self.sample.lock().unwrap() = SignalSample {
            online: true,
            effective_type: Some("4g".to_string()),
            downlink_mbps: Some(10.0),
            rtt_ms: Some(50),
        };
        self.emit(SignalEvent::Online);
    }

    fn emit(&self, event: SignalEvent) {
        for tx in self.senders.lock().unwrap().iter() {
            let _ = tx.send(event);
        }
    }
}

impl ConnectivitySignals for TestSignals {
    fn sample(&self) -> SignalSample {
        self.sample.lock().unwrap().clone()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SignalEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        rx
    }
}

fn quick_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(max_retries)
        .with_base_delay(Duration::from_millis(2))
        .with_max_delay(Duration::from_millis(50))
        .with_jitter(false)
}

fn stack_with(
    transport: Arc<ScriptedTransport>,
    signals: Arc<TestSignals>,
    retry: RetryConfig,
) -> NetStack {
    NetStack::builder("https://app.roamsheet.io")
        .generation("v1")
        .transport(transport)
        .signals(signals)
        .store(Arc::new(MemoryStore::new()))
        .device(DeviceProfile::desktop())
        .retry_config(retry)
        .build()
        .expect("stack should build")
}

#[tokio::test]
async fn scenario_timeouts_then_success_on_fourth_attempt() {
    let transport = ScriptedTransport::new();
    let url = "https://app.roamsheet.io/api/timesheets";
    transport.enqueue(
        url,
        &[
            Outcome::Timeout,
            Outcome::Timeout,
            Outcome::Timeout,
            Outcome::Ok(200, "week-32"),
        ],
    );

    let stack = stack_with(transport.clone(), TestSignals::online_fast(), quick_retry(5));
    assert_eq!(stack.tier(), QualityTier::Fast);

    let transport_for_op = transport.clone();
    let result = stack
        .retry()
        .execute("timesheets", move |attempt| {
            let transport = transport_for_op.clone();
            async move {
                let response = transport
                    .execute(
                        TransportRequest::get("https://app.roamsheet.io/api/timesheets")
                            .with_cancel(attempt),
                    )
                    .await?;
                response.require_success("https://app.roamsheet.io/api/timesheets")
            }
        })
        .await
        .expect("fourth attempt succeeds");

    assert_eq!(result.body, Bytes::from_static(b"week-32"));
    // Exactly four network attempts were made
    assert_eq!(transport.request_count(), 4);
    // The success wiped the streak
    assert_eq!(stack.status().failure_streak, 0);
}

#[tokio::test]
async fn scenario_exhaustion_surfaces_concrete_error_within_delay_bounds() {
    let transport = ScriptedTransport::new();
    let url = "https://app.roamsheet.io/api/approvals";
    transport.set_default(url, Outcome::Reset);

    let config = quick_retry(5);
    let stack = stack_with(transport.clone(), TestSignals::online_slow(), config.clone());
    assert_eq!(stack.tier(), QualityTier::Slow);

    let started = Instant::now();
    let transport_for_op = transport.clone();
    let result = stack
        .retry()
        .execute("approvals", move |attempt| {
            let transport = transport_for_op.clone();
            async move {
                transport
                    .execute(
                        TransportRequest::get("https://app.roamsheet.io/api/approvals")
                            .with_cancel(attempt),
                    )
                    .await
                    .map(|_| ())
            }
        })
        .await;
    let elapsed = started.elapsed();

    // All six attempts burned, and the concrete error type comes back
    assert_eq!(transport.request_count(), 6);
    match result.unwrap_err() {
        NetError::ConnectionReset { message, .. } => {
            assert_eq!(message, "connection reset by peer");
        }
        other => panic!("expected ConnectionReset, got {other}"),
    }

    // Five delays, each capped by max_delay, doubled under the slow tier
    let per_delay_bound = config.max_delay * 2;
    assert!(
        elapsed < per_delay_bound * 5 + Duration::from_secs(1),
        "elapsed {elapsed:?} exceeded the delay bound"
    );
}

#[tokio::test]
async fn scenario_stability_boundary_at_eighty_percent() {
    let transport = ScriptedTransport::new();
    let ping = "https://app.roamsheet.io/";
    // Battery order: 2 reachability paths, 5 latency samples, 1 throughput,
    // then the 10-probe burst with exactly two failures.
    transport.enqueue(
        ping,
        &[Outcome::Ok(200, "ok"); 7],
    );
    transport.enqueue(
        ping,
        &[
            Outcome::Timeout,
            Outcome::Timeout,
            Outcome::Ok(200, "ok"),
            Outcome::Ok(200, "ok"),
            Outcome::Ok(200, "ok"),
            Outcome::Ok(200, "ok"),
            Outcome::Ok(200, "ok"),
            Outcome::Ok(200, "ok"),
            Outcome::Ok(200, "ok"),
            Outcome::Ok(200, "ok"),
        ],
    );

    let stack = stack_with(transport, TestSignals::online_fast(), quick_retry(1));
    let run = stack.diagnostics().run_full().await.unwrap();

    let stability = run
        .results
        .iter()
        .find(|r| r.name == "Connection Stability")
        .expect("stability result present");
    let details = stability.details.as_ref().unwrap();
    assert_eq!(details["success_rate"], 80.0);
    assert_eq!(details["succeeded"], 8);
    // Exactly 80% passes the stability probe itself
    assert!(stability.success);
    // but the overall rating stays below excellent
    assert_ne!(format!("{}", run.overall), "excellent");
}

#[tokio::test]
async fn scenario_generation_purge_drops_prior_entries() {
    let transport = ScriptedTransport::new();
    let store = Arc::new(MemoryStore::new());
    let asset = "https://app.roamsheet.io/assets/app.js";
    transport.set_default(asset, Outcome::Ok(200, "v1-bundle"));

    let build = |generation: &str| {
        NetStack::builder("https://app.roamsheet.io")
            .generation(generation)
            .transport(transport.clone())
            .signals(TestSignals::online_fast())
            .store(store.clone())
            .retry_config(quick_retry(1))
            .build()
            .unwrap()
    };

    // Cache an entry under v1
    let v1 = build("v1");
    let response = v1
        .agent()
        .intercept(InterceptedRequest::new(asset, Destination::Script))
        .await
        .unwrap();
    assert_eq!(response.served_from, ServedFrom::Network);
    assert!(store.list_keys().unwrap().iter().any(|k| k.starts_with("v1|")));
    drop(v1);

    // Activating v2 purges every v1-tagged entry
    let v2 = build("v2");
    assert!(store.list_keys().unwrap().iter().all(|k| k.starts_with("v2|")));

    // The old payload is gone; the request goes back to the network
    transport.set_default(asset, Outcome::Ok(200, "v2-bundle"));
    let response = v2
        .agent()
        .intercept(InterceptedRequest::new(asset, Destination::Script))
        .await
        .unwrap();
    assert_eq!(response.served_from, ServedFrom::Network);
    assert_eq!(response.body, Bytes::from_static(b"v2-bundle"));
}

#[tokio::test]
async fn scenario_offline_mid_wait_suspends_retries_until_recovery() {
    let transport = ScriptedTransport::new();
    let url = "https://app.roamsheet.io/api/timesheets";
    transport.enqueue(url, &[Outcome::Timeout, Outcome::Ok(200, "synced")]);

    let signals = TestSignals::online_fast();
    let stack = Arc::new(stack_with(
        transport.clone(),
        signals.clone(),
        RetryConfig::new()
            .with_max_retries(5)
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(false),
    ));

    let task = {
        let stack = stack.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            stack
                .retry()
                .execute("sync", move |attempt| {
                    let transport = transport.clone();
                    async move {
                        let response = transport
                            .execute(
                                TransportRequest::get(
                                    "https://app.roamsheet.io/api/timesheets",
                                )
                                .with_cancel(attempt),
                            )
                            .await?;
                        response.require_success("https://app.roamsheet.io/api/timesheets")
                    }
                })
                .await
        })
    };

    // First attempt fails immediately; connectivity drops during the
    // backoff wait.
    tokio::time::sleep(Duration::from_millis(30)).await;
    signals.go_offline();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stack.tier(), QualityTier::Offline);

    // Well past the backoff delay: the retry is suspended, not burning
    // attempts against a dead link.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!task.is_finished());
    assert_eq!(transport.request_count(), 1);

    // Connectivity returns; the suspended retry resumes and succeeds.
    signals.go_online_fast();
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("retry should resume after recovery")
        .unwrap();
    assert_eq!(result.unwrap().body, Bytes::from_static(b"synced"));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn cache_first_serves_before_slow_network_completes() {
    // Every network round-trip takes 150 ms
    let transport = ScriptedTransport::with_delay(Duration::from_millis(150));
    let asset = "https://app.roamsheet.io/assets/app.css";
    transport.set_default(asset, Outcome::Ok(200, "styles"));

    let stack = stack_with(transport.clone(), TestSignals::online_fast(), quick_retry(1));

    // Prime the cache
    stack
        .agent()
        .intercept(InterceptedRequest::new(asset, Destination::Stylesheet))
        .await
        .unwrap();

    let started = Instant::now();
    let response = stack
        .agent()
        .intercept(InterceptedRequest::new(asset, Destination::Stylesheet))
        .await
        .unwrap();

    assert_eq!(response.served_from, ServedFrom::Cache);
    // Served well before the 150 ms network round-trip could finish
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn freshness_first_falls_back_to_cache_then_synthesizes() {
    let transport = ScriptedTransport::new();
    let api = "https://app.roamsheet.io/api/approvals";

    let stack = stack_with(transport.clone(), TestSignals::online_fast(), quick_retry(1));

    // No cache entry yet: total failure synthesizes a structured response
    transport.set_default(api, Outcome::Timeout);
    let response = stack
        .agent()
        .intercept(InterceptedRequest::new(api, Destination::Api))
        .await
        .unwrap();
    assert_eq!(response.served_from, ServedFrom::SynthesizedError);
    assert_eq!(response.status, 503);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["reason"], "no_cache_available");

    // Populate the cache, then fail the network again
    transport.set_default(api, Outcome::Ok(200, "approved"));
    stack
        .agent()
        .intercept(InterceptedRequest::new(api, Destination::Api))
        .await
        .unwrap();
    transport.set_default(api, Outcome::Timeout);

    let response = stack
        .agent()
        .intercept(InterceptedRequest::new(api, Destination::Api))
        .await
        .unwrap();
    assert_eq!(response.served_from, ServedFrom::Cache);
    assert_eq!(response.body, Bytes::from_static(b"approved"));
}

#[tokio::test]
async fn loader_is_idempotent_across_the_stack() {
    let transport = ScriptedTransport::new();
    let stack = stack_with(transport.clone(), TestSignals::online_fast(), quick_retry(1));

    let descriptor = ResourceDescriptor::new(
        "https://cdn.roamsheet.io/chunks/entry.js",
        ResourceKind::Script,
    );

    assert!(stack.loader().load(&descriptor).await.unwrap());
    let after_first = transport.request_count();

    // Second load performs zero additional network activity
    assert!(stack.loader().load(&descriptor).await.unwrap());
    assert_eq!(transport.request_count(), after_first);
}

#[tokio::test]
async fn error_responses_never_poison_the_cache() {
    let transport = ScriptedTransport::new();
    let store = Arc::new(MemoryStore::new());
    let api = "https://app.roamsheet.io/api/timesheets";
    transport.set_default(api, Outcome::Ok(500, "error page"));

    let stack = NetStack::builder("https://app.roamsheet.io")
        .generation("v1")
        .transport(transport.clone())
        .signals(TestSignals::online_fast())
        .store(store.clone())
        .retry_config(quick_retry(1))
        .build()
        .unwrap();

    let response = stack
        .agent()
        .intercept(InterceptedRequest::new(api, Destination::Api))
        .await
        .unwrap();

    // Without a cache entry, the failure synthesizes; nothing was written
    assert_eq!(response.served_from, ServedFrom::SynthesizedError);
    assert!(store.list_keys().unwrap().is_empty());
}

#[tokio::test]
async fn offline_banner_subscription_sees_tier_transitions() {
    let transport = ScriptedTransport::new();
    let signals = TestSignals::online_fast();
    let stack = stack_with(transport, signals.clone(), quick_retry(1));

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let transitions_clone = transitions.clone();
    let _subscription = stack.subscribe(move |state| {
        transitions_clone.lock().unwrap().push(state.tier);
    });

    signals.go_offline();
    tokio::time::sleep(Duration::from_millis(50)).await;
    signals.go_online_fast();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = transitions.lock().unwrap().clone();
    assert_eq!(seen, vec![QualityTier::Offline, QualityTier::Fast]);
}
