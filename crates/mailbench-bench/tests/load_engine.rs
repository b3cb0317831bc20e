//! Load engine end-to-end tests against stub gateways
//!
//! Scenarios:
//! 1. Steady load: 2s at 50/s with 4 workers and a 5ms gateway
//! 2. Deterministic failures: every third call fails
//! 3. Eight workers share one rate and never lose a min/max update
//! 4. Rates above the timer resolution are delivered
//! 5. Runs that issue nothing report zeros
//! 6. A gateway that always fails still yields a result
//! 7. Cancellation returns a partial result promptly
//! 8. In-flight operations drain past the deadline
//! 9. The engine runs once

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use mailbench_bench::{generate_user_ids, EngineState, LoadSettings, RequestGenerator, StressTest};
use mailbench_core::{
    CoreError, CoreResult, ListRequest, Mail, MailOperationGateway, MailRequest,
    OperationWeights, SearchRequest,
};

/// Gateway stub that can fail every `fail_every`-th call.
///
/// Latency is constant, or cycles through 1..=`cycle_ms` milliseconds when a
/// cycle is set. Every call's measured duration is appended to `trace`.
struct StubGateway {
    latency: Duration,
    cycle_ms: Option<u64>,
    fail_every: Option<u64>,
    calls: AtomicU64,
    trace: Mutex<Vec<Duration>>,
}

impl StubGateway {
    fn new(latency: Duration, fail_every: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            latency,
            cycle_ms: None,
            fail_every,
            calls: AtomicU64::new(0),
            trace: Mutex::new(Vec::new()),
        })
    }

    fn cycling(cycle_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            latency: Duration::ZERO,
            cycle_ms: Some(cycle_ms),
            fail_every: None,
            calls: AtomicU64::new(0),
            trace: Mutex::new(Vec::new()),
        })
    }

    fn trace(&self) -> Vec<Duration> {
        self.trace.lock().clone()
    }

    async fn call(&self) -> CoreResult<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let latency = match self.cycle_ms {
            Some(cycle) => Duration::from_millis(1 + n % cycle),
            None => self.latency,
        };

        let started = Instant::now();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.trace.lock().push(started.elapsed());

        match self.fail_every {
            Some(every) if n % every == 0 => Err(CoreError::StorageError("injected".to_string())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MailOperationGateway for StubGateway {
    fn backend(&self) -> &'static str {
        "stub"
    }

    async fn create_mail(&self, _request: &MailRequest) -> CoreResult<()> {
        self.call().await
    }

    async fn list_mails(&self, _request: &ListRequest) -> CoreResult<Vec<Mail>> {
        self.call().await.map(|_| Vec::new())
    }

    async fn search_mails(&self, _request: &SearchRequest) -> CoreResult<Vec<Mail>> {
        self.call().await.map(|_| Vec::new())
    }
}

fn settings(workers: usize, rate: u32, duration: Duration) -> LoadSettings {
    LoadSettings {
        workers,
        request_rate: rate,
        duration,
        weights: OperationWeights {
            create_weight: 34,
            list_weight: 33,
            search_weight: 33,
        },
        progress_interval: Duration::ZERO,
    }
}

fn engine(settings: LoadSettings, gateway: Arc<StubGateway>) -> StressTest {
    let generator = RequestGenerator::with_seed(generate_user_ids(10), 1).unwrap();
    StressTest::new(settings, generator, gateway).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_steady_load_scenario() {
    let engine = engine(
        settings(4, 50, Duration::from_secs(2)),
        StubGateway::new(Duration::from_millis(5), None),
    );

    let result = engine.run(CancellationToken::new()).await.unwrap();

    assert!(
        (90..=110).contains(&result.total_requests),
        "expected ~100 requests, got {}",
        result.total_requests
    );
    assert_eq!(result.failed_requests, 0);
    assert_eq!(result.error_rate, 0.0);
    assert!(result.avg_response_time >= Duration::from_millis(4));
    assert!(
        result.avg_response_time < Duration::from_millis(15),
        "avg {:?}",
        result.avg_response_time
    );
    assert!(result.min_response_time <= result.avg_response_time);
    assert!(result.avg_response_time <= result.max_response_time);

    let summed: u64 = result.operation_stats.values().map(|s| s.count).sum();
    assert_eq!(summed, result.total_requests);
    assert_eq!(
        result.success_requests + result.failed_requests,
        result.total_requests
    );
    assert!(!result.interrupted);
    assert_eq!(engine.state(), EngineState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_third_call_fails() {
    let engine = engine(
        settings(4, 50, Duration::from_secs(2)),
        StubGateway::new(Duration::from_millis(5), Some(3)),
    );

    let result = engine.run(CancellationToken::new()).await.unwrap();

    assert!(result.failed_requests > 0);
    assert!(
        (30.0..=34.0).contains(&result.error_rate),
        "error rate {}",
        result.error_rate
    );
    let errors: u64 = result.operation_stats.values().map(|s| s.errors).sum();
    assert_eq!(errors, result.failed_requests);
    assert_eq!(
        result.success_requests + result.failed_requests,
        result.total_requests
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_workers_share_one_rate() {
    let gateway = StubGateway::cycling(8);
    let engine = engine(settings(8, 100, Duration::from_secs(1)), gateway.clone());

    let result = engine.run(CancellationToken::new()).await.unwrap();

    // Never more than one permit per period; the lower bound allows for scheduler jitter.
    assert!(
        result.total_requests <= 101,
        "rate exceeded: {}",
        result.total_requests
    );
    assert!(
        result.total_requests >= 85,
        "too few requests: {}",
        result.total_requests
    );

    // Every call the gateway saw was recorded, and min/max agree with the serial trace.
    let trace = gateway.trace();
    assert_eq!(trace.len() as u64, result.total_requests);
    let trace_min = *trace.iter().min().unwrap();
    let trace_max = *trace.iter().max().unwrap();
    let slack = Duration::from_millis(3);

    assert!(result.min_response_time >= trace_min);
    assert!(
        result.min_response_time <= trace_min + slack,
        "min {:?} vs trace {:?}",
        result.min_response_time,
        trace_min
    );
    assert!(result.max_response_time >= trace_max);
    assert!(
        result.max_response_time <= trace_max + slack,
        "max {:?} vs trace {:?}",
        result.max_response_time,
        trace_max
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_above_timer_resolution() {
    let engine = engine(
        settings(16, 5_000, Duration::from_secs(1)),
        StubGateway::new(Duration::ZERO, None),
    );

    let result = engine.run(CancellationToken::new()).await.unwrap();

    assert!(
        result.total_requests <= 5_001,
        "rate exceeded: {}",
        result.total_requests
    );
    assert!(
        result.total_requests >= 4_000,
        "too few requests: {}",
        result.total_requests
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_requests_reports_zeros() {
    // First permit is due after one second, past the deadline.
    let engine = engine(
        settings(2, 1, Duration::from_millis(300)),
        StubGateway::new(Duration::ZERO, None),
    );

    let result = engine.run(CancellationToken::new()).await.unwrap();

    assert_eq!(result.total_requests, 0);
    assert_eq!(result.avg_response_time, Duration::ZERO);
    assert_eq!(result.min_response_time, Duration::ZERO);
    assert_eq!(result.max_response_time, Duration::ZERO);
    assert_eq!(result.requests_per_second, 0.0);
    assert_eq!(result.error_rate, 0.0);
    assert!(result.requests_per_second.is_finite());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_total_failure_is_reportable() {
    let engine = engine(
        settings(2, 50, Duration::from_millis(500)),
        StubGateway::new(Duration::ZERO, Some(1)),
    );

    let result = engine.run(CancellationToken::new()).await.unwrap();

    assert!(result.total_requests > 0);
    assert_eq!(result.success_requests, 0);
    assert_eq!(result.error_rate, 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_returns_partial_result() {
    let engine = Arc::new(engine(
        settings(4, 100, Duration::from_secs(60)),
        StubGateway::new(Duration::from_millis(2), None),
    ));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), engine.run(cancel))
        .await
        .expect("engine should stop promptly after cancellation")
        .unwrap();

    assert!(result.interrupted);
    assert!(result.total_requests < 100);
    assert!(result.total_duration < Duration::from_secs(2));
    assert_eq!(engine.state(), EngineState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_in_flight_operations_drain() {
    // Ticks at 100ms and 200ms start 400ms calls that outlive the 500ms deadline.
    let engine = engine(
        settings(2, 10, Duration::from_millis(500)),
        StubGateway::new(Duration::from_millis(400), None),
    );

    let result = engine.run(CancellationToken::new()).await.unwrap();

    assert!(result.total_requests >= 2);
    assert_eq!(result.failed_requests, 0);
    assert!(result.max_response_time >= Duration::from_millis(400));
    assert!(result.total_duration >= Duration::from_millis(550));
}

#[tokio::test]
async fn test_engine_runs_once() {
    let engine = engine(
        settings(1, 10, Duration::from_millis(50)),
        StubGateway::new(Duration::ZERO, None),
    );
    assert_eq!(engine.state(), EngineState::Idle);

    engine.run(CancellationToken::new()).await.unwrap();
    let err = engine.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));
}

#[test]
fn test_zero_weights_rejected_before_running() {
    let mut bad = settings(1, 10, Duration::from_secs(1));
    bad.weights = OperationWeights {
        create_weight: 0,
        list_weight: 0,
        search_weight: 0,
    };
    let generator = RequestGenerator::new(generate_user_ids(2)).unwrap();
    let gateway = StubGateway::new(Duration::ZERO, None);

    assert!(StressTest::new(bad, generator, gateway).is_err());
}
