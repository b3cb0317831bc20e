//! Rate-limited load engine
//!
//! A fixed pool of workers shares one [`RateLimiter`] and a wall-clock
//! deadline. Each worker reports every finished operation over a channel to
//! a single aggregator task, which owns all statistics.
//!
//! # States
//!
//! - **Idle**: constructed, not yet started
//! - **Running**: workers launched and issuing operations
//! - **Draining**: deadline passed or caller cancelled; in-flight operations
//!   finish, no new ones start
//! - **Completed**: all workers joined, result frozen
//!
//! # Example
//!
//! ```ignore
//! let engine = StressTest::new(LoadSettings::from_config(&cfg.stress_test), generator, gateway)?;
//! let result = engine.run(CancellationToken::new()).await?;
//! println!("{} requests, {:.2}% errors", result.total_requests, result.error_rate);
//! ```

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mailbench_core::config::{StressTestConfig, MAX_REQUEST_RATE};
use mailbench_core::metrics::{status_label, ACTIVE_WORKERS, OPERATIONS_TOTAL, OPERATION_DURATION};
use mailbench_core::{CoreError, CoreResult, MailOperationGateway, OperationWeights};

use crate::generator::RequestGenerator;
use crate::operation::OperationKind;
use crate::rate_limiter::RateLimiter;
use crate::selector::OperationSelector;
use crate::stats::{OperationOutcome, StatsAccumulator, StressTestResult};

/// Load engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Running,
    Draining,
    Completed,
}

/// Knobs for one load run.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub workers: usize,
    pub request_rate: u32,
    pub duration: Duration,
    pub weights: OperationWeights,
    /// Zero disables progress logging.
    pub progress_interval: Duration,
}

impl LoadSettings {
    pub fn from_config(config: &StressTestConfig) -> Self {
        Self {
            workers: config.concurrent_workers,
            request_rate: config.request_rate,
            duration: config.duration(),
            weights: config.operations,
            progress_interval: config.progress_interval(),
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.workers == 0 {
            return Err(CoreError::ValidationError(
                "worker count must be > 0".to_string(),
            ));
        }
        if self.request_rate == 0 || self.request_rate > MAX_REQUEST_RATE {
            return Err(CoreError::ValidationError(format!(
                "request rate must be in 1..={MAX_REQUEST_RATE}"
            )));
        }
        if self.duration.is_zero() {
            return Err(CoreError::ValidationError(
                "duration must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fixed-duration, fixed-concurrency load test.
pub struct StressTest {
    settings: LoadSettings,
    selector: OperationSelector,
    generator: RequestGenerator,
    gateway: Arc<dyn MailOperationGateway>,
    state: Mutex<EngineState>,
}

impl StressTest {
    /// Validates settings up front so a misconfigured run never starts.
    pub fn new(
        settings: LoadSettings,
        generator: RequestGenerator,
        gateway: Arc<dyn MailOperationGateway>,
    ) -> CoreResult<Self> {
        settings.validate()?;
        let selector = OperationSelector::new(settings.weights)?;
        Ok(Self {
            settings,
            selector,
            generator,
            gateway,
            state: Mutex::new(EngineState::Idle),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    fn transition(&self, from: EngineState, to: EngineState) -> CoreResult<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(CoreError::invalid_state(format!(
                "load engine is {:?}, expected {:?}",
                *state, from
            )));
        }
        debug!(from = ?from, to = ?to, "Load engine state change");
        *state = to;
        Ok(())
    }

    /// Runs the load test to its deadline or until `cancel` fires.
    ///
    /// Individual operation failures are counted, never returned. Cancellation
    /// yields the partial result gathered so far. A second call fails with
    /// `InvalidState`.
    pub async fn run(&self, cancel: CancellationToken) -> CoreResult<StressTestResult> {
        self.transition(EngineState::Idle, EngineState::Running)?;

        let settings = &self.settings;
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + settings.duration;

        info!(
            workers = settings.workers,
            rate = settings.request_rate,
            duration_secs = settings.duration.as_secs_f64(),
            backend = self.gateway.backend(),
            "Starting stress test"
        );

        let limiter_stop = cancel.child_token();
        let limiter = Arc::new(RateLimiter::start(settings.request_rate, limiter_stop.clone()));

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let aggregator = tokio::spawn(aggregate(outcome_rx, settings.progress_interval, start));

        let workers: Vec<JoinHandle<u64>> = (0..settings.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    generator: self.generator.fork(id as u64),
                    selector: self.selector,
                    gateway: Arc::clone(&self.gateway),
                    limiter: Arc::clone(&limiter),
                    outcomes: outcome_tx.clone(),
                    cancel: cancel.clone(),
                    deadline,
                };
                tokio::spawn(worker.run())
            })
            .collect();
        drop(outcome_tx);

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = sleep_until(deadline) => {}
        }
        self.transition(EngineState::Running, EngineState::Draining)?;
        info!(cancelled = cancel.is_cancelled(), "Draining in-flight operations");

        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task failed");
            }
        }
        limiter_stop.cancel();
        let elapsed = start.elapsed();

        let stats = aggregator
            .await
            .map_err(|e| CoreError::internal(format!("aggregator task failed: {e}")));
        self.transition(EngineState::Draining, EngineState::Completed)?;
        let stats = stats?;

        let result = stats.finish(
            elapsed,
            started_at,
            settings.workers,
            settings.request_rate,
            cancel.is_cancelled(),
        );

        info!(
            total = result.total_requests,
            failed = result.failed_requests,
            rps = result.requests_per_second,
            error_rate = result.error_rate,
            "Stress test completed"
        );

        Ok(result)
    }
}

struct Worker {
    id: usize,
    generator: RequestGenerator,
    selector: OperationSelector,
    gateway: Arc<dyn MailOperationGateway>,
    limiter: Arc<RateLimiter>,
    outcomes: mpsc::UnboundedSender<OperationOutcome>,
    cancel: CancellationToken,
    deadline: Instant,
}

impl Worker {
    /// Returns the number of operations this worker completed.
    async fn run(mut self) -> u64 {
        ACTIVE_WORKERS.inc();
        let mut completed = 0u64;

        loop {
            if Instant::now() >= self.deadline {
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep_until(self.deadline) => break,
                permitted = self.limiter.acquire() => {
                    if !permitted {
                        break;
                    }
                }
            }

            let kind = self.selector.select(self.generator.rng_mut());
            let started = Instant::now();

            // Cancellation aborts the call; the deadline does not.
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = execute(self.gateway.as_ref(), kind, &mut self.generator) => result,
            };
            let duration = started.elapsed();

            if let Err(e) = &result {
                debug!(worker = self.id, operation = %kind, error = %e, "Operation failed");
            }

            let outcome = OperationOutcome {
                kind,
                duration,
                success: result.is_ok(),
            };
            if self.outcomes.send(outcome).is_err() {
                break;
            }
            completed += 1;
        }

        ACTIVE_WORKERS.dec();
        debug!(worker = self.id, completed, "Worker finished");
        completed
    }
}

async fn execute(
    gateway: &dyn MailOperationGateway,
    kind: OperationKind,
    generator: &mut RequestGenerator,
) -> CoreResult<()> {
    match kind {
        OperationKind::Create => {
            let request = generator.create_request(None);
            gateway.create_mail(&request).await
        }
        OperationKind::List => {
            let request = generator.list_request();
            gateway.list_mails(&request).await.map(|_| ())
        }
        OperationKind::Search => {
            let request = generator.search_request();
            gateway.search_mails(&request).await.map(|_| ())
        }
    }
}

/// Sole owner of the statistics. Ends when every worker has dropped its sender.
async fn aggregate(
    mut outcomes: mpsc::UnboundedReceiver<OperationOutcome>,
    progress_interval: Duration,
    start: Instant,
) -> StatsAccumulator {
    let mut stats = StatsAccumulator::new();
    let mut last_progress = Instant::now();

    while let Some(outcome) = outcomes.recv().await {
        let operation = outcome.kind.as_str();
        OPERATIONS_TOTAL
            .with_label_values(&[operation, status_label(outcome.success)])
            .inc();
        OPERATION_DURATION
            .with_label_values(&[operation])
            .observe(outcome.duration.as_secs_f64());

        stats.record(&outcome);

        if !progress_interval.is_zero() && last_progress.elapsed() >= progress_interval {
            let elapsed = start.elapsed().as_secs_f64();
            let total = stats.total_requests();
            info!(
                elapsed_secs = elapsed,
                total,
                failed = stats.failed_requests(),
                rps = if elapsed > 0.0 { total as f64 / elapsed } else { 0.0 },
                "Stress test progress"
            );
            last_progress = Instant::now();
        }
    }

    stats
}
