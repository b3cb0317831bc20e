//! Search strategy benchmark
//!
//! Strategies run one after another, never concurrently: setup, a short
//! settle delay, then `iterations` sequential timed queries, each with a
//! freshly generated request. Only successful queries contribute to the
//! latency sample.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mailbench_core::config::BenchmarkConfig;
use mailbench_core::metrics::{status_label, SEARCH_DURATION, SEARCH_QUERIES_TOTAL};
use mailbench_core::{CoreError, CoreResult, SearchStrategy};

use crate::generator::RequestGenerator;
use crate::ranking::StrategyRanking;
use crate::stats::{duration_ms, LatencySummary};

#[derive(Debug, Clone)]
pub struct BenchmarkSettings {
    pub iterations: usize,
    pub settle_delay: Duration,
}

impl BenchmarkSettings {
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self {
            iterations: config.iterations,
            settle_delay: config.settle_delay(),
        }
    }
}

/// Outcome for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchBenchmarkResult {
    pub strategy_name: String,
    pub description: String,
    #[serde(with = "duration_ms", rename = "setup_duration_ms")]
    pub setup_duration: Duration,
    /// Computed over successful queries only.
    pub latency: LatencySummary,
    pub total_queries: u64,
    pub success_queries: u64,
    pub failed_queries: u64,
    pub total_results: u64,
    /// Rows per successful query.
    pub avg_results: f64,
}

impl SearchBenchmarkResult {
    /// Share of queries that succeeded, zero when nothing ran.
    pub fn success_ratio(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.success_queries as f64 / self.total_queries as f64
        }
    }
}

/// A strategy left out because its setup failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStrategy {
    pub strategy_name: String,
    pub reason: String,
}

/// All strategy results in run order, plus the cross-strategy ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub iterations: usize,
    pub results: Vec<SearchBenchmarkResult>,
    pub skipped: Vec<SkippedStrategy>,
    pub ranking: StrategyRanking,
    pub interrupted: bool,
}

impl BenchmarkReport {
    pub fn get(&self, strategy_name: &str) -> Option<&SearchBenchmarkResult> {
        self.results
            .iter()
            .find(|result| result.strategy_name == strategy_name)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct SearchBenchmark {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    generator: RequestGenerator,
    settings: BenchmarkSettings,
}

impl SearchBenchmark {
    pub fn new(
        strategies: Vec<Arc<dyn SearchStrategy>>,
        generator: RequestGenerator,
        settings: BenchmarkSettings,
    ) -> CoreResult<Self> {
        if settings.iterations == 0 {
            return Err(CoreError::ValidationError(
                "benchmark iterations must be > 0".to_string(),
            ));
        }
        Ok(Self {
            strategies,
            generator,
            settings,
        })
    }

    /// Benchmarks every strategy in order. Never fails as a whole: setup
    /// failures skip the strategy, cancellation stops early.
    pub async fn run(&mut self, cancel: &CancellationToken) -> BenchmarkReport {
        let strategies = self.strategies.clone();
        let mut results = Vec::with_capacity(strategies.len());
        let mut skipped = Vec::new();

        for strategy in strategies {
            if cancel.is_cancelled() {
                break;
            }
            match self.run_strategy(strategy.as_ref(), cancel).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Strategy setup failed, skipping");
                    skipped.push(SkippedStrategy {
                        strategy_name: strategy.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let ranking = StrategyRanking::from_results(&results);
        BenchmarkReport {
            iterations: self.settings.iterations,
            results,
            skipped,
            ranking,
            interrupted: cancel.is_cancelled(),
        }
    }

    /// Errors only when setup fails.
    async fn run_strategy(
        &mut self,
        strategy: &dyn SearchStrategy,
        cancel: &CancellationToken,
    ) -> CoreResult<SearchBenchmarkResult> {
        let name = strategy.name();
        info!(strategy = name, "Benchmarking search strategy");

        let setup_start = Instant::now();
        strategy.setup().await?;
        let setup_duration = setup_start.elapsed();
        info!(
            strategy = name,
            setup_ms = setup_duration.as_secs_f64() * 1000.0,
            "Strategy setup complete"
        );

        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let mut samples = Vec::with_capacity(self.settings.iterations);
        let mut failed = 0u64;
        let mut total_results = 0u64;

        for _ in 0..self.settings.iterations {
            if cancel.is_cancelled() {
                break;
            }
            let request = self.generator.search_request();
            let started = Instant::now();
            let outcome = strategy.search(&request).await;
            let elapsed = started.elapsed();

            SEARCH_QUERIES_TOTAL
                .with_label_values(&[name, status_label(outcome.is_ok())])
                .inc();

            match outcome {
                Ok(mails) => {
                    SEARCH_DURATION
                        .with_label_values(&[name])
                        .observe(elapsed.as_secs_f64());
                    samples.push(elapsed);
                    total_results += mails.len() as u64;
                }
                Err(_) => failed += 1,
            }
        }

        let success = samples.len() as u64;
        let latency = LatencySummary::from_samples(&samples);
        let result = SearchBenchmarkResult {
            strategy_name: name.to_string(),
            description: strategy.description().to_string(),
            setup_duration,
            latency,
            total_queries: success + failed,
            success_queries: success,
            failed_queries: failed,
            total_results,
            avg_results: if success == 0 {
                0.0
            } else {
                total_results as f64 / success as f64
            },
        };

        info!(
            strategy = name,
            avg_ms = latency.avg.as_secs_f64() * 1000.0,
            p99_ms = latency.p99.as_secs_f64() * 1000.0,
            failed,
            "Strategy benchmark complete"
        );

        Ok(result)
    }
}
