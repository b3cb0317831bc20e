//! Latency statistics
//!
//! Nearest-rank percentiles, latency summaries over a sample, and the
//! single-owner accumulator that folds load-test outcomes into a
//! [`StressTestResult`]. The accumulator is only ever touched by the
//! aggregator task, so min/max updates need no synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::operation::OperationKind;

/// Serializes a `Duration` as fractional milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64((ms / 1000.0).max(0.0)))
    }
}

/// Nearest-rank percentile over an ascending sample.
///
/// `index = floor(len * p / 100)`, clamped to the last element. An empty
/// sample yields zero.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let index = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Mean of `total` over `count`, zero when `count` is zero.
pub fn mean(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Summary of an unsorted latency sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    #[serde(with = "duration_ms", rename = "avg_ms")]
    pub avg: Duration,
    #[serde(with = "duration_ms", rename = "min_ms")]
    pub min: Duration,
    #[serde(with = "duration_ms", rename = "max_ms")]
    pub max: Duration,
    #[serde(with = "duration_ms", rename = "p50_ms")]
    pub p50: Duration,
    #[serde(with = "duration_ms", rename = "p95_ms")]
    pub p95: Duration,
    #[serde(with = "duration_ms", rename = "p99_ms")]
    pub p99: Duration,
}

impl LatencySummary {
    /// Sorts a copy of `samples`; the input order is left untouched.
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let total: Duration = sorted.iter().sum();

        Self {
            count: sorted.len(),
            avg: mean(total, sorted.len() as u64),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }
}

/// One finished workload operation, as reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationOutcome {
    pub kind: OperationKind,
    pub duration: Duration,
    pub success: bool,
}

/// Per-operation statistics in the final result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationStats {
    /// All attempts, successful or not.
    pub count: u64,
    #[serde(with = "duration_ms", rename = "avg_duration_ms")]
    pub avg_duration: Duration,
    #[serde(with = "duration_ms", rename = "min_duration_ms")]
    pub min_duration: Duration,
    #[serde(with = "duration_ms", rename = "max_duration_ms")]
    pub max_duration: Duration,
    pub errors: u64,
}

/// Final load-test report. Frozen once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub started_at: DateTime<Utc>,
    pub workers: usize,
    pub request_rate: u32,
    /// The run ended because of cancellation rather than its deadline.
    pub interrupted: bool,
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    #[serde(with = "duration_ms", rename = "total_duration_ms")]
    pub total_duration: Duration,
    #[serde(with = "duration_ms", rename = "avg_response_time_ms")]
    pub avg_response_time: Duration,
    #[serde(with = "duration_ms", rename = "min_response_time_ms")]
    pub min_response_time: Duration,
    #[serde(with = "duration_ms", rename = "max_response_time_ms")]
    pub max_response_time: Duration,
    pub requests_per_second: f64,
    /// Failed share of all requests, in percent.
    pub error_rate: f64,
    pub operation_stats: BTreeMap<OperationKind, OperationStats>,
}

/// Running totals for one stream of outcomes.
#[derive(Debug, Clone, Copy)]
struct Tally {
    count: u64,
    errors: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl Tally {
    /// Min starts at the largest representable duration and only tightens.
    const MIN_SENTINEL: Duration = Duration::MAX;

    fn new() -> Self {
        Self {
            count: 0,
            errors: 0,
            total: Duration::ZERO,
            min: Self::MIN_SENTINEL,
            max: Duration::ZERO,
        }
    }

    fn record(&mut self, duration: Duration, success: bool) {
        self.count += 1;
        if !success {
            self.errors += 1;
        }
        self.total = self.total.saturating_add(duration);
        if duration < self.min {
            self.min = duration;
        }
        if duration > self.max {
            self.max = duration;
        }
    }

    fn min_or_zero(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.min
        }
    }

    fn to_stats(self) -> OperationStats {
        OperationStats {
            count: self.count,
            avg_duration: mean(self.total, self.count),
            min_duration: self.min_or_zero(),
            max_duration: self.max,
            errors: self.errors,
        }
    }
}

/// Folds outcomes into totals. Owned by exactly one task.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    overall: Tally,
    per_operation: BTreeMap<OperationKind, Tally>,
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self {
            overall: Tally::new(),
            per_operation: OperationKind::ALL
                .iter()
                .map(|kind| (*kind, Tally::new()))
                .collect(),
        }
    }

    pub fn record(&mut self, outcome: &OperationOutcome) {
        self.overall.record(outcome.duration, outcome.success);
        self.per_operation
            .entry(outcome.kind)
            .or_insert_with(Tally::new)
            .record(outcome.duration, outcome.success);
    }

    pub fn total_requests(&self) -> u64 {
        self.overall.count
    }

    pub fn failed_requests(&self) -> u64 {
        self.overall.errors
    }

    /// Derives the final aggregates. Every ratio is zero-guarded.
    pub fn finish(
        &self,
        elapsed: Duration,
        started_at: DateTime<Utc>,
        workers: usize,
        request_rate: u32,
        interrupted: bool,
    ) -> StressTestResult {
        let total = self.overall.count;
        let failed = self.overall.errors;

        let requests_per_second = if elapsed.is_zero() {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        };
        let error_rate = if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64 * 100.0
        };

        StressTestResult {
            started_at,
            workers,
            request_rate,
            interrupted,
            total_requests: total,
            success_requests: total - failed,
            failed_requests: failed,
            total_duration: elapsed,
            avg_response_time: mean(self.overall.total, total),
            min_response_time: self.overall.min_or_zero(),
            max_response_time: self.overall.max,
            requests_per_second,
            error_rate,
            operation_stats: self
                .per_operation
                .iter()
                .map(|(kind, tally)| (*kind, tally.to_stats()))
                .collect(),
        }
    }
}
