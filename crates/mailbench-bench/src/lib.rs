//! Load generation and search benchmarking for a mail service.
//!
//! - [`StressTest`]: worker pool behind a shared rate limiter, producing a
//!   [`StressTestResult`]
//! - [`SearchBenchmark`]: sequential per-strategy latency measurement with
//!   nearest-rank percentiles and a [`StrategyRanking`]

pub mod benchmark;
pub mod engine;
pub mod generator;
pub mod operation;
pub mod rate_limiter;
pub mod ranking;
pub mod seed;
pub mod selector;
pub mod stats;

pub use benchmark::{
    BenchmarkReport, BenchmarkSettings, SearchBenchmark, SearchBenchmarkResult, SkippedStrategy,
};
pub use engine::{EngineState, LoadSettings, StressTest};
pub use generator::{generate_user_ids, RequestGenerator};
pub use operation::OperationKind;
pub use rate_limiter::RateLimiter;
pub use ranking::{render_comparison, RankedStrategy, StrategyRanking};
pub use seed::{seed_if_empty, seed_mailboxes, SeedSummary};
pub use selector::OperationSelector;
pub use stats::{
    percentile, LatencySummary, OperationOutcome, OperationStats, StatsAccumulator,
    StressTestResult,
};
