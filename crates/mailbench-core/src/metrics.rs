//! Central metrics registry and metric definitions
//!
//! Prometheus metrics describing the load the harness itself generates.
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

// ===== Load Engine Metrics =====

/// Total number of workload operations by kind and outcome
pub static OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mailbench_operations_total",
        "Total number of workload operations issued",
        &["operation", "status"]
    )
    .expect("Failed to register operations counter")
});

/// Workload operation latency histogram
pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "mailbench_operation_duration_seconds",
        "Workload operation duration in seconds",
        &["operation"],
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register operation duration histogram")
});

/// Number of load workers currently running
pub static ACTIVE_WORKERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("mailbench_active_workers", "Number of running load workers")
        .expect("Failed to register active workers gauge")
});

// ===== Search Benchmark Metrics =====

/// Benchmark queries by strategy and outcome
pub static SEARCH_QUERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mailbench_search_queries_total",
        "Total number of benchmark search queries",
        &["strategy", "status"]
    )
    .expect("Failed to register search query counter")
});

/// Benchmark query latency histogram
pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "mailbench_search_duration_seconds",
        "Benchmark search query duration in seconds",
        &["strategy"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register search duration histogram")
});

/// Status label for a finished call.
pub fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}
