//! Cross-strategy ranking and the comparison report text.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::benchmark::{BenchmarkReport, SearchBenchmarkResult};

/// A winning strategy and the value it won with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStrategy {
    pub strategy_name: String,
    /// Milliseconds for latency categories, a 0..=1 ratio for reliability.
    pub value: f64,
}

/// Winners per category. Only strategies with at least one successful query
/// compete; ties go to the strategy that ran first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyRanking {
    pub fastest_average: Option<RankedStrategy>,
    pub fastest_p99: Option<RankedStrategy>,
    pub most_reliable: Option<RankedStrategy>,
}

fn millis(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

impl StrategyRanking {
    pub fn from_results(results: &[SearchBenchmarkResult]) -> Self {
        let mut fastest_average: Option<&SearchBenchmarkResult> = None;
        let mut fastest_p99: Option<&SearchBenchmarkResult> = None;
        let mut most_reliable: Option<&SearchBenchmarkResult> = None;

        for result in results.iter().filter(|r| r.success_queries > 0) {
            if fastest_average.map_or(true, |best| result.latency.avg < best.latency.avg) {
                fastest_average = Some(result);
            }
            if fastest_p99.map_or(true, |best| result.latency.p99 < best.latency.p99) {
                fastest_p99 = Some(result);
            }
            if most_reliable.map_or(true, |best| result.success_ratio() > best.success_ratio()) {
                most_reliable = Some(result);
            }
        }

        Self {
            fastest_average: fastest_average.map(|r| RankedStrategy {
                strategy_name: r.strategy_name.clone(),
                value: millis(r.latency.avg),
            }),
            fastest_p99: fastest_p99.map(|r| RankedStrategy {
                strategy_name: r.strategy_name.clone(),
                value: millis(r.latency.p99),
            }),
            most_reliable: most_reliable.map(|r| RankedStrategy {
                strategy_name: r.strategy_name.clone(),
                value: r.success_ratio(),
            }),
        }
    }
}

/// Human-readable comparison table, winners and recommendations.
pub fn render_comparison(report: &BenchmarkReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Search Strategy Comparison Report ===\n");

    if report.results.is_empty() {
        let _ = writeln!(out, "No strategy produced results.");
    } else {
        let _ = writeln!(
            out,
            "{:<18} {:>10} {:>10} {:>10} {:>10} {:>10} {:>9} {:>9}",
            "Strategy", "Setup", "Avg", "P50", "P95", "P99", "Success", "Rows/q"
        );
        for result in &report.results {
            let _ = writeln!(
                out,
                "{:<18} {:>8.2}ms {:>8.2}ms {:>8.2}ms {:>8.2}ms {:>8.2}ms {:>8.1}% {:>9.1}",
                result.strategy_name,
                millis(result.setup_duration),
                millis(result.latency.avg),
                millis(result.latency.p50),
                millis(result.latency.p95),
                millis(result.latency.p99),
                result.success_ratio() * 100.0,
                result.avg_results,
            );
        }
    }

    for skipped in &report.skipped {
        let _ = writeln!(out, "Skipped {}: {}", skipped.strategy_name, skipped.reason);
    }
    let _ = writeln!(out);

    let ranking = &report.ranking;
    match &ranking.fastest_average {
        Some(r) => {
            let _ = writeln!(out, "🏆 Fastest Average: {} ({:.2}ms)", r.strategy_name, r.value);
        }
        None => {
            let _ = writeln!(out, "🏆 Fastest Average: n/a");
        }
    }
    match &ranking.fastest_p99 {
        Some(r) => {
            let _ = writeln!(out, "🏆 Fastest P99: {} ({:.2}ms)", r.strategy_name, r.value);
        }
        None => {
            let _ = writeln!(out, "🏆 Fastest P99: n/a");
        }
    }
    match &ranking.most_reliable {
        Some(r) => {
            let _ = writeln!(out, "🏆 Most Reliable: {} ({:.1}% success)", r.strategy_name, r.value * 100.0);
        }
        None => {
            let _ = writeln!(out, "🏆 Most Reliable: n/a");
        }
    }

    if let (Some(avg), Some(p99), Some(reliable)) = (
        &ranking.fastest_average,
        &ranking.fastest_p99,
        &ranking.most_reliable,
    ) {
        let _ = writeln!(out, "\nRecommendations:");
        let _ = writeln!(out, "  • For best average performance: Use '{}'", avg.strategy_name);
        let _ = writeln!(out, "  • For consistent latency: Use '{}'", p99.strategy_name);
        let _ = writeln!(out, "  • For reliability: Use '{}'", reliable.strategy_name);
    }

    out
}
