//! Run reports: a JSON document plus a plain-text summary.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use mailbench_bench::{BenchmarkReport, SeedSummary, StressTestResult};
use mailbench_core::config::ReportConfig;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

fn ms(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Everything one invocation produced.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub timestamp: DateTime<Utc>,
    pub backend: &'a str,
    pub database: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeding: Option<&'a SeedSummary>,
    pub stress_test_result: Option<&'a StressTestResult>,
    pub search_benchmark: Option<&'a BenchmarkReport>,
}

impl RunReport<'_> {
    pub fn is_empty(&self) -> bool {
        self.stress_test_result.is_none() && self.search_benchmark.is_none()
    }
}

pub struct Reporter {
    output_dir: PathBuf,
    json_report: bool,
    text_summary: bool,
}

impl Reporter {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            json_report: config.json_report,
            text_summary: config.text_summary,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes the enabled outputs and returns their paths.
    pub async fn write(&self, report: &RunReport<'_>) -> anyhow::Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        let stamp = report.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let mut written = Vec::new();

        if self.json_report {
            let path = self.output_dir.join(format!("report_{stamp}.json"));
            let data = serde_json::to_vec_pretty(report).context("failed to encode report")?;
            tokio::fs::write(&path, data)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }

        if self.text_summary {
            let path = self.output_dir.join(format!("summary_{stamp}.txt"));
            tokio::fs::write(&path, render_text_summary(report))
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }

        for path in &written {
            info!(path = %path.display(), "Report written");
        }
        Ok(written)
    }
}

/// Console view of a stress test result.
pub fn render_stress_summary(result: &StressTestResult) -> String {
    let mut out = String::new();
    let success_pct = if result.total_requests == 0 {
        0.0
    } else {
        result.success_requests as f64 / result.total_requests as f64 * 100.0
    };

    let _ = writeln!(out, "\nStress Test Results:");
    if result.interrupted {
        let _ = writeln!(out, "  (interrupted, partial results)");
    }
    let _ = writeln!(out, "  Total Requests: {}", result.total_requests);
    let _ = writeln!(out, "  Success: {} ({:.2}%)", result.success_requests, success_pct);
    let _ = writeln!(out, "  Failed: {} ({:.2}%)", result.failed_requests, result.error_rate);
    let _ = writeln!(out, "  Avg Response Time: {:.2}ms", ms(result.avg_response_time));
    let _ = writeln!(
        out,
        "  Min/Max Response Time: {:.2}ms / {:.2}ms",
        ms(result.min_response_time),
        ms(result.max_response_time)
    );
    let _ = writeln!(out, "  Requests/Second: {:.2}", result.requests_per_second);

    let _ = writeln!(out, "\n  Operation Breakdown:");
    for (kind, stats) in &result.operation_stats {
        let _ = writeln!(
            out,
            "    {:<7} Count={}, Avg={:.2}ms, Errors={}",
            kind.as_str(),
            stats.count,
            ms(stats.avg_duration),
            stats.errors
        );
    }
    out
}

pub fn render_text_summary(report: &RunReport<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Mail Service Benchmark Report ===");
    let _ = writeln!(out, "Generated: {}", report.timestamp.to_rfc3339());
    let _ = writeln!(out, "Backend: {} ({})", report.backend, report.database);

    if let Some(seeding) = report.seeding {
        let _ = writeln!(out, "\n--- Seeding ---");
        let _ = writeln!(
            out,
            "Created {} of {} mails ({} failed) in {:.2}s",
            seeding.created,
            seeding.requested,
            seeding.failed,
            seeding.elapsed.as_secs_f64()
        );
    }

    if let Some(st) = report.stress_test_result {
        let _ = writeln!(out, "\n--- Stress Test Results ---");
        let _ = writeln!(out, "Workers: {}", st.workers);
        let _ = writeln!(out, "Target Rate: {}/s", st.request_rate);
        let _ = writeln!(out, "Interrupted: {}", st.interrupted);
        let _ = writeln!(out, "Total Requests: {}", st.total_requests);
        let _ = writeln!(out, "Success Requests: {}", st.success_requests);
        let _ = writeln!(out, "Failed Requests: {}", st.failed_requests);
        let _ = writeln!(out, "Error Rate: {:.2}%", st.error_rate);
        let _ = writeln!(out, "Total Duration: {:.2}s", st.total_duration.as_secs_f64());
        let _ = writeln!(out, "Avg Response Time: {:.3}ms", ms(st.avg_response_time));
        let _ = writeln!(out, "Min Response Time: {:.3}ms", ms(st.min_response_time));
        let _ = writeln!(out, "Max Response Time: {:.3}ms", ms(st.max_response_time));
        let _ = writeln!(out, "Requests/Second: {:.2}", st.requests_per_second);

        let _ = writeln!(out, "\n--- Operation Statistics ---");
        for (kind, stats) in &st.operation_stats {
            let _ = writeln!(out, "\n{kind}:");
            let _ = writeln!(out, "  Count: {}", stats.count);
            let _ = writeln!(out, "  Avg Duration: {:.3}ms", ms(stats.avg_duration));
            let _ = writeln!(out, "  Min Duration: {:.3}ms", ms(stats.min_duration));
            let _ = writeln!(out, "  Max Duration: {:.3}ms", ms(stats.max_duration));
            let _ = writeln!(out, "  Errors: {}", stats.errors);
        }
    }

    if let Some(bench) = report.search_benchmark {
        let _ = writeln!(out, "\n--- Search Benchmark Results ---");
        for result in &bench.results {
            let _ = writeln!(out, "\n{}:", result.strategy_name);
            let _ = writeln!(out, "  Total Queries: {}", result.total_queries);
            let _ = writeln!(out, "  Success: {}", result.success_queries);
            let _ = writeln!(out, "  Failed: {}", result.failed_queries);
            let _ = writeln!(out, "  Avg Duration: {:.3}ms", ms(result.latency.avg));
            let _ = writeln!(out, "  Min Duration: {:.3}ms", ms(result.latency.min));
            let _ = writeln!(out, "  Max Duration: {:.3}ms", ms(result.latency.max));
            let _ = writeln!(
                out,
                "  P50/P95/P99: {:.3}ms / {:.3}ms / {:.3}ms",
                ms(result.latency.p50),
                ms(result.latency.p95),
                ms(result.latency.p99)
            );
        }
        for skipped in &bench.skipped {
            let _ = writeln!(out, "\n{}: skipped ({})", skipped.strategy_name, skipped.reason);
        }
        if let Some(winner) = &bench.ranking.fastest_average {
            let _ = writeln!(out, "\nFastest average: {}", winner.strategy_name);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailbench_bench::{
        LatencySummary, OperationKind, OperationOutcome, SearchBenchmarkResult, StatsAccumulator,
        StrategyRanking,
    };
    use std::time::Duration;

    fn stress_result() -> StressTestResult {
        let mut acc = StatsAccumulator::new();
        for (i, kind) in [OperationKind::Create, OperationKind::List, OperationKind::Search]
            .into_iter()
            .cycle()
            .take(30)
            .enumerate()
        {
            acc.record(&OperationOutcome {
                kind,
                duration: Duration::from_millis(5 + i as u64 % 4),
                success: i % 10 != 0,
            });
        }
        acc.finish(Duration::from_secs(1), Utc::now(), 4, 30, false)
    }

    fn benchmark_report() -> BenchmarkReport {
        let results = vec![SearchBenchmarkResult {
            strategy_name: "regex".to_string(),
            description: "pattern scan".to_string(),
            setup_duration: Duration::from_millis(3),
            latency: LatencySummary::from_samples(&[
                Duration::from_millis(2),
                Duration::from_millis(4),
            ]),
            total_queries: 2,
            success_queries: 2,
            failed_queries: 0,
            total_results: 10,
            avg_results: 5.0,
        }];
        BenchmarkReport {
            iterations: 2,
            ranking: StrategyRanking::from_results(&results),
            results,
            skipped: vec![],
            interrupted: false,
        }
    }

    #[tokio::test]
    async fn test_writes_json_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(&ReportConfig {
            output_dir: dir.path().join("out"),
            json_report: true,
            text_summary: true,
        });
        let stress = stress_result();
        let bench = benchmark_report();
        let report = RunReport {
            timestamp: Utc::now(),
            backend: "direct",
            database: "mail_service",
            seeding: None,
            stress_test_result: Some(&stress),
            search_benchmark: Some(&bench),
        };

        let written = reporter.write(&report).await.unwrap();
        assert_eq!(written.len(), 2);

        let json_path = written
            .iter()
            .find(|p| p.extension().map_or(false, |e| e == "json"))
            .unwrap();
        let name = json_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("report_"));
        assert_eq!(name.len(), "report_".len() + 15 + ".json".len());

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
        assert_eq!(json["stress_test_result"]["total_requests"], 30);
        assert_eq!(json["stress_test_result"]["failed_requests"], 3);
        assert!(json["stress_test_result"]["avg_response_time_ms"].is_number());
        assert_eq!(json["search_benchmark"]["results"][0]["strategy_name"], "regex");
        assert!(json.get("seeding").is_none());

        let text_path = written
            .iter()
            .find(|p| p.extension().map_or(false, |e| e == "txt"))
            .unwrap();
        let text = std::fs::read_to_string(text_path).unwrap();
        assert!(text.contains("Total Requests: 30"));
        assert!(text.contains("Failed Requests: 3"));
        assert!(text.contains("regex:"));
        assert!(text.contains("Fastest average: regex"));
    }

    #[tokio::test]
    async fn test_disabled_outputs_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(&ReportConfig {
            output_dir: dir.path().to_path_buf(),
            json_report: false,
            text_summary: false,
        });
        let report = RunReport {
            timestamp: Utc::now(),
            backend: "api",
            database: "mail_service",
            seeding: None,
            stress_test_result: None,
            search_benchmark: None,
        };
        assert!(report.is_empty());
        assert!(reporter.write(&report).await.unwrap().is_empty());
    }

    #[test]
    fn test_stress_summary_lists_operations() {
        let text = render_stress_summary(&stress_result());
        assert!(text.contains("Total Requests: 30"));
        assert!(text.contains("Success: 27 (90.00%)"));
        assert!(text.contains("create"));
        assert!(text.contains("search"));
    }
}
