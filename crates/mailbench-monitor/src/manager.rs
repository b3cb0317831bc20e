//! Periodic collection across metrics sources and the end-of-run report.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mailbench_core::config::MonitoringConfig;

use crate::endpoint::{EndpointDelta, EndpointMetrics, EndpointScraper, DEFAULT_SCRAPE_TIMEOUT};
use crate::error::MonitorResult;
use crate::source::{MetricsSample, MetricsSource};
use crate::system::{SystemMetrics, SystemMonitor, SystemTarget};

pub const HIGH_ERROR_RATE_PERCENT: f64 = 5.0;
pub const HIGH_AVG_CPU_PERCENT: f64 = 80.0;
pub const HIGH_PEAK_CPU_PERCENT: f64 = 90.0;
pub const HIGH_MEMORY_PERCENT: f64 = 85.0;
pub const HIGH_CONNECTIONS: f64 = 1000.0;

/// Aggregates over all system snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub samples: usize,
    pub avg_cpu_percent: f64,
    pub peak_cpu_percent: f64,
    pub avg_memory_mb: f64,
    pub peak_memory_mb: f64,
    pub avg_memory_percent: f64,
    pub avg_connections: f64,
    pub peak_connections: u64,
    pub avg_load_1m: f64,
}

impl SystemSummary {
    pub fn from_snapshots(snapshots: &[SystemMetrics]) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }
        let mut summary = SystemSummary {
            samples: snapshots.len(),
            ..Default::default()
        };
        for s in snapshots {
            summary.avg_cpu_percent += s.cpu_usage_percent;
            summary.avg_memory_mb += s.used_memory_mb;
            summary.avg_memory_percent += s.memory_usage_percent;
            summary.avg_connections += s.tcp_established as f64;
            summary.avg_load_1m += s.load_average_1m;
            summary.peak_cpu_percent = summary.peak_cpu_percent.max(s.cpu_usage_percent);
            summary.peak_memory_mb = summary.peak_memory_mb.max(s.used_memory_mb);
            summary.peak_connections = summary.peak_connections.max(s.tcp_established);
        }
        let n = snapshots.len() as f64;
        summary.avg_cpu_percent /= n;
        summary.avg_memory_mb /= n;
        summary.avg_memory_percent /= n;
        summary.avg_connections /= n;
        summary.avg_load_1m /= n;
        Some(summary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,

    pub endpoint_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_delta: Option<EndpointDelta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint_snapshots: Vec<EndpointMetrics>,

    pub system_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_summary: Option<SystemSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_snapshots: Vec<SystemMetrics>,

    pub insights: Vec<String>,
}

/// Threshold checks over whatever was collected.
pub fn insights(delta: Option<&EndpointDelta>, summary: Option<&SystemSummary>) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(delta) = delta {
        if delta.error_rate_percent > HIGH_ERROR_RATE_PERCENT {
            out.push(format!(
                "High error rate detected: {:.2}%",
                delta.error_rate_percent
            ));
        }
        if delta.avg_cpu_percent > HIGH_AVG_CPU_PERCENT {
            out.push(format!("High service CPU usage: {:.2}%", delta.avg_cpu_percent));
        }
        if delta.avg_connections > HIGH_CONNECTIONS {
            out.push(format!(
                "Average connections: {:.0} - ensure connection pooling",
                delta.avg_connections
            ));
        }
    }

    if let Some(summary) = summary {
        if summary.avg_cpu_percent > HIGH_AVG_CPU_PERCENT {
            out.push(format!("High CPU usage: {:.2}%", summary.avg_cpu_percent));
        }
        if summary.peak_cpu_percent > HIGH_PEAK_CPU_PERCENT {
            out.push(format!(
                "CPU peaked at {:.2}% - consider scaling",
                summary.peak_cpu_percent
            ));
        }
        if summary.avg_memory_percent > HIGH_MEMORY_PERCENT {
            out.push(format!(
                "Memory usage high: {:.2}% - risk of OOM",
                summary.avg_memory_percent
            ));
        }
        if summary.peak_connections as f64 > HIGH_CONNECTIONS {
            out.push(format!(
                "Peak connections: {} - ensure connection pooling",
                summary.peak_connections
            ));
        }
    }

    out
}

#[derive(Debug, Clone)]
pub struct MonitoringSettings {
    pub scrape_interval: Duration,
    pub realtime_log: bool,
}

impl MonitoringSettings {
    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self {
            scrape_interval: config.scrape_interval(),
            realtime_log: config.realtime_log,
        }
    }
}

#[derive(Debug, Default)]
struct Collected {
    endpoint: Vec<EndpointMetrics>,
    system: Vec<SystemMetrics>,
}

/// Samples every source once at start, on each tick while running, and once
/// more at stop.
pub struct MonitoringManager {
    sources: Vec<Arc<dyn MetricsSource>>,
    settings: MonitoringSettings,
    collected: Arc<Mutex<Collected>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl MonitoringManager {
    pub fn new(sources: Vec<Arc<dyn MetricsSource>>, settings: MonitoringSettings) -> Self {
        Self {
            sources,
            settings,
            collected: Arc::new(Mutex::new(Collected::default())),
            started_at: Mutex::new(None),
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Builds the configured sources. `None` when monitoring is disabled or
    /// no source is configured.
    pub fn from_config(config: &MonitoringConfig) -> MonitorResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let mut sources: Vec<Arc<dyn MetricsSource>> = Vec::new();
        if let Some(url) = &config.endpoint_url {
            sources.push(Arc::new(EndpointScraper::new(url.clone(), DEFAULT_SCRAPE_TIMEOUT)?));
        }
        if config.enable_system_monitor {
            let target = match (&config.container_id, &config.target_host) {
                (Some(id), _) if config.docker => SystemTarget::Container(id.clone()),
                (_, Some(host)) => SystemTarget::Remote(host.clone()),
                _ => SystemTarget::Local,
            };
            sources.push(Arc::new(SystemMonitor::new(target)));
        }

        if sources.is_empty() {
            warn!("Monitoring enabled but no metrics source configured");
            return Ok(None);
        }
        Ok(Some(Self::new(sources, MonitoringSettings::from_config(config))))
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Takes the initial snapshots and spawns the periodic collector.
    pub async fn start(&self) {
        *self.started_at.lock() = Some(Utc::now());
        info!(sources = ?self.source_names(), "Starting monitoring");

        collect_once(&self.sources, &self.collected, self.settings.realtime_log).await;

        let sources = self.sources.clone();
        let collected = self.collected.clone();
        let settings = self.settings.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let period = settings.scrape_interval.max(Duration::from_millis(1));
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        collect_once(&sources, &collected, settings.realtime_log).await;
                    }
                }
            }
        });
        *self.task.lock() = Some(handle);
    }

    /// Stops the collector, takes final snapshots and builds the report.
    pub async fn stop(&self) -> MonitoringReport {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Monitoring task ended abnormally");
            }
        }

        collect_once(&self.sources, &self.collected, false).await;
        let ended_at = Utc::now();
        let started_at = self.started_at.lock().unwrap_or(ended_at);
        info!("Monitoring stopped");

        let collected = std::mem::take(&mut *self.collected.lock());
        build_report(started_at, ended_at, collected)
    }
}

fn build_report(
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    collected: Collected,
) -> MonitoringReport {
    let endpoint_delta = match collected.endpoint.as_slice() {
        [first, .., last] => Some(EndpointDelta::between(first, last)),
        _ => None,
    };
    let system_summary = if collected.system.len() >= 2 {
        SystemSummary::from_snapshots(&collected.system)
    } else {
        None
    };
    let insights = insights(endpoint_delta.as_ref(), system_summary.as_ref());

    MonitoringReport {
        started_at,
        ended_at,
        duration_secs: (ended_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0),
        endpoint_available: endpoint_delta.is_some(),
        endpoint_delta,
        endpoint_snapshots: collected.endpoint,
        system_available: system_summary.is_some(),
        system_summary,
        system_snapshots: collected.system,
        insights,
    }
}

async fn collect_once(
    sources: &[Arc<dyn MetricsSource>],
    collected: &Mutex<Collected>,
    realtime_log: bool,
) {
    let samples = join_all(sources.iter().map(|source| source.collect())).await;

    let mut collected = collected.lock();
    for (source, sample) in sources.iter().zip(samples) {
        match sample {
            Ok(MetricsSample::Endpoint(metrics)) => {
                if realtime_log {
                    info!(
                        requests = metrics.http_requests_total,
                        memory_mb = metrics.memory_usage_mb,
                        p99_ms = metrics.http_request_duration_p99_ms,
                        "Endpoint sample"
                    );
                }
                collected.endpoint.push(metrics);
            }
            Ok(MetricsSample::System(metrics)) => {
                if realtime_log {
                    info!(
                        cpu = metrics.cpu_usage_percent,
                        memory = metrics.memory_usage_percent,
                        connections = metrics.tcp_established,
                        "System sample"
                    );
                }
                collected.system.push(metrics);
            }
            Err(e) => warn!(source = source.name(), error = %e, "Failed to collect metrics"),
        }
    }
}

/// Writes `monitoring_<YYYYmmdd_HHMMSS>.json` under `dir`.
pub async fn save_report(report: &MonitoringReport, dir: &Path) -> MonitorResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "monitoring_{}.json",
        report.ended_at.format("%Y%m%d_%H%M%S")
    ));
    let data = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(&path, data).await?;
    info!(path = %path.display(), "Monitoring report saved");
    Ok(path)
}

pub fn render_summary(report: &MonitoringReport) -> String {
    let rule = "=".repeat(80);
    let thin = format!("   {}", "-".repeat(60));
    let mut out = String::new();

    let _ = writeln!(out, "\n{rule}\nMONITORING SUMMARY\n{rule}");
    let _ = writeln!(out, "\nDuration: {:.1}s", report.duration_secs);
    let _ = writeln!(out, "Start:    {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "End:      {}", report.ended_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(delta) = &report.endpoint_delta {
        let _ = writeln!(out, "\nService metrics:\n{thin}");
        let _ = writeln!(
            out,
            "   HTTP Requests:      {:.0} total ({:.2} req/s)",
            delta.requests, delta.requests_per_second
        );
        let _ = writeln!(out, "   Error Rate:         {:.2}%", delta.error_rate_percent);
        let _ = writeln!(out, "   Avg CPU:            {:.2}%", delta.avg_cpu_percent);
        let _ = writeln!(out, "   Avg Memory:         {:.2} MB", delta.avg_memory_mb);
        let _ = writeln!(out, "   Peak Threads:       {:.0}", delta.peak_threads);
        let _ = writeln!(out, "   Avg Connections:    {:.0}", delta.avg_connections);
        let _ = writeln!(
            out,
            "   P50: {:.2}ms | P95: {:.2}ms | P99: {:.2}ms",
            delta.end_p50_ms, delta.end_p95_ms, delta.end_p99_ms
        );
    }

    if let Some(summary) = &report.system_summary {
        let _ = writeln!(out, "\nSystem metrics:\n{thin}");
        let _ = writeln!(
            out,
            "   CPU Usage:          Avg: {:.2}% | Peak: {:.2}%",
            summary.avg_cpu_percent, summary.peak_cpu_percent
        );
        let _ = writeln!(
            out,
            "   Memory Usage:       Avg: {:.2}MB ({:.2}%) | Peak: {:.2}MB",
            summary.avg_memory_mb, summary.avg_memory_percent, summary.peak_memory_mb
        );
        let _ = writeln!(
            out,
            "   TCP Connections:    Avg: {:.0} | Peak: {}",
            summary.avg_connections, summary.peak_connections
        );
        let _ = writeln!(out, "   Load Average (1m):  {:.2}", summary.avg_load_1m);
    }

    if report.insights.is_empty() {
        let _ = writeln!(out, "\nNo performance issues detected.");
    } else {
        let _ = writeln!(out, "\nPerformance insights:\n{thin}");
        for insight in &report.insights {
            let _ = writeln!(out, "   {insight}");
        }
    }
    let _ = writeln!(out, "\n{rule}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(cpu: f64, mem_pct: f64, conns: u64) -> SystemMetrics {
        SystemMetrics {
            cpu_usage_percent: cpu,
            memory_usage_percent: mem_pct,
            used_memory_mb: mem_pct * 10.0,
            tcp_established: conns,
            ..Default::default()
        }
    }

    #[test]
    fn test_system_summary_averages_and_peaks() {
        let summary =
            SystemSummary::from_snapshots(&[system(20.0, 40.0, 10), system(60.0, 50.0, 30)])
                .unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.avg_cpu_percent, 40.0);
        assert_eq!(summary.peak_cpu_percent, 60.0);
        assert_eq!(summary.avg_memory_percent, 45.0);
        assert_eq!(summary.peak_memory_mb, 500.0);
        assert_eq!(summary.avg_connections, 20.0);
        assert_eq!(summary.peak_connections, 30);
        assert!(SystemSummary::from_snapshots(&[]).is_none());
    }

    #[test]
    fn test_quiet_run_has_no_insights() {
        let summary = SystemSummary::from_snapshots(&[system(30.0, 50.0, 10)]).unwrap();
        assert!(insights(None, Some(&summary)).is_empty());
        assert!(insights(None, None).is_empty());
    }

    #[test]
    fn test_thresholds_trigger_insights() {
        let summary = SystemSummary::from_snapshots(&[
            system(85.0, 90.0, 1500),
            system(95.0, 88.0, 900),
        ])
        .unwrap();
        let found = insights(None, Some(&summary));
        assert_eq!(found.len(), 4);
        assert!(found.iter().any(|i| i.starts_with("High CPU usage")));
        assert!(found.iter().any(|i| i.starts_with("CPU peaked at 95.00%")));
        assert!(found.iter().any(|i| i.starts_with("Memory usage high")));
        assert!(found.iter().any(|i| i.starts_with("Peak connections: 1500")));
    }

    #[test]
    fn test_error_rate_insight() {
        let start = EndpointMetrics::default();
        let end = EndpointMetrics {
            timestamp: start.timestamp + chrono::Duration::seconds(10),
            http_requests_total: 100.0,
            http_errors_total: 6.0,
            ..Default::default()
        };
        let delta = EndpointDelta::between(&start, &end);
        let found = insights(Some(&delta), None);
        assert_eq!(found, vec!["High error rate detected: 6.00%".to_string()]);
    }

    #[test]
    fn test_report_needs_two_snapshots() {
        let now = Utc::now();
        let report = build_report(
            now,
            now,
            Collected {
                endpoint: vec![EndpointMetrics::default()],
                system: vec![system(10.0, 10.0, 1)],
            },
        );
        assert!(!report.endpoint_available);
        assert!(!report.system_available);
        assert_eq!(report.system_snapshots.len(), 1);
        assert!(render_summary(&report).contains("No performance issues detected."));
    }
}
