//! Monitoring integration tests
//!
//! Scenarios:
//! 1. Scraper parses a live endpoint and reports non-success statuses
//! 2. Manager collects start, periodic and final samples
//! 3. A failing source does not stop the others
//! 4. Reports are saved as timestamped JSON
//! 5. Disabled or empty configuration builds no manager

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mailbench_core::config::MonitoringConfig;
use mailbench_monitor::{
    save_report, EndpointScraper, MetricsSample, MetricsSource, MonitorError, MonitorResult,
    MonitoringManager, MonitoringSettings, SystemMetrics,
};

const EXPOSITION: &str = "\
# TYPE http_requests_total counter
http_requests_total{path=\"/api/mails\"} 250
http_errors_total 5
http_request_duration_seconds{quantile=\"0.99\"} 0.08
process_resident_memory_bytes 52428800
";

#[tokio::test]
async fn test_scraper_reads_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EXPOSITION))
        .mount(&server)
        .await;

    let scraper =
        EndpointScraper::new(format!("{}/metrics", server.uri()), Duration::from_secs(2)).unwrap();
    let metrics = scraper.scrape().await.unwrap();

    assert_eq!(metrics.http_requests_total, 250.0);
    assert_eq!(metrics.http_errors_total, 5.0);
    assert!((metrics.http_request_duration_p99_ms - 80.0).abs() < 1e-9);
    assert_eq!(metrics.memory_usage_mb, 50.0);

    match scraper.collect().await.unwrap() {
        MetricsSample::Endpoint(sample) => assert_eq!(sample.http_requests_total, 250.0),
        other => panic!("unexpected sample: {other:?}"),
    }
}

#[tokio::test]
async fn test_scraper_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let scraper = EndpointScraper::new(server.uri(), Duration::from_secs(2)).unwrap();
    let err = scraper.scrape().await.unwrap_err();
    assert!(matches!(err, MonitorError::Status(503)));
}

/// Reports a rising CPU figure on each call.
struct CountingSource {
    calls: AtomicU64,
}

#[async_trait]
impl MetricsSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    async fn collect(&self) -> MonitorResult<MetricsSample> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MetricsSample::System(SystemMetrics {
            timestamp: chrono::Utc::now(),
            cpu_usage_percent: (n * 10) as f64,
            memory_usage_percent: 20.0,
            ..Default::default()
        }))
    }
}

struct BrokenSource;

#[async_trait]
impl MetricsSource for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn collect(&self) -> MonitorResult<MetricsSample> {
        Err(MonitorError::parse("garbage"))
    }
}

fn settings() -> MonitoringSettings {
    MonitoringSettings {
        scrape_interval: Duration::from_millis(50),
        realtime_log: true,
    }
}

#[tokio::test]
async fn test_manager_collects_periodically() {
    let source = Arc::new(CountingSource {
        calls: AtomicU64::new(0),
    });
    let sources: Vec<Arc<dyn MetricsSource>> = vec![source.clone()];
    let manager = MonitoringManager::new(sources, settings());

    manager.start().await;
    tokio::time::sleep(Duration::from_millis(180)).await;
    let report = manager.stop().await;

    let calls = source.calls.load(Ordering::SeqCst) as usize;
    assert!(calls >= 3, "expected start, ticks and final sample, got {calls}");
    assert_eq!(report.system_snapshots.len(), calls);
    assert!(report.system_available);
    assert!(!report.endpoint_available);

    let summary = report.system_summary.as_ref().unwrap();
    assert_eq!(summary.peak_cpu_percent, (calls * 10) as f64);
    assert!(report.duration_secs >= 0.15);

    // collection has stopped
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst) as usize, calls);
}

#[tokio::test]
async fn test_failing_source_is_tolerated() {
    let good = Arc::new(CountingSource {
        calls: AtomicU64::new(0),
    });
    let sources: Vec<Arc<dyn MetricsSource>> = vec![Arc::new(BrokenSource), good.clone()];
    let manager = MonitoringManager::new(sources, settings());

    manager.start().await;
    let report = manager.stop().await;

    assert!(report.system_snapshots.len() >= 2);
    assert_eq!(
        report.system_snapshots.len(),
        good.calls.load(Ordering::SeqCst) as usize
    );
    assert!(report.system_available);
}

#[tokio::test]
async fn test_report_is_saved_as_json() {
    let sources: Vec<Arc<dyn MetricsSource>> = vec![Arc::new(CountingSource {
        calls: AtomicU64::new(0),
    })];
    let manager = MonitoringManager::new(sources, settings());
    manager.start().await;
    let report = manager.stop().await;

    let dir = tempfile::tempdir().unwrap();
    let path = save_report(&report, &dir.path().join("reports")).await.unwrap();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("monitoring_"));
    assert!(name.ends_with(".json"));
    // monitoring_YYYYmmdd_HHMMSS.json
    assert_eq!(name.len(), "monitoring_".len() + 15 + ".json".len());

    let saved: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(saved["system_available"], serde_json::Value::Bool(true));
    assert!(saved["insights"].is_array());
}

#[test]
fn test_disabled_config_builds_nothing() {
    let disabled = MonitoringConfig::default();
    assert!(MonitoringManager::from_config(&disabled).unwrap().is_none());

    let no_sources = MonitoringConfig {
        enabled: true,
        ..Default::default()
    };
    assert!(MonitoringManager::from_config(&no_sources).unwrap().is_none());

    let endpoint = MonitoringConfig {
        enabled: true,
        endpoint_url: Some("http://127.0.0.1:9/metrics".to_string()),
        ..Default::default()
    };
    let manager = MonitoringManager::from_config(&endpoint).unwrap().unwrap();
    assert_eq!(manager.source_names(), vec!["endpoint"]);
}
