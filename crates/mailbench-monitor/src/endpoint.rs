//! Scraping of a text-exposition metrics endpoint
//!
//! Only a handful of well-known families are mapped onto typed fields; every
//! other series is kept verbatim in [`EndpointMetrics::custom`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

use crate::error::{MonitorError, MonitorResult};
use crate::source::{MetricsSample, MetricsSource};

pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Snapshot of the service's self-reported metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointMetrics {
    pub timestamp: DateTime<Utc>,

    pub http_requests_total: f64,
    pub http_request_duration_p50_ms: f64,
    pub http_request_duration_p95_ms: f64,
    pub http_request_duration_p99_ms: f64,
    pub http_errors_total: f64,
    pub http_active_connections: f64,

    pub process_cpu_seconds_total: f64,
    pub memory_usage_mb: f64,
    /// Goroutines, threads or tasks, whichever the service exposes.
    pub threads: f64,

    pub db_connections_active: f64,
    pub db_connections_idle: f64,
    pub db_queries_total: f64,
    pub db_query_duration_p99_ms: f64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, f64>,
}

/// Change between two endpoint snapshots.
///
/// Counter deltas are clamped at zero so a restarted service does not report
/// negative traffic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDelta {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_secs: f64,

    pub requests: f64,
    pub requests_per_second: f64,
    pub errors: f64,
    pub error_rate_percent: f64,

    /// Share of one core spent by the service over the window.
    pub avg_cpu_percent: f64,
    pub avg_memory_mb: f64,
    pub peak_threads: f64,
    pub avg_connections: f64,

    pub p50_change_ms: f64,
    pub p95_change_ms: f64,
    pub p99_change_ms: f64,

    /// Latency quantiles reported at the end of the window.
    pub end_p50_ms: f64,
    pub end_p95_ms: f64,
    pub end_p99_ms: f64,
}

impl EndpointDelta {
    pub fn between(start: &EndpointMetrics, end: &EndpointMetrics) -> Self {
        let duration_secs = (end.timestamp - start.timestamp)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let requests = (end.http_requests_total - start.http_requests_total).max(0.0);
        let errors = (end.http_errors_total - start.http_errors_total).max(0.0);
        let cpu_seconds = (end.process_cpu_seconds_total - start.process_cpu_seconds_total).max(0.0);

        let per_second = |value: f64| {
            if duration_secs > 0.0 {
                value / duration_secs
            } else {
                0.0
            }
        };

        Self {
            start_time: start.timestamp,
            end_time: end.timestamp,
            duration_secs,
            requests,
            requests_per_second: per_second(requests),
            errors,
            error_rate_percent: if requests > 0.0 {
                errors / requests * 100.0
            } else {
                0.0
            },
            avg_cpu_percent: per_second(cpu_seconds) * 100.0,
            avg_memory_mb: (start.memory_usage_mb + end.memory_usage_mb) / 2.0,
            peak_threads: start.threads.max(end.threads),
            avg_connections: (start.http_active_connections + end.http_active_connections) / 2.0,
            p50_change_ms: end.http_request_duration_p50_ms - start.http_request_duration_p50_ms,
            p95_change_ms: end.http_request_duration_p95_ms - start.http_request_duration_p95_ms,
            p99_change_ms: end.http_request_duration_p99_ms - start.http_request_duration_p99_ms,
            end_p50_ms: end.http_request_duration_p50_ms,
            end_p95_ms: end.http_request_duration_p95_ms,
            end_p99_ms: end.http_request_duration_p99_ms,
        }
    }
}

/// Splits a sample line into its series (name plus labels) and value.
/// The optional trailing timestamp is ignored.
fn split_sample(line: &str) -> Option<(&str, f64)> {
    let (series, rest) = match line.find('{') {
        Some(open) => {
            let close = open + line[open..].find('}')?;
            line.split_at(close + 1)
        }
        None => {
            let end = line.find(char::is_whitespace)?;
            line.split_at(end)
        }
    };
    let value = rest.split_whitespace().next()?.parse::<f64>().ok()?;
    Some((series, value))
}

fn metric_name(series: &str) -> &str {
    series.split('{').next().unwrap_or(series)
}

fn label<'a>(series: &'a str, key: &str) -> Option<&'a str> {
    let labels = series.split_once('{')?.1.trim_end_matches('}');
    labels.split(',').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k.trim() == key).then(|| v.trim().trim_matches('"'))
    })
}

/// Parses a text exposition body into a snapshot taken at `timestamp`.
///
/// Counters and gauges that appear under several label sets are summed;
/// latency quantiles keep the worst value seen.
pub fn parse_exposition(body: &str, timestamp: DateTime<Utc>) -> EndpointMetrics {
    let mut metrics = EndpointMetrics {
        timestamp,
        ..Default::default()
    };

    for line in body.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((series, value)) = split_sample(line) else {
            trace!(line, "Skipping unparseable sample");
            continue;
        };
        let name = metric_name(series);
        let quantile = label(series, "quantile");

        match name {
            n if n.starts_with("db_") => match n {
                "db_connections_active" => metrics.db_connections_active += value,
                "db_connections_idle" => metrics.db_connections_idle += value,
                "db_queries_total" => metrics.db_queries_total += value,
                n if n.starts_with("db_query_duration") && quantile == Some("0.99") => {
                    metrics.db_query_duration_p99_ms =
                        metrics.db_query_duration_p99_ms.max(value * 1000.0);
                }
                _ => {
                    metrics.custom.insert(series.to_string(), value);
                }
            },
            n if n.ends_with("http_requests_total") => metrics.http_requests_total += value,
            n if n.starts_with("http_request_duration_seconds") && quantile.is_some() => {
                let ms = value * 1000.0;
                let slot = match quantile {
                    Some("0.5") => &mut metrics.http_request_duration_p50_ms,
                    Some("0.95") => &mut metrics.http_request_duration_p95_ms,
                    Some("0.99") => &mut metrics.http_request_duration_p99_ms,
                    _ => {
                        metrics.custom.insert(series.to_string(), value);
                        continue;
                    }
                };
                *slot = slot.max(ms);
            }
            n if n.ends_with("http_errors_total") => metrics.http_errors_total += value,
            n if n.contains("connections") => metrics.http_active_connections += value,
            "process_resident_memory_bytes" => metrics.memory_usage_mb = value / BYTES_PER_MB,
            "process_cpu_seconds_total" => metrics.process_cpu_seconds_total = value,
            n if n.contains("goroutines") || n.contains("threads") => metrics.threads += value,
            _ => {
                metrics.custom.insert(series.to_string(), value);
            }
        }
    }

    metrics
}

/// Pulls text-format metrics from the service under test.
#[derive(Debug, Clone)]
pub struct EndpointScraper {
    url: String,
    client: reqwest::Client,
}

impl EndpointScraper {
    pub fn new(url: impl Into<String>, timeout: Duration) -> MonitorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn scrape(&self) -> MonitorResult<EndpointMetrics> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok(parse_exposition(&body, Utc::now()))
    }
}

#[async_trait]
impl MetricsSource for EndpointScraper {
    fn name(&self) -> &str {
        "endpoint"
    }

    async fn collect(&self) -> MonitorResult<MetricsSample> {
        self.scrape().await.map(MetricsSample::Endpoint)
    }
}
