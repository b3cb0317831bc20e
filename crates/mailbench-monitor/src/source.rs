use async_trait::async_trait;
use serde::Serialize;

use crate::endpoint::EndpointMetrics;
use crate::error::MonitorResult;
use crate::system::SystemMetrics;

/// One observation from a metrics source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MetricsSample {
    Endpoint(EndpointMetrics),
    System(SystemMetrics),
}

/// Something that can be sampled while a load run is in progress.
///
/// Implementations must be cheap to call repeatedly; the monitoring manager
/// calls `collect` once per scrape interval and tolerates failures.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn collect(&self) -> MonitorResult<MetricsSample>;
}
