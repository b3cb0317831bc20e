//! Observation of the system under test during a load run.
//!
//! Two [`MetricsSource`] implementations are provided: [`EndpointScraper`]
//! for a service's text-format metrics endpoint and [`SystemMonitor`] for
//! host or container resources. [`MonitoringManager`] drives them on an
//! interval and folds the samples into a [`MonitoringReport`].

pub mod endpoint;
pub mod error;
pub mod manager;
pub mod source;
pub mod system;

pub use endpoint::{parse_exposition, EndpointDelta, EndpointMetrics, EndpointScraper};
pub use error::{MonitorError, MonitorResult};
pub use manager::{
    insights, render_summary, save_report, MonitoringManager, MonitoringReport,
    MonitoringSettings, SystemSummary,
};
pub use source::{MetricsSample, MetricsSource};
pub use system::{SystemMetrics, SystemMonitor, SystemTarget};
