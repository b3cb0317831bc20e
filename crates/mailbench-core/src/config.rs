//! Configuration management for mailbench
//!
//! This module provides a centralized configuration system that supports:
//! - YAML/TOML/JSON configuration files
//! - Environment variable overrides
//! - Reasonable defaults
//! - Configuration validation

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Names of the search strategies the harness knows how to build.
pub const SEARCH_METHODS: [&str; 4] = ["text_search", "regex", "aggregation", "index_optimized"];

/// Upper bound on the request rate the limiter accepts.
pub const MAX_REQUEST_RATE: u32 = 1_000_000;

/// Root configuration structure for mailbench
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MailbenchConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub stress_test: StressTestConfig,

    #[serde(default)]
    pub benchmark: BenchmarkConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl MailbenchConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. `explicit` path, or the file named by MAILBENCH_CONFIG
    /// 3. ./config/mailbench.{yaml,toml,json}
    /// 4. Hardcoded defaults (lowest priority)
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = Self::set_defaults(builder)?;

        builder = builder.add_source(File::with_name("./config/mailbench").required(false));

        if let Some(path) = explicit {
            debug!(path = %path.display(), "Adding configuration file");
            builder = builder.add_source(File::from(path).required(true));
        } else if let Ok(config_path) = std::env::var("MAILBENCH_CONFIG") {
            debug!(path = %config_path, "Adding configuration file from MAILBENCH_CONFIG");
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        // Example: MAILBENCH_STRESS_TEST__REQUEST_RATE=250
        builder = builder.add_source(
            Environment::with_prefix("MAILBENCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: MailbenchConfig = builder.build()?.try_deserialize()?;

        if let Err(e) = config.validate() {
            warn!(error = %e, "Configuration rejected");
            return Err(e);
        }

        info!(
            store = %config.store.kind,
            workers = config.stress_test.concurrent_workers,
            rate = config.stress_test.request_rate,
            duration_secs = config.stress_test.duration_secs,
            use_api = config.stress_test.use_api,
            monitoring = config.monitoring.enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Set default values for all scalar configuration options
    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            // Store
            .set_default("store.kind", "memory")?
            .set_default("store.database", "mail_service")?
            // Stress test
            .set_default("stress_test.num_users", 100)?
            .set_default("stress_test.num_mails_per_user", 50)?
            .set_default("stress_test.concurrent_workers", 50)?
            .set_default("stress_test.request_rate", 100)?
            .set_default("stress_test.duration_secs", 300)?
            .set_default("stress_test.use_api", false)?
            .set_default("stress_test.api_endpoint", "http://localhost:8080")?
            .set_default("stress_test.api_timeout_secs", 30)?
            .set_default("stress_test.progress_interval_secs", 10)?
            .set_default("stress_test.operations.create_weight", 30)?
            .set_default("stress_test.operations.list_weight", 50)?
            .set_default("stress_test.operations.search_weight", 20)?
            // Benchmark
            .set_default("benchmark.sample_size", 1000)?
            .set_default("benchmark.iterations", 100)?
            .set_default("benchmark.settle_delay_ms", 100)?
            // Report
            .set_default("report.output_dir", "./reports")?
            .set_default("report.json_report", true)?
            .set_default("report.text_summary", true)?
            // Monitoring
            .set_default("monitoring.enabled", false)?
            .set_default("monitoring.scrape_interval_secs", 5)?
            .set_default("monitoring.enable_system_monitor", false)?
            .set_default("monitoring.docker", false)?
            .set_default("monitoring.realtime_log", false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stress = &self.stress_test;

        if stress.concurrent_workers == 0 {
            return Err(ConfigError::Message(
                "stress_test.concurrent_workers must be > 0".to_string(),
            ));
        }

        if stress.request_rate == 0 || stress.request_rate > MAX_REQUEST_RATE {
            return Err(ConfigError::Message(format!(
                "stress_test.request_rate must be in 1..={MAX_REQUEST_RATE}"
            )));
        }

        if stress.duration_secs == 0 {
            return Err(ConfigError::Message(
                "stress_test.duration_secs must be > 0".to_string(),
            ));
        }

        if stress.operations.total() == 0 {
            return Err(ConfigError::Message(
                "stress_test.operations weights must sum to > 0".to_string(),
            ));
        }

        if stress.num_users < 2 {
            return Err(ConfigError::Message(
                "stress_test.num_users must be >= 2".to_string(),
            ));
        }

        if stress.use_api && stress.api_endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "stress_test.api_endpoint is required when use_api is set".to_string(),
            ));
        }

        if self.benchmark.iterations == 0 {
            return Err(ConfigError::Message(
                "benchmark.iterations must be > 0".to_string(),
            ));
        }

        if self.benchmark.search_methods.is_empty() {
            return Err(ConfigError::Message(
                "benchmark.search_methods must name at least one strategy".to_string(),
            ));
        }

        if let Some(unknown) = self
            .benchmark
            .search_methods
            .iter()
            .find(|name| !SEARCH_METHODS.contains(&name.as_str()))
        {
            return Err(ConfigError::Message(format!(
                "benchmark.search_methods: unknown strategy `{unknown}` (known: {})",
                SEARCH_METHODS.join(", ")
            )));
        }

        if self.monitoring.enabled && self.monitoring.scrape_interval_secs == 0 {
            return Err(ConfigError::Message(
                "monitoring.scrape_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a specific file path, without defaults or environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: MailbenchConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        Ok(config)
    }
}

/// Backing store selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Store implementation (`memory` is the only built-in kind)
    pub kind: String,

    /// Logical database name, used in logs and reports
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            database: "mail_service".to_string(),
        }
    }
}

/// Load generation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StressTestConfig {
    /// Size of the synthetic user pool
    pub num_users: usize,

    /// Mails created per user when seeding
    pub num_mails_per_user: usize,

    /// Worker pool size
    pub concurrent_workers: usize,

    /// Aggregate operations per second across all workers
    pub request_rate: u32,

    /// Test length in seconds
    pub duration_secs: u64,

    /// Drive the remote HTTP service instead of the local store
    pub use_api: bool,

    /// Base URL of the remote mail service
    pub api_endpoint: String,

    /// Per-request timeout for the remote service
    pub api_timeout_secs: u64,

    /// How often the aggregator logs progress
    pub progress_interval_secs: u64,

    /// Fixed RNG seed for reproducible workloads
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub operations: OperationWeights,
}

impl Default for StressTestConfig {
    fn default() -> Self {
        Self {
            num_users: 100,
            num_mails_per_user: 50,
            concurrent_workers: 50,
            request_rate: 100,
            duration_secs: 300,
            use_api: false,
            api_endpoint: "http://localhost:8080".to_string(),
            api_timeout_secs: 30,
            progress_interval_secs: 10,
            seed: None,
            operations: OperationWeights::default(),
        }
    }
}

impl StressTestConfig {
    /// Get test duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Get remote request timeout
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Get progress log interval; zero disables progress logging
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}

/// Relative weights of the three workload operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct OperationWeights {
    pub create_weight: u32,
    pub list_weight: u32,
    pub search_weight: u32,
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            create_weight: 30,
            list_weight: 50,
            search_weight: 20,
        }
    }
}

impl OperationWeights {
    /// Sum of all weights, widened so it cannot overflow
    pub fn total(&self) -> u64 {
        u64::from(self.create_weight) + u64::from(self.list_weight) + u64::from(self.search_weight)
    }
}

/// Search strategy benchmark settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchmarkConfig {
    /// Strategies to compare, in report order
    #[serde(default = "default_search_methods")]
    pub search_methods: Vec<String>,

    /// Mails seeded into an empty local store before benchmarking; zero disables
    pub sample_size: usize,

    /// Sequential queries per strategy
    pub iterations: usize,

    /// Grace period after setup before timing starts
    pub settle_delay_ms: u64,
}

fn default_search_methods() -> Vec<String> {
    SEARCH_METHODS.iter().map(|name| (*name).to_string()).collect()
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            search_methods: default_search_methods(),
            sample_size: 1000,
            iterations: 100,
            settle_delay_ms: 100,
        }
    }
}

impl BenchmarkConfig {
    /// Get settle delay duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Report output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub json_report: bool,
    pub text_summary: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./reports"),
            json_report: true,
            text_summary: true,
        }
    }
}

/// External metrics collection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub enabled: bool,

    /// Text-format metrics endpoint of the service under test
    #[serde(default)]
    pub endpoint_url: Option<String>,

    pub scrape_interval_secs: u64,

    /// Sample CPU/memory/load through shell utilities
    pub enable_system_monitor: bool,

    /// Sample a remote host over ssh instead of the local machine
    #[serde(default)]
    pub target_host: Option<String>,

    /// Sample a container through `docker stats`
    pub docker: bool,

    #[serde(default)]
    pub container_id: Option<String>,

    /// Log every sample as it is collected
    pub realtime_log: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint_url: None,
            scrape_interval_secs: 5,
            enable_system_monitor: false,
            target_host: None,
            docker: false,
            container_id: None,
            realtime_log: false,
        }
    }
}

impl MonitoringConfig {
    /// Get scrape interval duration
    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }
}
