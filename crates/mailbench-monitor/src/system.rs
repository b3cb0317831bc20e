//! Host and container resource sampling via shell utilities
//!
//! Output parsing is kept in free functions so it can be tested without the
//! utilities being installed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MonitorError, MonitorResult};
use crate::source::{MetricsSample, MetricsSource};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_PAGE_SIZE: f64 = 4096.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,

    pub cpu_usage_percent: f64,
    pub cpu_cores: usize,
    pub load_average_1m: f64,
    pub load_average_5m: f64,
    pub load_average_15m: f64,

    pub total_memory_mb: f64,
    pub used_memory_mb: f64,
    pub free_memory_mb: f64,
    pub memory_usage_percent: f64,

    pub tcp_established: u64,
}

/// Where samples are taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemTarget {
    Local,
    /// `user@host`, reached through `ssh`. Assumed to run Linux.
    Remote(String),
    /// Container name or id, sampled through `docker stats`.
    Container(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Memory figures in megabytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryReading {
    pub total_mb: f64,
    pub used_mb: f64,
    pub free_mb: f64,
}

impl MemoryReading {
    pub fn usage_percent(&self) -> f64 {
        if self.total_mb > 0.0 {
            self.used_mb / self.total_mb * 100.0
        } else {
            0.0
        }
    }
}

/// Value of the field preceding `suffix` in a comma separated summary line,
/// e.g. `95.3` for `id` in `"%Cpu(s):  3.1 us,  1.0 sy, 95.3 id"`.
fn field_before(line: &str, suffix: &str) -> Option<f64> {
    line.split(',').find_map(|part| {
        let mut words = part.split_whitespace().rev();
        let unit = words.next()?;
        if unit != suffix {
            return None;
        }
        words.next()?.trim_end_matches('%').parse().ok()
    })
}

/// CPU busy percentage from `top -bn1` (Linux) output.
pub fn parse_linux_top_cpu(output: &str) -> MonitorResult<f64> {
    let line = output
        .lines()
        .find(|line| line.contains("Cpu(s)"))
        .ok_or_else(|| MonitorError::parse("no Cpu(s) line in top output"))?;
    let (_, fields) = line
        .split_once(':')
        .ok_or_else(|| MonitorError::parse(format!("malformed top line: {line}")))?;

    if let Some(idle) = field_before(fields, "id") {
        return Ok((100.0 - idle).clamp(0.0, 100.0));
    }
    field_before(fields, "us")
        .ok_or_else(|| MonitorError::parse(format!("no CPU figures in: {line}")))
}

/// CPU busy percentage from `top -l 1 -n 0` (macOS) output.
pub fn parse_macos_top_cpu(output: &str) -> MonitorResult<f64> {
    let line = output
        .lines()
        .find(|line| line.contains("CPU usage"))
        .ok_or_else(|| MonitorError::parse("no CPU usage line in top output"))?;
    let (_, fields) = line
        .split_once(':')
        .ok_or_else(|| MonitorError::parse(format!("malformed top line: {line}")))?;

    if let Some(idle) = field_before(fields, "idle") {
        return Ok((100.0 - idle).clamp(0.0, 100.0));
    }
    field_before(fields, "user")
        .ok_or_else(|| MonitorError::parse(format!("no CPU figures in: {line}")))
}

/// The `Mem:` row of `free -m`.
pub fn parse_free(output: &str) -> MonitorResult<MemoryReading> {
    let line = output
        .lines()
        .find(|line| line.starts_with("Mem:"))
        .ok_or_else(|| MonitorError::parse("no Mem: row in free output"))?;
    let fields: Vec<f64> = line
        .split_whitespace()
        .skip(1)
        .map(|field| field.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| MonitorError::parse(format!("bad free row `{line}`: {e}")))?;

    if fields.len() < 3 {
        return Err(MonitorError::parse(format!("short free row: {line}")));
    }
    Ok(MemoryReading {
        total_mb: fields[0],
        used_mb: fields[1],
        free_mb: fields[2],
    })
}

/// `vm_stat` page counters. Used memory counts active, inactive and wired
/// pages.
pub fn parse_vm_stat(output: &str) -> MonitorResult<MemoryReading> {
    let page_size = output
        .lines()
        .next()
        .and_then(|header| {
            let (_, rest) = header.split_once("page size of ")?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .unwrap_or(DEFAULT_PAGE_SIZE);

    let pages = |key: &str| -> f64 {
        output
            .lines()
            .find_map(|line| {
                let value = line.strip_prefix(key)?.trim().trim_end_matches('.');
                value.parse::<f64>().ok()
            })
            .unwrap_or(0.0)
    };

    let free = pages("Pages free:");
    let used = pages("Pages active:") + pages("Pages inactive:") + pages("Pages wired down:");
    if free == 0.0 && used == 0.0 {
        return Err(MonitorError::parse("no page counters in vm_stat output"));
    }

    let free_mb = free * page_size / BYTES_PER_MB;
    let used_mb = used * page_size / BYTES_PER_MB;
    Ok(MemoryReading {
        total_mb: free_mb + used_mb,
        used_mb,
        free_mb,
    })
}

/// One-, five- and fifteen-minute load from `uptime`. Accepts both the Linux
/// (`load average: 1.0, 2.0, 3.0`) and macOS (`load averages: 1.0 2.0 3.0`)
/// forms.
pub fn parse_load_average(output: &str) -> MonitorResult<(f64, f64, f64)> {
    let start = output
        .find("load average")
        .ok_or_else(|| MonitorError::parse("no load average in uptime output"))?;
    let (_, figures) = output[start..]
        .split_once(':')
        .ok_or_else(|| MonitorError::parse("malformed uptime output"))?;

    let values: Vec<f64> = figures
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .take(3)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| MonitorError::parse(format!("bad load figure: {e}")))?;

    match values.as_slice() {
        [one, five, fifteen] => Ok((*one, *five, *fifteen)),
        _ => Err(MonitorError::parse("fewer than three load figures")),
    }
}

/// Established TCP connections in `netstat -an` output.
pub fn count_established(output: &str) -> u64 {
    output
        .lines()
        .filter(|line| line.contains("ESTABLISHED"))
        .count() as u64
}

/// Converts a docker size such as `123.4MiB` or `2GiB` to megabytes.
pub fn parse_memory_value(value: &str) -> MonitorResult<f64> {
    let value = value.trim();
    let split = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number
        .trim()
        .parse()
        .map_err(|e| MonitorError::parse(format!("bad size `{value}`: {e}")))?;

    let mb = match unit.to_ascii_uppercase().as_str() {
        "TIB" | "TB" | "T" => number * 1024.0 * 1024.0,
        "GIB" | "GB" | "G" => number * 1024.0,
        "MIB" | "MB" | "M" => number,
        "KIB" | "KB" | "K" => number / 1024.0,
        "B" | "" => number / BYTES_PER_MB,
        other => return Err(MonitorError::parse(format!("unknown size unit `{other}`"))),
    };
    Ok(mb)
}

/// `docker stats --format "{{.CPUPerc}}|{{.MemUsage}}"` output, e.g.
/// `12.50%|123.4MiB / 2GiB`.
pub fn parse_docker_stats(output: &str) -> MonitorResult<(f64, MemoryReading)> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| MonitorError::parse("empty docker stats output"))?;
    let (cpu, memory) = line
        .split_once('|')
        .ok_or_else(|| MonitorError::parse(format!("unexpected docker stats line: {line}")))?;

    let cpu = cpu
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|e| MonitorError::parse(format!("bad docker CPU `{cpu}`: {e}")))?;

    let (used, total) = memory
        .split_once('/')
        .ok_or_else(|| MonitorError::parse(format!("unexpected docker memory: {memory}")))?;
    let used_mb = parse_memory_value(used)?;
    let total_mb = parse_memory_value(total)?;

    Ok((
        cpu,
        MemoryReading {
            total_mb,
            used_mb,
            free_mb: (total_mb - used_mb).max(0.0),
        },
    ))
}

/// Samples CPU, memory, load and connection counts of a host or container.
#[derive(Debug, Clone)]
pub struct SystemMonitor {
    target: SystemTarget,
    platform: Platform,
    command_timeout: Duration,
}

impl SystemMonitor {
    pub fn new(target: SystemTarget) -> Self {
        let platform = match target {
            SystemTarget::Local => Platform::current(),
            _ => Platform::Linux,
        };
        Self {
            target,
            platform,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn target(&self) -> &SystemTarget {
        &self.target
    }

    async fn run(&self, program: &str, args: &[&str]) -> MonitorResult<String> {
        let rendered = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %rendered, "Running sampling command");

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        let output = tokio::time::timeout(self.command_timeout, command.output())
            .await
            .map_err(|_| MonitorError::command(&rendered, "timed out"))?
            .map_err(|e| MonitorError::command(&rendered, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MonitorError::command(
                &rendered,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs a host utility locally or over ssh.
    async fn run_host(&self, program: &str, args: &[&str]) -> MonitorResult<String> {
        match &self.target {
            SystemTarget::Remote(host) => {
                let remote = std::iter::once(program)
                    .chain(args.iter().copied())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.run("ssh", &[host.as_str(), remote.as_str()]).await
            }
            _ => self.run(program, args).await,
        }
    }

    async fn cpu_percent(&self) -> MonitorResult<f64> {
        match self.platform {
            Platform::Linux => parse_linux_top_cpu(&self.run_host("top", &["-bn1"]).await?),
            Platform::MacOs => {
                parse_macos_top_cpu(&self.run_host("top", &["-l", "1", "-n", "0"]).await?)
            }
        }
    }

    async fn memory(&self) -> MonitorResult<MemoryReading> {
        match self.platform {
            Platform::Linux => parse_free(&self.run_host("free", &["-m"]).await?),
            Platform::MacOs => parse_vm_stat(&self.run_host("vm_stat", &[]).await?),
        }
    }

    async fn sample_host(&self, metrics: &mut SystemMetrics) -> MonitorResult<()> {
        metrics.cpu_usage_percent = self.cpu_percent().await?;
        let memory = self.memory().await?;
        apply_memory(metrics, memory);

        match self.run_host("uptime", &[]).await.and_then(|out| parse_load_average(&out)) {
            Ok((one, five, fifteen)) => {
                metrics.load_average_1m = one;
                metrics.load_average_5m = five;
                metrics.load_average_15m = fifteen;
            }
            Err(e) => warn!(error = %e, "Failed to sample load average"),
        }

        match self.run_host("netstat", &["-an"]).await {
            Ok(out) => metrics.tcp_established = count_established(&out),
            Err(e) => warn!(error = %e, "Failed to sample connections"),
        }
        Ok(())
    }

    async fn sample_container(&self, id: &str, metrics: &mut SystemMetrics) -> MonitorResult<()> {
        let output = self
            .run(
                "docker",
                &[
                    "stats",
                    id,
                    "--no-stream",
                    "--format",
                    "{{.CPUPerc}}|{{.MemUsage}}",
                ],
            )
            .await?;
        let (cpu, memory) = parse_docker_stats(&output)?;
        metrics.cpu_usage_percent = cpu;
        apply_memory(metrics, memory);
        Ok(())
    }

    pub async fn sample(&self) -> MonitorResult<SystemMetrics> {
        let mut metrics = SystemMetrics {
            timestamp: Utc::now(),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            ..Default::default()
        };

        match &self.target {
            SystemTarget::Container(id) => self.sample_container(id, &mut metrics).await?,
            _ => self.sample_host(&mut metrics).await?,
        }
        Ok(metrics)
    }
}

fn apply_memory(metrics: &mut SystemMetrics, memory: MemoryReading) {
    metrics.total_memory_mb = memory.total_mb;
    metrics.used_memory_mb = memory.used_mb;
    metrics.free_memory_mb = memory.free_mb;
    metrics.memory_usage_percent = memory.usage_percent();
}

#[async_trait]
impl MetricsSource for SystemMonitor {
    fn name(&self) -> &str {
        "system"
    }

    async fn collect(&self) -> MonitorResult<MetricsSample> {
        self.sample().await.map(MetricsSample::System)
    }
}
