use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use mailbench_bench::{
    generate_user_ids, render_comparison, seed_if_empty, seed_mailboxes, BenchmarkReport,
    BenchmarkSettings, LoadSettings, RequestGenerator, SearchBenchmark, SeedSummary, StressTest,
    StressTestResult,
};
use mailbench_client::HttpMailGateway;
use mailbench_core::config::{StoreConfig, StressTestConfig};
use mailbench_core::{MailOperationGateway, MailStore, MailbenchConfig};
use mailbench_monitor::{render_summary, save_report, MonitoringManager};
use mailbench_storage::{DirectStoreGateway, MemoryMailStore};

mod report;

use report::{render_stress_summary, Reporter, RunReport};

/// Generator streams reserved outside the per-worker range.
const SEED_STREAM: u64 = u64::MAX;
const BENCHMARK_STREAM: u64 = u64::MAX - 1;
const SAMPLE_STREAM: u64 = u64::MAX - 2;

#[derive(Parser, Debug)]
#[command(name = "mailbench")]
#[command(about = "Mail service load generator and search strategy benchmark", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, env = "MAILBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Populate mailboxes before testing
    #[arg(long)]
    seed_data: bool,

    /// Skip the load test
    #[arg(long)]
    skip_stress: bool,

    /// Skip the search strategy benchmark
    #[arg(long)]
    skip_benchmark: bool,

    /// Drive the remote HTTP service instead of the local store
    #[arg(long)]
    use_api: bool,

    /// Fixed RNG seed for a reproducible workload
    #[arg(long)]
    seed: Option<u64>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    let mut config =
        MailbenchConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if args.use_api {
        config.stress_test.use_api = true;
    }
    if args.seed.is_some() {
        config.stress_test.seed = args.seed;
    }

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    let store = build_store(&config.store)?;
    let gateway = build_gateway(&config.stress_test, Arc::clone(&store))?;
    info!(
        backend = gateway.backend(),
        database = %config.store.database,
        "Mail gateway ready"
    );

    let users = generate_user_ids(config.stress_test.num_users);
    let generator = match config.stress_test.seed {
        Some(seed) => RequestGenerator::with_seed(users, seed)?,
        None => RequestGenerator::new(users)?,
    };

    let seeding = if args.seed_data {
        Some(seed(&config.stress_test, gateway.as_ref(), &generator, &cancel).await?)
    } else {
        None
    };

    let monitor = MonitoringManager::from_config(&config.monitoring)?;
    if let Some(monitor) = &monitor {
        monitor.start().await;
    }

    let stress = if args.skip_stress || cancel.is_cancelled() {
        None
    } else {
        Some(run_stress(&config, &generator, Arc::clone(&gateway), &cancel).await?)
    };

    let benchmark = if args.skip_benchmark || cancel.is_cancelled() {
        None
    } else {
        Some(run_benchmark(&config, Arc::clone(&store), &generator, &cancel).await?)
    };

    if let Some(monitor) = &monitor {
        let report = monitor.stop().await;
        println!("{}", render_summary(&report));
        if let Err(e) = save_report(&report, &config.report.output_dir).await {
            warn!(error = %e, "Failed to save monitoring report");
        }
    }

    let run = RunReport {
        timestamp: chrono::Utc::now(),
        backend: gateway.backend(),
        database: &config.store.database,
        seeding: seeding.as_ref(),
        stress_test_result: stress.as_ref(),
        search_benchmark: benchmark.as_ref(),
    };
    if !run.is_empty() {
        let reporter = Reporter::new(&config.report);
        reporter.write(&run).await?;
        println!("Reports generated in: {}", reporter.output_dir().display());
    }

    if cancel.is_cancelled() {
        println!("\nRun interrupted; partial results were reported.");
    } else {
        println!("\n✅ Benchmark completed successfully!");
    }
    Ok(())
}

fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn MailStore>> {
    match config.kind.as_str() {
        "memory" => Ok(Arc::new(MemoryMailStore::new())),
        other => bail!("unsupported store kind `{other}`"),
    }
}

fn build_gateway(
    config: &StressTestConfig,
    store: Arc<dyn MailStore>,
) -> anyhow::Result<Arc<dyn MailOperationGateway>> {
    if config.use_api {
        info!(endpoint = %config.api_endpoint, "Using remote mail service");
        let gateway = HttpMailGateway::new(config.api_endpoint.clone(), config.api_timeout())?;
        Ok(Arc::new(gateway))
    } else {
        Ok(Arc::new(DirectStoreGateway::new(store)))
    }
}

async fn seed(
    config: &StressTestConfig,
    gateway: &dyn MailOperationGateway,
    generator: &RequestGenerator,
    cancel: &CancellationToken,
) -> anyhow::Result<SeedSummary> {
    let count = (config.num_users as u64).saturating_mul(config.num_mails_per_user as u64);
    println!("\n=== Seeding Test Data ===");

    let pb = ProgressBar::new(count);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} mails ({eta})")?
            .progress_chars("#>-"),
    );

    let mut generator = generator.fork(SEED_STREAM);
    let summary = seed_mailboxes(gateway, &mut generator, count, cancel, |n| pb.set_position(n)).await;
    pb.finish_and_clear();

    println!(
        "Seeded {} mails ({} failed) in {:.2}s",
        summary.created,
        summary.failed,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

async fn run_stress(
    config: &MailbenchConfig,
    generator: &RequestGenerator,
    gateway: Arc<dyn MailOperationGateway>,
    cancel: &CancellationToken,
) -> anyhow::Result<StressTestResult> {
    println!("\n=== Running Stress Test ===");
    let engine = StressTest::new(
        LoadSettings::from_config(&config.stress_test),
        generator.clone(),
        gateway,
    )?;
    let result = engine.run(cancel.clone()).await?;
    println!("{}", render_stress_summary(&result));
    Ok(result)
}

async fn run_benchmark(
    config: &MailbenchConfig,
    store: Arc<dyn MailStore>,
    generator: &RequestGenerator,
    cancel: &CancellationToken,
) -> anyhow::Result<BenchmarkReport> {
    println!("\n=== Running Search Benchmark ===");
    let sample_gateway = DirectStoreGateway::new(Arc::clone(&store));
    let mut sample_generator = generator.fork(SAMPLE_STREAM);
    let sample_size = config.benchmark.sample_size as u64;
    if let Some(summary) = seed_if_empty(
        store.as_ref(),
        &sample_gateway,
        &mut sample_generator,
        sample_size,
        cancel,
    )
    .await?
    {
        println!("Seeded {} sample mails into the local store", summary.created);
    } else if store.count_mails().await? == 0 {
        warn!("Local store is empty; search strategies will return no rows");
    }

    let strategies = mailbench_search::build_strategies(&config.benchmark.search_methods, store)?;
    let mut benchmark = SearchBenchmark::new(
        strategies,
        generator.fork(BENCHMARK_STREAM),
        BenchmarkSettings::from_config(&config.benchmark),
    )?;
    let report = benchmark.run(cancel).await;
    println!("{}", render_comparison(&report));
    Ok(report)
}

fn install_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                println!("\nShutting down gracefully...");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
