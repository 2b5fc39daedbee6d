use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::archive::ObjectStoreArchive;
use common::cli::{CommonArgs, utils};
use common::config::Configuration;
use common::metrics::{PrometheusMetrics, metrics_router};
use common::store::create_log_store;
use messaging::{BackendConfig, MessagingBackend};
use processor::{IngestConsumer, Policy};
use retention::{RetentionPolicies, RetentionScheduler, SchedulerOptions};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "logsync")]
#[command(about = "logsync - log ingestion and retention pipeline")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume log entries from the broker, filter and enrich them, and store them
    Processor,
    /// Archive and delete log entries past their service's retention
    Retention {
        #[arg(long, help = "Run a single pass even if an interval is configured")]
        once: bool,

        #[arg(long, help = "Select and log expired records without archiving or deleting")]
        dry_run: bool,
    },
    /// Show the effective configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    // Load application configuration
    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command {
        Command::Config { json } => utils::display_config(&config, json),
        Command::Processor => {
            utils::validate_config(&config)?;
            run_processor(config).await
        }
        Command::Retention { once, dry_run } => {
            utils::validate_config(&config)?;
            run_retention(config, once, dry_run).await
        }
    }
}

async fn run_processor(config: Configuration) -> Result<()> {
    let metrics = PrometheusMetrics::new().context("Failed to create metrics registry")?;
    let store = create_log_store(&config.store).context("Failed to create log store")?;

    let broker = BackendConfig::from(&config.broker)
        .create_backend()
        .await
        .context("Failed to connect to broker")?;
    let stream = broker
        .subscribe(&config.broker.topic)
        .await
        .with_context(|| format!("Failed to subscribe to topic {}", config.broker.topic))?;

    let listener = tokio::net::TcpListener::bind(config.metrics.listen)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", config.metrics.listen))?;
    info!(addr = %config.metrics.listen, "Serving metrics on /metrics");

    let (metrics_shutdown_tx, metrics_shutdown_rx) = oneshot::channel::<()>();
    let app = metrics_router(metrics.clone());
    let metrics_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = metrics_shutdown_rx.await;
            })
            .await
    });

    let consumer = IngestConsumer::new(
        Arc::new(Policy::from_config(&config.policy)),
        store,
        Arc::new(metrics),
    );

    info!(
        topic = %config.broker.topic,
        rules = config.policy.rules.len(),
        "Processor started"
    );
    let summary = consumer.run_until(stream, shutdown_signal()).await;
    info!(
        received = summary.received,
        persisted = summary.persisted,
        "Processor stopped"
    );

    let _ = metrics_shutdown_tx.send(());
    metrics_handle
        .await
        .context("Metrics server task panicked")?
        .context("Metrics server failed")?;

    Ok(())
}

async fn run_retention(config: Configuration, once: bool, dry_run: bool) -> Result<()> {
    let store = create_log_store(&config.store).context("Failed to create log store")?;
    let archive =
        ObjectStoreArchive::new(&config.archive).context("Failed to create archive target")?;

    let mut options = SchedulerOptions::from(&config.retention);
    options.dry_run |= dry_run;

    let scheduler = RetentionScheduler::new(store, Arc::new(archive), options);
    let policy_path = &config.retention.config_path;

    match config.retention.interval.filter(|_| !once) {
        Some(interval) => {
            info!(
                interval = ?interval,
                path = %policy_path.display(),
                "Starting periodic retention"
            );
            scheduler
                .run_periodically(policy_path, interval, shutdown_signal())
                .await;
        }
        None => {
            let policies = RetentionPolicies::load(policy_path).with_context(|| {
                format!(
                    "Failed to load retention policies from {}",
                    policy_path.display()
                )
            })?;

            let result = scheduler.run(&policies).await;
            if result.total_failures() > 0 {
                warn!(
                    failures = result.total_failures(),
                    "Retention run left records behind, they will be retried on the next run"
                );
            }
        }
    }

    let metrics = scheduler.metrics();
    info!(
        services_processed = metrics.services_processed(),
        services_skipped = metrics.services_skipped(),
        selected = metrics.records_selected(),
        archived = metrics.records_archived(),
        deleted = metrics.records_deleted(),
        archive_failures = metrics.archive_failures(),
        delete_failures = metrics.delete_failures(),
        duration_ms = metrics.total_duration_ms(),
        "Retention stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl+c signal");
        std::future::pending::<()>().await;
    }
}
