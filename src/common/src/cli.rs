use clap::Parser;
use std::path::PathBuf;

/// CLI arguments shared by every logsync subcommand
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

impl CommonArgs {
    /// Log filter directive selected by the flags, if any
    pub fn level_override(&self) -> Option<&'static str> {
        if self.quiet {
            Some("warn")
        } else if self.verbose {
            Some("debug")
        } else {
            None
        }
    }
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::{BrokerBackend, Configuration, StoreBackend};
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging. `--quiet`/`--verbose` win over `RUST_LOG`,
    /// which wins over the `info` default.
    pub fn init_logging(args: &CommonArgs) {
        let filter = match args.level_override() {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("logsync configuration:");
            println!("======================");
            println!(
                "Broker: {:?} {} (topic {})",
                config.broker.backend, config.broker.url, config.broker.topic
            );
            println!(
                "Store: {:?} {} (index {})",
                config.store.backend, config.store.url, config.store.index
            );
            println!(
                "Archive: {} (region {})",
                config.archive.url, config.archive.region
            );
            println!("Metrics listen address: {}", config.metrics.listen);
            for rule in &config.policy.rules {
                println!("Filter rule: {}", rule.name);
            }
            println!(
                "Retention policies: {}",
                config.retention.config_path.display()
            );
            match config.retention.interval {
                Some(interval) => println!("Retention interval: {interval:?}"),
                None => println!("Retention interval: run once"),
            }
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        if config.broker.topic.is_empty() {
            anyhow::bail!("Broker topic cannot be empty");
        }

        if config.broker.backend == BrokerBackend::Nats && config.broker.url.is_empty() {
            anyhow::bail!("Broker URL cannot be empty for the nats backend");
        }

        if config.broker.backend == BrokerBackend::Memory && config.broker.capacity == 0 {
            anyhow::bail!("Broker capacity must be greater than zero");
        }

        if config.store.backend == StoreBackend::Elasticsearch && config.store.url.is_empty() {
            anyhow::bail!("Store URL cannot be empty for the elasticsearch backend");
        }

        if config.retention.page_size == 0 {
            anyhow::bail!("Retention page size must be greater than zero");
        }

        if config.retention.max_pages == 0 {
            anyhow::bail!("Retention max pages must be greater than zero");
        }

        for rule in &config.policy.rules {
            if rule.conditions.is_empty() {
                tracing::warn!(rule = %rule.name, "Filter rule has no conditions and never matches");
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
