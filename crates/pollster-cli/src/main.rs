//! Pollster - relays newly uploaded bucket objects to a webhook
//!
//! Polls an S3-compatible bucket, POSTs signed GET/PUT/DELETE URLs for every
//! new object to a webhook and deletes each object one round later.

mod app;
mod logging;

use clap::{Parser, Subcommand};
use pollster_core::PollsterConfig;
use pollster_storage::S3ObjectStore;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pollster")]
#[command(author = "Pollster Team")]
#[command(version = pollster_core::VERSION)]
#[command(about = "Relay new bucket objects to a webhook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "POLLSTER_CONFIG")]
    config: Option<String>,

    /// Bucket to watch
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// S3 endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Webhook URL receiving notifications
    #[arg(long, global = true)]
    webhook: Option<String>,

    /// Seconds to sleep between rounds
    #[arg(long, global = true)]
    backoff: Option<u64>,

    /// Maximum in-flight webhook deliveries
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Poll until interrupted (default)
    Run,

    /// Run a single round and exit
    Once,

    /// Validate the configuration and exit
    Check,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<PollsterConfig> {
        let mut config = match &self.config {
            Some(path) => PollsterConfig::from_file(path)?,
            None => PollsterConfig::from_env()?,
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut PollsterConfig) {
        if let Some(bucket) = &self.bucket {
            config.storage.bucket = bucket.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.storage.endpoint = endpoint.clone();
        }
        if let Some(webhook) = &self.webhook {
            config.webhook.url = Some(webhook.clone());
        }
        if let Some(backoff) = self.backoff {
            config.poll.backoff_secs = backoff;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.webhook.max_concurrent = max_concurrent;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    logging::init_logging(&config.logging)?;

    let command = cli.command.unwrap_or(Commands::Run);
    if command == Commands::Check {
        config.validate()?;
        println!("Configuration OK (bucket {})", config.storage.bucket);
        return Ok(());
    }

    // Fail on bad configuration before a client is even built.
    config.validate()?;
    app::install_metrics(&config)?;

    let store = S3ObjectStore::from_config(&config.storage);
    let client = store.client().clone();
    let mut poll_loop = app::prepare(&config, Arc::new(store), client).await?;

    match command {
        Commands::Once => {
            let report = poll_loop.run_once().await?;
            info!(?report, "Single round finished");
        }
        _ => {
            let shutdown = CancellationToken::new();
            tokio::spawn(wait_for_signal(shutdown.clone()));
            poll_loop.run(shutdown).await;
        }
    }

    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}
