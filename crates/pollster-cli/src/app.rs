//! Wiring from configuration to a ready-to-run poll loop

use anyhow::Context;
use aws_sdk_s3::Client;
use metrics_exporter_prometheus::PrometheusBuilder;
use pollster_auth::CapabilityIssuer;
use pollster_core::PollsterConfig;
use pollster_engine::{Dispatcher, DispatcherConfig, PollLoop, PollOptions, Reaper, WebhookNotifier};
use pollster_storage::ObjectStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Validate `config`, make sure the bucket exists and assemble the loop.
///
/// Validation happens before the store is touched, so a bad configuration
/// never results in a storage call. `client` presigns capability URLs and
/// should be the one behind `store`.
pub async fn prepare(
    config: &PollsterConfig,
    store: Arc<dyn ObjectStore>,
    client: Client,
) -> anyhow::Result<PollLoop> {
    config.validate().context("Invalid configuration")?;

    let issuer = CapabilityIssuer::new(client, config.presign.expires_in())?;
    let notifier = WebhookNotifier::from_config(&config.webhook)?;

    if config.storage.create_bucket {
        store
            .create_bucket(&config.storage.bucket)
            .await
            .with_context(|| format!("Failed to create bucket {}", config.storage.bucket))?;
    }

    info!(
        bucket = %config.storage.bucket,
        endpoint = %config.storage.endpoint,
        webhook = %notifier.url(),
        max_concurrent = config.webhook.max_concurrent,
        "Pollster configured"
    );

    let dispatcher = Dispatcher::new(
        Arc::new(notifier),
        Arc::new(issuer),
        DispatcherConfig::from_config(config),
    );
    let reaper = Reaper::new(Arc::clone(&store), config.storage.bucket.clone());

    Ok(PollLoop::new(store, dispatcher, reaper, PollOptions::from_config(config)))
}

/// Serve Prometheus metrics when a listen address is configured.
pub fn install_metrics(config: &PollsterConfig) -> anyhow::Result<()> {
    let Some(address) = &config.metrics.listen_address else {
        return Ok(());
    };

    let addr: SocketAddr = address
        .parse()
        .with_context(|| format!("Invalid metrics listen address {}", address))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Prometheus metrics at http://{}/metrics", addr);
    Ok(())
}
