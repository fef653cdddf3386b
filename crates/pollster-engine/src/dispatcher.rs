//! Per-round notification dispatch
//!
//! Every new object gets its own task: issue capabilities, build the
//! payload, deliver it. Tasks run concurrently up to `max_concurrent`;
//! launching blocks while the pool is full. `dispatch_round` returns only
//! once every task of the round has finished.

use pollster_auth::CapabilityIssuer;
use pollster_core::types::{NotificationPayload, ObjectKey};
use pollster_core::{PollsterConfig, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::notifier::Notifier;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub bucket: String,
    /// Advertised as `s3_endpoint` in every payload
    pub s3_endpoint: Option<String>,
    pub include_delete_url: bool,
    pub max_concurrent: usize,
}

impl DispatcherConfig {
    pub fn from_config(config: &PollsterConfig) -> Self {
        Self {
            bucket: config.storage.bucket.clone(),
            s3_endpoint: config.storage.public_endpoint.clone(),
            include_delete_url: config.webhook.include_delete_url,
            max_concurrent: config.webhook.max_concurrent.max(1),
        }
    }
}

/// Outcome counts for one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub launched: usize,
    pub dispatched: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    issuer: Arc<CapabilityIssuer>,
    config: Arc<DispatcherConfig>,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        issuer: Arc<CapabilityIssuer>,
        config: DispatcherConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            notifier,
            issuer,
            config: Arc::new(config),
            semaphore,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Notify the webhook about every key and wait for all deliveries.
    pub async fn dispatch_round(&self, keys: &[ObjectKey]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        if keys.is_empty() {
            return summary;
        }

        info!(
            bucket = %self.config.bucket,
            objects = keys.len(),
            max_concurrent = self.config.max_concurrent,
            "Dispatching notifications"
        );

        let mut tasks = JoinSet::new();
        for key in keys {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("Dispatch pool closed, skipping remaining objects");
                    break;
                }
            };

            let notifier = Arc::clone(&self.notifier);
            let issuer = Arc::clone(&self.issuer);
            let config = Arc::clone(&self.config);
            let key = key.clone();

            tasks.spawn(async move {
                let _permit = permit;
                dispatch_object(notifier.as_ref(), &issuer, &config, &key).await
            });
            summary.launched += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => summary.dispatched += 1,
                Ok(Err(_)) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "Dispatch task panicked");
                    summary.failed += 1;
                }
            }
        }

        debug!(?summary, "Dispatch round finished");
        summary
    }
}

async fn dispatch_object(
    notifier: &dyn Notifier,
    issuer: &CapabilityIssuer,
    config: &DispatcherConfig,
    key: &ObjectKey,
) -> Result<()> {
    let capabilities = match issuer.issue(&config.bucket, key.as_str()).await {
        Ok(capabilities) => capabilities,
        Err(e) => {
            error!(bucket = %config.bucket, key = %key, error = %e, "Failed to issue capabilities, skipping object");
            metrics::record_notification_failure("sign");
            return Err(e);
        }
    };

    let payload = NotificationPayload::from_capabilities(
        &capabilities,
        config.s3_endpoint.as_deref(),
        config.include_delete_url,
    );

    debug!(
        bucket = %config.bucket,
        key = %key,
        expires_at = %capabilities.expires_at(),
        "Sending notification"
    );

    match notifier.notify(&payload).await {
        Ok(()) => {
            metrics::record_notification_sent();
            Ok(())
        }
        Err(e) => {
            warn!(bucket = %config.bucket, key = %key, error = %e, "Webhook delivery failed");
            metrics::record_notification_failure("deliver");
            Err(e)
        }
    }
}
