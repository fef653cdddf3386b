//! Deletion of keys reported in the previous round

use pollster_core::types::ObjectKey;
use pollster_storage::ObjectStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::metrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Deletes keys one at a time. A failed deletion is logged and skipped;
/// the key is not retried.
pub struct Reaper {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl Reaper {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn reap(&self, keys: &[ObjectKey]) -> ReapSummary {
        let mut summary = ReapSummary::default();
        if keys.is_empty() {
            return summary;
        }

        debug!(bucket = %self.bucket, objects = keys.len(), "Reaping previous round");

        for key in keys {
            match self.store.delete_object(&self.bucket, key).await {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    warn!(bucket = %self.bucket, key = %key, error = %e, "Failed to delete object");
                    summary.failed += 1;
                }
            }
        }

        metrics::record_reap(summary.deleted, summary.failed);
        info!(
            bucket = %self.bucket,
            deleted = summary.deleted,
            failed = summary.failed,
            "Reaped objects"
        );
        summary
    }
}
