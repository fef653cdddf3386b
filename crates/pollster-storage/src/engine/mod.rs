//! Storage engine implementations

mod memory;
mod s3;

use async_trait::async_trait;
use pollster_core::types::{ListPage, ObjectKey, Snapshot};
use pollster_core::Result;
use tracing::debug;

pub use memory::{MemoryObjectStore, StoreOp};
pub use s3::{build_s3_client, S3ObjectStore};

/// Object store operations the poller depends on
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of keys, starting after `continuation_token`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: i32,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    /// Delete a single object
    async fn delete_object(&self, bucket: &str, key: &ObjectKey) -> Result<()>;

    /// Create the bucket; succeeds when it already exists
    async fn create_bucket(&self, bucket: &str) -> Result<()>;
}

/// Take a snapshot of the bucket, following continuation markers for at
/// most `max_pages` pages (`0` means until the listing is exhausted).
pub async fn list_snapshot<S: ObjectStore + ?Sized>(
    store: &S,
    bucket: &str,
    prefix: Option<&str>,
    page_size: i32,
    max_pages: usize,
) -> Result<Snapshot> {
    let mut snapshot = Snapshot::default();
    let mut continuation_token: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = store
            .list_objects(bucket, prefix, page_size, continuation_token.take())
            .await?;
        pages += 1;
        let truncated = page.is_truncated();
        continuation_token = page.next_continuation_token.clone();
        snapshot.extend(page);

        if !truncated || (max_pages != 0 && pages >= max_pages) {
            break;
        }
    }

    debug!(bucket, pages, objects = snapshot.len(), "Listed bucket");
    Ok(snapshot)
}
