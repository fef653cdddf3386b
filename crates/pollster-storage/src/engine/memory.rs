//! In-process object store
//!
//! Keeps buckets as sorted key sets and records every call in a journal so
//! callers can check the order in which listing and deletion happened.

use async_trait::async_trait;
use parking_lot::Mutex;
use pollster_core::types::{ListPage, ObjectKey};
use pollster_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    List { bucket: String },
    Delete { bucket: String, key: String },
    CreateBucket { bucket: String },
}

#[derive(Default)]
struct Inner {
    buckets: BTreeMap<String, BTreeSet<String>>,
    journal: Vec<StoreOp>,
    list_failures: Vec<String>,
    failing_deletes: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object, creating the bucket if needed. Not journaled.
    pub fn put_object(&self, bucket: &str, key: &str) {
        self.inner
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string());
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.inner
            .lock()
            .buckets
            .get(bucket)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn journal(&self) -> Vec<StoreOp> {
        self.inner.lock().journal.clone()
    }

    /// Keys deleted so far, in call order
    pub fn deleted_keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .journal
            .iter()
            .filter_map(|op| match op {
                StoreOp::Delete { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Make the next listing call fail with `message`
    pub fn fail_next_list(&self, message: &str) {
        self.inner.lock().list_failures.push(message.to_string());
    }

    /// Make every deletion of `key` fail until cleared
    pub fn fail_deletes_of(&self, key: &str) {
        self.inner.lock().failing_deletes.insert(key.to_string());
    }
}

#[async_trait]
impl super::ObjectStore for MemoryObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: i32,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut inner = self.inner.lock();
        inner.journal.push(StoreOp::List {
            bucket: bucket.to_string(),
        });

        if let Some(message) = inner.list_failures.pop() {
            return Err(Error::ListFailed {
                bucket: bucket.to_string(),
                message,
            });
        }

        let keys = inner
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::NoSuchBucket(bucket.to_string()))?;

        // The continuation token is the last key of the previous page.
        let max_keys = max_keys.max(1) as usize;
        let mut page: Vec<ObjectKey> = keys
            .iter()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .filter(|k| continuation_token.as_deref().map_or(true, |t| k.as_str() > t))
            .take(max_keys + 1)
            .map(|k| ObjectKey::new(k.as_str()))
            .collect();

        let next_continuation_token = if page.len() > max_keys {
            page.truncate(max_keys);
            page.last().map(|k| k.as_str().to_string())
        } else {
            None
        };

        Ok(ListPage {
            keys: page,
            next_continuation_token,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &ObjectKey) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.journal.push(StoreOp::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        if inner.failing_deletes.contains(key.as_str()) {
            return Err(Error::DeleteFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected failure".into(),
            });
        }

        // Deleting a missing key succeeds, as on S3.
        if let Some(keys) = inner.buckets.get_mut(bucket) {
            keys.remove(key.as_str());
        }
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.journal.push(StoreOp::CreateBucket {
            bucket: bucket.to_string(),
        });
        inner.buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ObjectStore;

    #[tokio::test]
    async fn test_create_bucket_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.create_bucket("inbox").await.unwrap();
        store.put_object("inbox", "a");
        store.create_bucket("inbox").await.unwrap();
        assert_eq!(store.keys("inbox"), vec!["a"]);
    }

    #[tokio::test]
    async fn test_list_missing_bucket() {
        let store = MemoryObjectStore::new();
        let result = store.list_objects("nope", None, 10, None).await;
        assert!(matches!(result, Err(Error::NoSuchBucket(_))));
    }

    #[tokio::test]
    async fn test_pagination() {
        let store = MemoryObjectStore::new();
        for key in ["a", "b", "c"] {
            store.put_object("inbox", key);
        }

        let first = store.list_objects("inbox", None, 2, None).await.unwrap();
        assert_eq!(first.keys, vec![ObjectKey::new("a"), ObjectKey::new("b")]);
        assert!(first.is_truncated());

        let second = store
            .list_objects("inbox", None, 2, first.next_continuation_token)
            .await
            .unwrap();
        assert_eq!(second.keys, vec![ObjectKey::new("c")]);
        assert!(!second.is_truncated());
    }

    #[tokio::test]
    async fn test_delete_and_injected_failure() {
        let store = MemoryObjectStore::new();
        store.put_object("inbox", "a");
        store.put_object("inbox", "b");
        store.fail_deletes_of("b");

        store.delete_object("inbox", &"a".into()).await.unwrap();
        assert!(store.delete_object("inbox", &"b".into()).await.is_err());
        assert_eq!(store.keys("inbox"), vec!["b"]);
        assert_eq!(store.deleted_keys(), vec!["a", "b"]);
    }
}
