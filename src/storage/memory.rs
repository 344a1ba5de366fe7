//! In-process object store.
//!
//! Keys are kept in a `BTreeMap` so listings come back in lexicographic
//! order, matching what S3 returns for ListObjectsV2.

use super::{BackendError, ObjectStore, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct Entry {
    content: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `bucket` already created.
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.buckets.write().insert(bucket.to_string(), BTreeMap::new());
        store
    }

    /// Insert an object with an explicit timestamp.
    pub fn insert(&self, bucket: &str, key: &str, content: Bytes, last_modified: DateTime<Utc>) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                Entry {
                    content,
                    last_modified,
                },
            );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|entry| entry.content.clone())
    }

    pub fn len(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }
}

fn no_such_bucket(bucket: &str) -> BackendError {
    BackendError::new(
        "NoSuchBucket",
        format!("The specified bucket does not exist: {}", bucket),
    )
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, BackendError> {
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(objects
            .iter()
            .map(|(key, entry)| StoredObject {
                key: key.clone(),
                last_modified: entry.last_modified,
            })
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
    ) -> Result<(), BackendError> {
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects.insert(
            key.to_string(),
            Entry {
                content,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BackendError> {
        let buckets = self.buckets.read();
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(objects.get(key).map(|entry| entry.content.clone()))
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BackendError> {
        Ok(self.buckets.read().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        self.buckets.write().entry(bucket.to_string()).or_default();
        Ok(())
    }
}
