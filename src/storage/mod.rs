//! Object-store backends.
//!
//! The HTTP layer never talks to a backend directly; it goes through
//! `StorageGateway`, which holds one of these behind an `Arc<dyn ObjectStore>`.
//!
//! - `s3`     — any S3-compatible service (Cloudflare R2, MinIO, AWS) via the AWS SDK
//! - `memory` — process-local map, used by tests and `--memory-store`

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

pub mod memory;
pub mod s3;

/// A single entry returned by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Failure reported by a backend.
///
/// `code` is the service's machine-readable error code (`NoSuchBucket`,
/// `AccessDenied`, ...) when one was returned.
#[derive(Debug, Clone)]
pub struct BackendError {
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error without a service code (connection refused, timeouts, ...).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the objects of `bucket` in the order the service returns them.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, BackendError>;

    async fn put_object(&self, bucket: &str, key: &str, content: Bytes)
    -> Result<(), BackendError>;

    /// Object bytes, or `None` when `key` does not exist in `bucket`.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BackendError>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BackendError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), BackendError>;
}
