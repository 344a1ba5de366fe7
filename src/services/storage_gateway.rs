//! src/services/storage_gateway.rs
//!
//! StorageGateway — the only component that talks to object storage. It is
//! built once at startup and cloned into every request; clones share the
//! same backend handle.
//!
//! A gateway built without complete credentials is *disabled*: every
//! operation returns `StorageError::Unavailable` instead of reaching out.

use crate::{
    config::StorageConfig,
    storage::{BackendError, ObjectStore, StoredObject, s3::S3Store},
};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service error codes that a listing treats as "nothing there yet".
const EMPTY_LISTING_CODES: [&str; 3] = ["NoSuchBucket", "NotFound", "AccessDenied"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is not configured")]
    Unavailable,
    #[error("{code}: {message}")]
    Transport { code: String, message: String },
    #[error("upload failed: {0}")]
    UploadFailed(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Clone)]
struct Backend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    endpoint: String,
}

#[derive(Clone)]
pub struct StorageGateway {
    backend: Option<Backend>,
}

impl StorageGateway {
    /// Gateway with no backend; all operations report `Unavailable`.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Wrap an already constructed backend. `endpoint` is the public base
    /// URL used to build song links.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            backend: Some(Backend {
                store,
                bucket: bucket.into(),
                endpoint: endpoint.into().trim_end_matches('/').to_string(),
            }),
        }
    }

    /// Build the gateway from configuration and make sure the bucket exists.
    ///
    /// Missing credentials leave the gateway disabled; they never abort startup.
    pub async fn connect(cfg: &StorageConfig) -> Self {
        let Some(settings) = cfg.s3_settings() else {
            warn!(
                "object storage disabled, missing settings: {}",
                cfg.missing().join(", ")
            );
            return Self::disabled();
        };

        info!(
            "using object storage at {} (bucket `{}`)",
            settings.endpoint, settings.bucket
        );
        let store = Arc::new(S3Store::new(&settings));
        let gateway = Self::new(store, settings.bucket, settings.endpoint);
        gateway.ensure_bucket().await;
        gateway
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Configured bucket, if the gateway is enabled.
    pub fn bucket(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.bucket.as_str())
    }

    /// Base URL of the object store with any trailing slash removed.
    pub fn endpoint(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.endpoint.as_str())
    }

    fn backend(&self) -> StorageResult<&Backend> {
        self.backend.as_ref().ok_or(StorageError::Unavailable)
    }

    /// Create the configured bucket when it does not exist yet.
    /// Failures are logged only.
    pub async fn ensure_bucket(&self) {
        let Ok(backend) = self.backend() else {
            return;
        };
        let bucket = backend.bucket.as_str();

        match backend.store.bucket_exists(bucket).await {
            Ok(true) => debug!("bucket `{}` exists", bucket),
            Ok(false) => match backend.store.create_bucket(bucket).await {
                Ok(()) => info!("created bucket `{}`", bucket),
                Err(err) => warn!("could not create bucket `{}`: {}", bucket, err),
            },
            Err(err) => warn!("could not check bucket `{}`: {}", bucket, err),
        }
    }

    /// List every object in `bucket`.
    ///
    /// `NoSuchBucket`, `NotFound` and `AccessDenied` come back as an empty
    /// listing; other backend failures surface as `Transport`.
    pub async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<StoredObject>> {
        let backend = self.backend()?;
        debug!("listing objects in bucket `{}`", bucket);

        match backend.store.list_objects(bucket).await {
            Ok(objects) => {
                debug!("bucket `{}` returned {} objects", bucket, objects.len());
                Ok(objects)
            }
            Err(err) if is_empty_listing(&err) => {
                info!("treating `{}` listing as empty: {}", bucket, err);
                Ok(Vec::new())
            }
            Err(err) => Err(StorageError::Transport {
                code: err.code.unwrap_or_else(|| "TransportError".into()),
                message: err.message,
            }),
        }
    }

    /// Store `content` under `key`. No retries.
    pub async fn put_object(&self, bucket: &str, key: &str, content: Bytes) -> StorageResult<()> {
        let backend = self.backend()?;
        let size = content.len();

        backend
            .store
            .put_object(bucket, key, content)
            .await
            .map_err(|err| StorageError::UploadFailed(err.to_string()))?;

        debug!("stored `{}` ({} bytes) in bucket `{}`", key, size, bucket);
        Ok(())
    }

    /// Fetch the bytes stored under `key`; `None` when there is no such object.
    pub async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Option<Bytes>> {
        let backend = self.backend()?;

        backend
            .store
            .get_object(bucket, key)
            .await
            .map_err(|err| StorageError::Transport {
                code: err.code.unwrap_or_else(|| "TransportError".into()),
                message: err.message,
            })
    }
}

fn is_empty_listing(err: &BackendError) -> bool {
    err.code()
        .is_some_and(|code| EMPTY_LISTING_CODES.contains(&code))
}
