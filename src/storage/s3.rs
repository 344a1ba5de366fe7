//! S3-compatible backend built on the AWS SDK for Rust.
//!
//! Requests are signed with SigV4 and addressed path-style
//! (`{endpoint}/{bucket}/{key}`), which is what R2 and MinIO expect.
//! SDK retries are switched off; a failed call fails the request.

use super::{BackendError, ObjectStore, StoredObject};
use crate::config::S3Settings;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Builder, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{error::Error, fmt::Debug};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(settings: &S3Settings) -> Self {
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&settings.endpoint)
            .region(Region::new(settings.region.clone()))
            .credentials_provider(Credentials::new(
                &settings.access_key,
                &settings.secret_key,
                None,
                None,
                "song-feed-static",
            ))
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: Client::from_conf(config),
        }
    }
}

/// Flatten an SDK error into code + message.
fn backend_error<E, R>(err: &SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + Error + 'static,
    R: Debug,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(err).to_string());

    BackendError {
        code: err.code().map(str::to_string),
        message,
    }
}

fn to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, BackendError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| backend_error(&err))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                let last_modified = obj
                    .last_modified()
                    .and_then(to_chrono)
                    .unwrap_or_else(|| {
                        debug!("object {} has no LastModified, using epoch", key);
                        DateTime::UNIX_EPOCH
                    });
                Some(StoredObject { key, last_modified })
            })
            .collect();

        Ok(objects)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
    ) -> Result<(), BackendError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|err| backend_error(&err))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, BackendError> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_no_such_key())
                {
                    return Ok(None);
                }
                return Err(backend_error(&err));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|err| BackendError::transport(err.to_string()))?;
        Ok(Some(body.into_bytes()))
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BackendError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_not_found())
                {
                    Ok(false)
                } else {
                    Err(backend_error(&err))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| backend_error(&err))?;
        Ok(())
    }
}
