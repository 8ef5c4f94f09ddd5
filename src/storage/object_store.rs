//! Object-store client abstraction and the S3/MinIO implementation.
//!
//! The uploader only needs two operations: make sure the bucket exists and
//! put a local file under a key. They live behind the `ObjectStore` trait so
//! tests can swap in an in-memory store with failure injection.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;

use crate::config::StoreConfig;

/// Errors from object-store operations.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// IO operation failed while reading a local file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bucket existence check or creation failed.
    #[error("Bucket operation failed for '{bucket}': {message}")]
    Bucket { bucket: String, message: String },

    /// Putting an object failed.
    #[error("Put failed for key '{key}': {message}")]
    Put { key: String, message: String },
}

/// Minimal object-store surface needed by the uploader.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Ensures the bucket exists, creating it if absent.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError>;

    /// Uploads the file at `path` to `bucket` under `key`.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path)
        -> Result<(), ObjectStoreError>;
}

/// S3-compatible object store client (AWS S3, MinIO).
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    /// Builds a client from the store configuration.
    ///
    /// A custom endpoint (MinIO) implies path-style addressing, since
    /// virtual-hosted-style requests need DNS per bucket.
    pub async fn connect(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (config.access_key.as_deref(), config.secret_key.as_deref())
        {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key, secret_key, None, None, "logtriage",
            ));
        }

        let base = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&base);

        if let Some(endpoint) = config.endpoint.as_deref() {
            builder = builder
                .endpoint_url(config.endpoint_url(endpoint))
                .force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracing::debug!(bucket, "using existing bucket");
                Ok(())
            }
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if !not_found {
                    return Err(ObjectStoreError::Bucket {
                        bucket: bucket.to_string(),
                        message: err.to_string(),
                    });
                }
                self.client
                    .create_bucket()
                    .bucket(bucket)
                    .send()
                    .await
                    .map_err(|e| ObjectStoreError::Bucket {
                        bucket: bucket.to_string(),
                        message: e.to_string(),
                    })?;
                tracing::info!(bucket, "created bucket");
                Ok(())
            }
        }
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<(), ObjectStoreError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| ObjectStoreError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}
