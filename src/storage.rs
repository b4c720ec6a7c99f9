//! Blob storage adapter
//!
//! Image bytes are written to S3 under `{scraping_id}/{uuid}.{ext}` with the
//! response content type. The [`BlobStore`] trait is the test seam.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Stores raw bytes under a key and returns the blob path
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `data` under `key` with the given content type
    ///
    /// Returns the full blob path (`s3://bucket/key`).
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str)
        -> Result<String>;
}

/// S3-backed implementation of [`BlobStore`]
///
/// Uses path-style addressing so S3-compatible endpoints (MinIO, localstack)
/// work out of the box.
#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
}

impl S3BlobStore {
    /// Create an adapter over a configured S3 client
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Create an adapter from the ambient AWS environment
    ///
    /// Honors `AWS_ENDPOINT_URL` and forces path-style addressing when an
    /// endpoint override is present.
    pub async fn from_env() -> Self {
        let aws_cfg = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&aws_cfg);
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(aws_sdk_s3::Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("put s3://{bucket}/{key}: {e}")))?;
        Ok(format!("s3://{bucket}/{key}"))
    }
}
