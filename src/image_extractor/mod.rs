//! Image extractor worker
//!
//! Downloads each discovered image, uploads the bytes to blob storage under
//! `{scraping_id}/{uuid}.{ext}` and emits one [`WriterRecord::ImageMetadata`]
//! for the writer plus, when the upload succeeded, one [`ExplainerTask`] for
//! the external explainer.
//!
//! Download and upload failures are deliberately soft: the metadata record is
//! emitted either way (with an empty blob path) so the relational graph still
//! records that the image existed on the page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ImageExtractorConfig;
use crate::error::{Error, Result};
use crate::queue::{send_json, MessageQueue, RECEIVE_BATCH_LIMIT};
use crate::storage::BlobStore;
use crate::types::{ExplainerTask, ImageTask, WriterRecord};

/// Timeout for a single image download
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Long-poll wait for the image queue
const RECEIVE_WAIT_SECONDS: i32 = 20;

/// Backoff after a failed receive
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Downloads one image, returning its bytes and content type
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// Download `url`; non-success statuses are errors
    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)>;
}

/// reqwest-backed implementation of [`ImageDownloader`]
#[derive(Clone)]
pub struct HttpImageDownloader {
    client: reqwest::Client,
}

impl HttpImageDownloader {
    /// Build a downloader with the image-fetch timeout
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let resp = self.client.get(url).send().await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: format!("status {}", resp.status().as_u16()),
            });
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let data = resp.bytes().await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            reason: format!("reading body: {e}"),
        })?;
        Ok((data.to_vec(), content_type))
    }
}

/// Derive the blob extension for an image
///
/// Content type first, then the URL path's trailing extension when it is
/// shorter than six characters (query string stripped), then `bin`.
fn derive_extension(url: &str, content_type: &str) -> String {
    let mut ext = String::from("bin");

    if !content_type.is_empty() {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        if let Some(extensions) = mime_guess::get_mime_extensions_str(essence) {
            if let Some(first) = extensions.first() {
                ext = (*first).to_string();
            }
        }
    }

    if ext == "bin" || content_type.is_empty() {
        let path = url.split('?').next().unwrap_or("");
        if let Some((_, url_ext)) = path.rsplit_once('.') {
            if !url_ext.is_empty() && url_ext.len() < 5 && !url_ext.contains('/') {
                ext = url_ext.to_string();
            }
        }
    }

    ext
}

/// Image extractor worker instance
#[derive(Clone)]
pub struct ImageExtractor {
    queue: Arc<dyn MessageQueue>,
    blobs: Arc<dyn BlobStore>,
    downloader: Arc<dyn ImageDownloader>,
    config: ImageExtractorConfig,
}

impl ImageExtractor {
    /// Create an extractor over its external collaborators
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        blobs: Arc<dyn BlobStore>,
        downloader: Arc<dyn ImageDownloader>,
        config: ImageExtractorConfig,
    ) -> Self {
        Self {
            queue,
            blobs,
            downloader,
            config,
        }
    }

    /// Process one image task
    ///
    /// The only fatal outcome is failing to deliver the metadata record to
    /// the writer queue; everything upstream degrades to an empty blob path.
    pub async fn process(&self, task: &ImageTask) -> Result<()> {
        tracing::info!(
            image_url = %task.url,
            scraping_id = task.scraping_id.get(),
            "processing image"
        );

        let mut s3_path: Option<String> = None;
        match self.downloader.download(&task.url).await {
            Ok((data, content_type)) => {
                let ext = derive_extension(&task.url, &content_type);
                let key = format!("{}/{}.{ext}", task.scraping_id, Uuid::new_v4());
                match self
                    .blobs
                    .put(&self.config.images_bucket, &key, data, &content_type)
                    .await
                {
                    Ok(path) => {
                        tracing::info!(path = %path, "uploaded image");
                        s3_path = Some(path);
                    }
                    Err(e) => {
                        tracing::error!(image_url = %task.url, error = %e, "image upload failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(image_url = %task.url, error = %e, "image download failed");
            }
        }

        let record = WriterRecord::ImageMetadata {
            scraping_id: task.scraping_id,
            page_url: task.page_url.clone(),
            image_url: task.url.clone(),
            s3_path: s3_path.clone(),
        };
        send_json(
            self.queue.as_ref(),
            &self.config.writer_queue_url,
            &record,
        )
        .await?;

        if let Some(s3_path) = s3_path {
            if !self.config.image_explainer_queue_url.is_empty() {
                let explainer = ExplainerTask {
                    image_url: task.url.clone(),
                    page_url: task.page_url.clone(),
                    scraping_id: task.scraping_id,
                    s3_path,
                };
                if let Err(e) = send_json(
                    self.queue.as_ref(),
                    &self.config.image_explainer_queue_url,
                    &explainer,
                )
                .await
                {
                    tracing::error!(image_url = %task.url, error = %e, "failed to send explainer task");
                }
            }
        }

        Ok(())
    }

    /// Run the receive loop until cancellation
    ///
    /// Every received message is deleted after processing, valid or not:
    /// image work is best-effort and a retry adds nothing an empty blob path
    /// doesn't already record.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(input_queue = %self.config.input_queue_url, "image extractor started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.queue.receive(
                    &self.config.input_queue_url,
                    RECEIVE_BATCH_LIMIT,
                    RECEIVE_WAIT_SECONDS,
                ) => {
                    let messages = match received {
                        Ok(messages) => messages,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to receive image tasks");
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                            }
                            continue;
                        }
                    };

                    for msg in messages {
                        match serde_json::from_str::<ImageTask>(&msg.body) {
                            Ok(task) => {
                                if let Err(e) = self.process(&task).await {
                                    tracing::error!(image_url = %task.url, error = %e, "failed to process image");
                                }
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "failed to deserialize image task");
                            }
                        }
                        if let Err(e) = self
                            .queue
                            .delete(&self.config.input_queue_url, &msg.receipt_handle)
                            .await
                        {
                            tracing::error!(error = %e, "failed to delete image message");
                        }
                    }
                }
            }
        }

        tracing::info!("image extractor shut down");
        Ok(())
    }
}
