//! Indexer worker
//!
//! Thin and independent: it pulls [`IndexDocument`]s off its queue and pushes
//! them into the search index. An index failure leaves the message on the
//! queue for redelivery; a success deletes it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use crate::queue::{MessageQueue, RECEIVE_BATCH_LIMIT};
use crate::types::IndexDocument;

/// Long-poll wait for the indexer queue
const RECEIVE_WAIT_SECONDS: i32 = 20;

/// Backoff after a failed receive
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Index the documents land in
const INDEX_NAME: &str = "scraped_pages";

/// Pushes one document into the search index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index `doc`; errors leave the source message for redelivery
    async fn index_document(&self, doc: &IndexDocument) -> Result<()>;
}

/// HTTP implementation of [`SearchIndex`] against an OpenSearch-compatible
/// endpoint
#[derive(Clone)]
pub struct HttpSearchIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchIndex {
    /// Create a client for the index at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn index_document(&self, doc: &IndexDocument) -> Result<()> {
        let body = serde_json::json!({
            "url": doc.url,
            "content": doc.content,
            "scraping_id": doc.scraping_id,
            "created_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });

        let url = format!(
            "{}/{INDEX_NAME}/_doc?refresh=true",
            self.base_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::SearchIndex(format!("index request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::SearchIndex(format!(
                "index request for {} returned {}",
                doc.url,
                resp.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Indexer worker instance
#[derive(Clone)]
pub struct Indexer {
    queue: Arc<dyn MessageQueue>,
    index: Arc<dyn SearchIndex>,
    config: IndexerConfig,
}

impl Indexer {
    /// Create an indexer over its external collaborators
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        index: Arc<dyn SearchIndex>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            queue,
            index,
            config,
        }
    }

    /// Run the receive loop until cancellation
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(input_queue = %self.config.input_queue_url, "indexer started");

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
                            tracing::error!(error = %e, "failed to receive index documents");
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                            }
                            continue;
                        }
                    };

                    for msg in messages {
                        let doc = match serde_json::from_str::<IndexDocument>(&msg.body) {
                            Ok(doc) => doc,
                            Err(e) => {
                                // Deleted to avoid a poison-pill loop.
                                tracing::error!(error = %e, "failed to deserialize index document, deleting");
                                if let Err(e) = self
                                    .queue
                                    .delete(&self.config.input_queue_url, &msg.receipt_handle)
                                    .await
                                {
                                    tracing::error!(error = %e, "failed to delete poison message");
                                }
                                continue;
                            }
                        };

                        tracing::info!(url = %doc.url, "indexing document");
                        match self.index.index_document(&doc).await {
                            Ok(()) => {
                                if let Err(e) = self
                                    .queue
                                    .delete(&self.config.input_queue_url, &msg.receipt_handle)
                                    .await
                                {
                                    tracing::error!(url = %doc.url, error = %e, "failed to delete indexed message");
                                }
                            }
                            Err(e) => {
                                // Left undeleted for redelivery.
                                tracing::error!(url = %doc.url, error = %e, "failed to index document");
                            }
                        }
                    }
                }
            }
        }

        tracing::info!("indexer shut down");
        Ok(())
    }
}
