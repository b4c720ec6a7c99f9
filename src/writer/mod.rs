//! Writer worker
//!
//! The writer consumes the heterogeneous [`WriterRecord`] stream and
//! materializes it into the relational store. Delivery is at-least-once and
//! arrival order is meaningless, so correctness comes from two mechanisms:
//!
//! - records are buffered and each flush is processed **variant-ordered**
//!   (`PageData` → images → summaries → `ScrapingComplete`), because image
//!   and summary records reference their page row by `(scraping_id, url)`;
//! - a record whose page has not landed yet is simply left undeleted and
//!   redelivers after the visibility timeout, by which time the page usually
//!   has.
//!
//! A `ScrapingComplete` forces an immediate flush so completion is ordered
//! after every `PageData` already buffered.

mod batch;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WriterConfig;
use crate::error::Result;
use crate::queue::{MessageQueue, ReceivedMessage, DELETE_BATCH_LIMIT, RECEIVE_BATCH_LIMIT};
use crate::status::StatusTable;
use crate::types::{ScrapingId, WriterRecord};

/// Records buffered before a flush is forced
pub const MAX_BUFFER_SIZE: usize = 50;

/// Longest a buffered record waits before a flush
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Long-poll wait for the writer queue
const RECEIVE_WAIT_SECONDS: i32 = 5;

/// Backoff after a failed receive
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Persistence operations the writer depends on
///
/// Implemented by [`crate::db::Database`]; the seam keeps batch processing
/// testable without Postgres.
#[async_trait]
pub trait PageRepository: Send + Sync {
    /// Create the job's identity row, returning the assigned scraping id
    ///
    /// Used by the submitter, not the writer; it lives here because the
    /// trait is the single seam over the relational store.
    async fn create_scraping(&self, url: &str) -> Result<ScrapingId>;

    /// Insert a page row, returning its assigned id
    async fn insert_page(&self, scraping_id: ScrapingId, url: &str) -> Result<i64>;

    /// Batch-insert term rows for a page
    async fn insert_terms(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        terms: &HashMap<String, u64>,
    ) -> Result<()>;

    /// Batch-insert link rows for a page
    async fn insert_links(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        links: &[String],
    ) -> Result<()>;

    /// Find the most recent page row for `(scraping_id, url)`
    async fn find_page(&self, scraping_id: ScrapingId, url: &str) -> Result<Option<i64>>;

    /// Insert an image row referencing a page
    async fn insert_image(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        image_url: &str,
        explanation: Option<&str>,
        s3_path: Option<&str>,
    ) -> Result<()>;

    /// Set the summary on all rows matching `(scraping_id, url)`; returns
    /// the number of rows updated
    async fn update_summary(&self, scraping_id: ScrapingId, url: &str, summary: &str)
        -> Result<u64>;

    /// Monotone PENDING → COMPLETED on the relational job row
    async fn complete_scraping(&self, scraping_id: ScrapingId) -> Result<()>;
}

/// Writer worker instance (cloneable - all dependencies are Arc-wrapped)
#[derive(Clone)]
pub struct Writer {
    pub(crate) queue: Arc<dyn MessageQueue>,
    pub(crate) repo: Arc<dyn PageRepository>,
    pub(crate) status: Arc<dyn StatusTable>,
    pub(crate) config: WriterConfig,
}

impl Writer {
    /// Create a writer over its external collaborators
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        repo: Arc<dyn PageRepository>,
        status: Arc<dyn StatusTable>,
        config: WriterConfig,
    ) -> Self {
        Self {
            queue,
            repo,
            status,
            config,
        }
    }

    /// Run the buffer/flush loop until cancellation
    ///
    /// A producer task long-polls the writer queue into an in-process
    /// channel; this loop buffers records and flushes on size, interval,
    /// completion arrival, and once more on shutdown.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(input_queue = %self.config.input_queue_url, "writer started");

        let (msg_tx, mut msg_rx) = mpsc::channel::<ReceivedMessage>(MAX_BUFFER_SIZE);
        let producer = tokio::spawn(receive_loop(
            Arc::clone(&self.queue),
            self.config.input_queue_url.clone(),
            msg_tx,
            cancel.clone(),
        ));

        let mut buffer: Vec<(WriterRecord, ReceivedMessage)> = Vec::new();
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = msg_rx.recv() => {
                    let Some(msg) = msg else {
                        // Producer gone (cancelled): flush what's left.
                        self.flush(&mut buffer).await;
                        break;
                    };
                    let record = match serde_json::from_str::<WriterRecord>(&msg.body) {
                        Ok(record) => record,
                        Err(e) => {
                            // Deleted immediately to avoid a poison-pill loop.
                            tracing::error!(error = %e, "failed to deserialize writer record, deleting");
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

                    let force_flush = matches!(record, WriterRecord::ScrapingComplete { .. });
                    buffer.push((record, msg));
                    if force_flush || buffer.len() >= MAX_BUFFER_SIZE {
                        self.flush(&mut buffer).await;
                        interval.reset();
                    }
                }
                _ = interval.tick() => {
                    self.flush(&mut buffer).await;
                }
            }
        }

        let _ = producer.await;
        tracing::info!("writer shut down");
        Ok(())
    }

    /// Process the buffered batch and delete the messages that are done
    ///
    /// A batch abort (page insert failure) deletes nothing: every message
    /// redelivers and the duplicate page rows that may result are accepted.
    pub(crate) async fn flush(&self, buffer: &mut Vec<(WriterRecord, ReceivedMessage)>) {
        if buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(buffer);
        let batch_size = batch.len();

        match self.process_batch(batch).await {
            Ok(deletable) => {
                tracing::debug!(
                    batch_size,
                    deletable = deletable.len(),
                    "flushed writer batch"
                );
                for chunk in deletable.chunks(DELETE_BATCH_LIMIT) {
                    if let Err(e) = self
                        .queue
                        .delete_batch(&self.config.input_queue_url, chunk)
                        .await
                    {
                        tracing::error!(chunk = chunk.len(), error = %e, "failed to delete processed messages");
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    batch_size,
                    error = %e,
                    "batch aborted, leaving messages for redelivery"
                );
            }
        }
    }
}

/// Long-poll the writer queue into the in-process channel until cancellation
async fn receive_loop(
    queue: Arc<dyn MessageQueue>,
    queue_url: String,
    msg_tx: mpsc::Sender<ReceivedMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            received = queue.receive(&queue_url, RECEIVE_BATCH_LIMIT, RECEIVE_WAIT_SECONDS) => {
                match received {
                    Ok(messages) => {
                        for msg in messages {
                            tokio::select! {
                                _ = cancel.cancelled() => return,
                                sent = msg_tx.send(msg) => {
                                    if sent.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to receive writer records");
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                        }
                    }
                }
            }
        }
    }
}
