//! Scraper worker
//!
//! The scraper is organized into focused submodules:
//! - [`parse`] — streaming HTML extraction (terms, links, images, text)
//! - [`process`] — the per-task coordination protocol
//! - this module — the worker pool: one producer long-polling SQS, N
//!   processing workers sharing an in-process job channel, and a batch
//!   deleter flushing delete-batches on size or interval
//!
//! Backpressure is structural: the job channel holds at most `2 * workers`
//! messages, so a slow pipeline stops the producer from pulling more work and
//! the visibility timeout becomes the flow-control signal.

pub mod parse;
mod process;


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ScraperConfig;
use crate::coordination::CoordinationStore;
use crate::error::Result;
use crate::fetch::PageFetcher;
use crate::queue::{MessageQueue, ReceivedMessage, DELETE_BATCH_LIMIT, RECEIVE_BATCH_LIMIT};
use crate::types::ScrapeTask;

/// Long-poll wait for the input queue
const RECEIVE_WAIT_SECONDS: i32 = 20;

/// Backoff after a failed receive
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Interval between delete-batch flushes
const DELETE_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Scraper worker instance (cloneable - all dependencies are Arc-wrapped)
#[derive(Clone)]
pub struct Scraper {
    pub(crate) queue: Arc<dyn MessageQueue>,
    pub(crate) store: Arc<dyn CoordinationStore>,
    pub(crate) fetcher: Arc<dyn PageFetcher>,
    pub(crate) config: ScraperConfig,
}

impl Scraper {
    /// Create a scraper over its external collaborators
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn CoordinationStore>,
        fetcher: Arc<dyn PageFetcher>,
        config: ScraperConfig,
    ) -> Self {
        Self {
            queue,
            store,
            fetcher,
            config,
        }
    }

    /// Run the worker pool until cancellation
    ///
    /// On cancellation the producer stops feeding the job channel, in-flight
    /// workers finish their current task (including the terminal decrement)
    /// and exit, and the deleter flushes one last batch. A task is never
    /// abandoned mid-way: either it runs to the decrement or it was never
    /// started and redelivers after the visibility timeout.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let workers = self.config.workers.max(1);
        tracing::info!(
            workers,
            input_queue = %self.config.input_queue_url,
            "scraper started"
        );

        let (job_tx, job_rx) = mpsc::channel::<ReceivedMessage>(workers * 2);
        let (delete_tx, delete_rx) = mpsc::channel::<ReceivedMessage>(workers * 2);
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

        let deleter = tokio::spawn(batch_deleter(
            Arc::clone(&self.queue),
            self.config.input_queue_url.clone(),
            delete_rx,
        ));

        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let scraper = self.clone();
            let job_rx = Arc::clone(&job_rx);
            let delete_tx = delete_tx.clone();
            worker_handles.push(tokio::spawn(async move {
                scraper.worker_loop(worker_id, job_rx, delete_tx).await;
            }));
        }

        // Producer: long-poll and feed the job channel until cancelled.
        'producer: loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'producer,
                received = self.queue.receive(
                    &self.config.input_queue_url,
                    RECEIVE_BATCH_LIMIT,
                    RECEIVE_WAIT_SECONDS,
                ) => match received {
                    Ok(messages) => {
                        for msg in messages {
                            tokio::select! {
                                _ = cancel.cancelled() => break 'producer,
                                sent = job_tx.send(msg) => {
                                    if sent.is_err() {
                                        break 'producer;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to receive scrape tasks");
                        tokio::select! {
                            _ = cancel.cancelled() => break 'producer,
                            _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                        }
                    }
                },
            }
        }

        tracing::info!("producer stopped, draining workers");
        drop(job_tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        // All worker-held delete senders are gone once the workers join; drop
        // ours so the deleter sees the channel close and flushes.
        drop(delete_tx);
        let _ = deleter.await;
        tracing::info!("scraper shut down");
        Ok(())
    }

    async fn worker_loop(
        &self,
        worker_id: usize,
        job_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ReceivedMessage>>>,
        delete_tx: mpsc::Sender<ReceivedMessage>,
    ) {
        loop {
            let msg = {
                let mut rx = job_rx.lock().await;
                rx.recv().await
            };
            let Some(msg) = msg else {
                return;
            };

            match serde_json::from_str::<ScrapeTask>(&msg.body) {
                Ok(task) => self.process(&task).await,
                Err(e) => {
                    // Deleted without decrementing: a body we cannot parse
                    // was never a counted task from this pipeline.
                    tracing::error!(
                        worker_id,
                        error = %e,
                        "failed to deserialize scrape task, deleting poison message"
                    );
                }
            }

            if delete_tx.send(msg).await.is_err() {
                return;
            }
        }
    }
}

/// Consume the delete channel, flushing batches of up to
/// [`DELETE_BATCH_LIMIT`] every [`DELETE_FLUSH_INTERVAL`] or when full, with
/// a final flush when the channel closes.
async fn batch_deleter(
    queue: Arc<dyn MessageQueue>,
    queue_url: String,
    mut delete_rx: mpsc::Receiver<ReceivedMessage>,
) {
    let mut batch: Vec<ReceivedMessage> = Vec::with_capacity(DELETE_BATCH_LIMIT);
    let mut interval = tokio::time::interval(DELETE_FLUSH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = delete_rx.recv() => {
                let Some(msg) = msg else {
                    flush_deletes(queue.as_ref(), &queue_url, &mut batch).await;
                    return;
                };
                batch.push(msg);
                if batch.len() >= DELETE_BATCH_LIMIT {
                    flush_deletes(queue.as_ref(), &queue_url, &mut batch).await;
                }
            }
            _ = interval.tick() => {
                flush_deletes(queue.as_ref(), &queue_url, &mut batch).await;
            }
        }
    }
}

async fn flush_deletes(queue: &dyn MessageQueue, queue_url: &str, batch: &mut Vec<ReceivedMessage>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = queue.delete_batch(queue_url, batch).await {
        // Undeleted messages redeliver after the visibility timeout; the
        // visited set keeps the re-run from fanning out again.
        tracing::error!(batch_size = batch.len(), error = %e, "failed to delete message batch");
    }
    batch.clear();
}
