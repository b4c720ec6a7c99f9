//! Message-queue adapter
//!
//! Wraps SQS behind the [`MessageQueue`] trait so the worker cores can be
//! exercised against in-memory queues in tests. Delivery is at-least-once:
//! duplicates and reordering are possible, and a received message stays
//! invisible until it is either deleted or its visibility timeout elapses.
//!
//! The adapter never retries: a failed `send` is surfaced to the caller,
//! which decides between compensation (scraper fan-out) and logging
//! (best-effort side channels).

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, QueueError, Result};

/// Maximum entries per SQS delete-batch call
pub const DELETE_BATCH_LIMIT: usize = 10;

/// Maximum messages per receive call
pub const RECEIVE_BATCH_LIMIT: i32 = 10;

/// A message pulled off a queue, with the handle needed to delete it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Queue-assigned message id (used as the delete-batch entry id)
    pub message_id: String,
    /// UTF-8 JSON body
    pub body: String,
    /// Opaque handle for deletion; expires with the visibility timeout
    pub receipt_handle: String,
}

/// Queue operations the workers depend on
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Long-poll for up to `max_messages` messages, waiting up to
    /// `wait_seconds`. Returns an empty vec without error when the queue is
    /// idle.
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Send one raw JSON body
    async fn send_raw(&self, queue_url: &str, body: String) -> Result<()>;

    /// Delete one message
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<()>;

    /// Delete up to [`DELETE_BATCH_LIMIT`] messages in one call
    ///
    /// Callers chunk larger sets; passing more than the limit is a caller
    /// bug and is reported as a `Delete` error rather than silently split.
    async fn delete_batch(&self, queue_url: &str, messages: &[ReceivedMessage]) -> Result<()>;
}

/// Serialize `body` and send it to `queue_url`
///
/// Serialization failure is fatal ([`QueueError::Malformed`]); transport
/// failure is retryable by the producer's own redelivery.
pub async fn send_json<T: Serialize + Sync>(
    queue: &dyn MessageQueue,
    queue_url: &str,
    body: &T,
) -> Result<()> {
    let body = serde_json::to_string(body).map_err(|e| {
        Error::Queue(QueueError::Malformed {
            queue_url: queue_url.to_string(),
            reason: e.to_string(),
        })
    })?;
    queue.send_raw(queue_url, body).await
}

/// SQS-backed implementation of [`MessageQueue`]
#[derive(Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
}

impl SqsQueue {
    /// Create an adapter over a configured SQS client
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    /// Create an adapter from the ambient AWS environment
    ///
    /// Honors `AWS_ENDPOINT_URL` for localstack-style setups.
    pub async fn from_env() -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_cfg = loader.load().await;
        Self::new(aws_sdk_sqs::Client::new(&aws_cfg))
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>> {
        let out = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages.min(RECEIVE_BATCH_LIMIT))
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .map_err(|e| {
                Error::Queue(QueueError::Receive {
                    queue_url: queue_url.to_string(),
                    reason: e.to_string(),
                })
            })?;

        Ok(out
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                // A message without body or handle cannot be processed or
                // deleted; skip it and let the visibility timeout recycle it.
                let message_id = m.message_id?;
                let body = m.body?;
                let receipt_handle = m.receipt_handle?;
                Some(ReceivedMessage {
                    message_id,
                    body,
                    receipt_handle,
                })
            })
            .collect())
    }

    async fn send_raw(&self, queue_url: &str, body: String) -> Result<()> {
        self.client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| {
                Error::Queue(QueueError::Send {
                    queue_url: queue_url.to_string(),
                    reason: e.to_string(),
                })
            })?;
        Ok(())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                Error::Queue(QueueError::Delete {
                    queue_url: queue_url.to_string(),
                    reason: e.to_string(),
                })
            })?;
        Ok(())
    }

    async fn delete_batch(&self, queue_url: &str, messages: &[ReceivedMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        if messages.len() > DELETE_BATCH_LIMIT {
            return Err(Error::Queue(QueueError::Delete {
                queue_url: queue_url.to_string(),
                reason: format!(
                    "delete batch of {} exceeds the limit of {DELETE_BATCH_LIMIT}",
                    messages.len()
                ),
            }));
        }

        let mut entries = Vec::with_capacity(messages.len());
        for msg in messages {
            let entry = aws_sdk_sqs::types::DeleteMessageBatchRequestEntry::builder()
                .id(&msg.message_id)
                .receipt_handle(&msg.receipt_handle)
                .build()
                .map_err(|e| {
                    Error::Queue(QueueError::Delete {
                        queue_url: queue_url.to_string(),
                        reason: e.to_string(),
                    })
                })?;
            entries.push(entry);
        }

        self.client
            .delete_message_batch()
            .queue_url(queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| {
                Error::Queue(QueueError::Delete {
                    queue_url: queue_url.to_string(),
                    reason: e.to_string(),
                })
            })?;
        Ok(())
    }
}
