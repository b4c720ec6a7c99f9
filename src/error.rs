//! Error types for crawlgraph
//!
//! This module provides error handling for the pipeline, including:
//! - Domain-specific error types (Queue, Coordination, Database, etc.)
//! - Sub-enums that distinguish transient transport failures from
//!   data-shape failures
//! - Context information (queue URL, coordination key, scraping id)

use thiserror::Error;

/// Result type alias for crawlgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for crawlgraph
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which variable is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The environment variable that caused the error (e.g., "DATABASE_URL")
        key: Option<String>,
    },

    /// Message-queue operation failed
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Coordination-store operation failed
    #[error("coordination store error: {0}")]
    Coordination(#[from] redis::RedisError),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Page fetch failed (network error or non-success status)
    #[error("fetch error for {url}: {reason}")]
    Fetch {
        /// The URL that failed to fetch
        url: String,
        /// Why the fetch failed
        reason: String,
    },

    /// Blob storage upload failed
    #[error("blob storage error: {0}")]
    Storage(String),

    /// Status-table update failed
    #[error("status table error: {0}")]
    StatusTable(String),

    /// Search-index request failed
    #[error("search index error: {0}")]
    SearchIndex(String),

    /// Pending counter dropped below zero for a job
    ///
    /// Indicates duplicate processing of a task whose counter slot was
    /// already consumed. Completion must not be emitted on this path.
    #[error("pending counter underflow for scraping {scraping_id}: {value}")]
    CounterUnderflow {
        /// The job whose counter underflowed
        scraping_id: i64,
        /// The observed negative counter value
        value: i64,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message-queue errors
///
/// `Transport` failures are retryable through SQS redelivery; `Malformed`
/// bodies are not and must be handled at the call site (poison-pill
/// avoidance). The adapter itself never retries.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Receive call failed
    #[error("failed to receive from {queue_url}: {reason}")]
    Receive {
        /// The queue the receive targeted
        queue_url: String,
        /// Underlying SDK failure
        reason: String,
    },

    /// Send call failed in transport (retryable by redelivery of the producer's task)
    #[error("failed to send to {queue_url}: {reason}")]
    Send {
        /// The queue the send targeted
        queue_url: String,
        /// Underlying SDK failure
        reason: String,
    },

    /// Message body could not be serialized (fatal, not retryable)
    #[error("malformed message body for {queue_url}: {reason}")]
    Malformed {
        /// The queue the message was destined for
        queue_url: String,
        /// Serialization failure detail
        reason: String,
    },

    /// Delete or delete-batch call failed
    #[error("failed to delete from {queue_url}: {reason}")]
    Delete {
        /// The queue the delete targeted
        queue_url: String,
        /// Underlying SDK failure
        reason: String,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// No page row exists yet for a (scraping_id, url) reference
    ///
    /// Raised by the image and summary paths when the companion page row has
    /// not landed; the message stays on the queue for redelivery.
    #[error("no page found for scraping {scraping_id} url {url}")]
    PageNotFound {
        /// The job the reference belongs to
        scraping_id: i64,
        /// The page URL the record referenced
        url: String,
    },
}

impl Error {
    /// Whether redelivering the message that produced this error can succeed
    ///
    /// Transient transport and store failures are retryable; malformed bodies
    /// and serialization failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Queue(QueueError::Malformed { .. }) => false,
            Error::Serialization(_) => false,
            Error::Config { .. } => false,
            Error::CounterUnderflow { .. } => false,
            _ => true,
        }
    }
}
