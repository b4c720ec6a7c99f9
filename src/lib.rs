//! # crawlgraph
//!
//! Distributed web-crawling pipeline. Given a seed URL and a depth bound, the
//! pipeline recursively fetches pages, extracts terms, links and images,
//! persists the result graph to Postgres and reports authoritative job
//! completion to an external status table.
//!
//! ## Architecture
//!
//! Four cooperating worker types communicate exclusively through SQS queues
//! and a shared Redis coordination store:
//!
//! - **Scraper** — consumes [`types::ScrapeTask`]s, fetches and parses pages,
//!   fans child tasks back onto its own queue and emits page data, image
//!   tasks, summary tasks and index documents downstream. It owns the
//!   crawl-coordination protocol: a per-job visited set breaks cycles and a
//!   per-job pending counter (pre-increment before enqueue, compensate for
//!   failed sends, decrement exactly once per task) yields exactly one
//!   completion signal per job.
//! - **Writer** — consumes the heterogeneous [`types::WriterRecord`] stream
//!   in buffered batches, materializes it into the relational store in
//!   variant order, and mirrors terminal status to DynamoDB.
//! - **Image Extractor** — downloads images, uploads them to S3 and emits
//!   image metadata plus explainer tasks.
//! - **Indexer** — pushes extracted page text into the search index.
//!
//! Each worker is a thin binary over the corresponding library module; all
//! external collaborators sit behind traits so the pipeline logic is testable
//! without AWS, Redis or Postgres.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Per-worker environment configuration
pub mod config;
/// Coordination-store adapter (visited set, pending counter)
pub mod coordination;
/// Relational persistence layer
pub mod db;
/// Error types
pub mod error;
/// Page fetching
pub mod fetch;
/// Image extractor worker
pub mod image_extractor;
/// Indexer worker
pub mod indexer;
/// Message-queue adapter
pub mod queue;
/// Scraper worker (parse, process, worker pool)
pub mod scraper;
/// Process shutdown signaling
pub mod shutdown;
/// External job-status table adapter
pub mod status;
/// Blob storage adapter
pub mod storage;
/// Job submission (seed counting and enqueueing)
pub mod submit;
/// Core message and identifier types
pub mod types;
/// Writer worker (buffering, batch materialization)
pub mod writer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support;

pub use config::{
    ImageExtractorConfig, IndexerConfig, ScraperConfig, SubmitterConfig, WriterConfig,
};
pub use coordination::{CoordinationStore, RedisStore};
pub use db::Database;
pub use error::{DatabaseError, Error, QueueError, Result};
pub use fetch::{HttpPageFetcher, PageFetcher};
pub use image_extractor::{HttpImageDownloader, ImageExtractor};
pub use indexer::{HttpSearchIndex, Indexer};
pub use queue::{MessageQueue, ReceivedMessage, SqsQueue};
pub use scraper::Scraper;
pub use status::{DynamoStatusTable, StatusTable};
pub use storage::{BlobStore, S3BlobStore};
pub use submit::Submitter;
pub use types::{ScrapeTask, ScrapingId, WriterRecord};
pub use writer::{PageRepository, Writer};
