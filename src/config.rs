//! Configuration types for crawlgraph
//!
//! Every worker is configured through environment variables, one config
//! struct per worker type. Required variables produce a startup error when
//! missing; optional ones fall back to documented defaults. AWS credentials,
//! region and endpoint are resolved separately by `aws-config` from the
//! standard AWS environment.

use crate::error::{Error, Result};

/// Default number of concurrent scraper workers per process
pub const DEFAULT_SCRAPER_WORKERS: usize = 20;

fn required(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config {
            message: format!("{key} is required"),
            key: Some(key.to_string()),
        }),
    }
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn flag(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| v == "true")
}

/// Scraper worker configuration
#[derive(Clone, Debug)]
pub struct ScraperConfig {
    /// Queue of `ScrapeTask`s the scraper consumes and fans out onto
    pub input_queue_url: String,
    /// Queue of `WriterRecord`s
    pub writer_queue_url: String,
    /// Queue of `ImageTask`s
    pub image_queue_url: String,
    /// Queue of `SummaryTask`s; empty disables summary emission
    pub summarizer_queue_url: String,
    /// Queue of `IndexDocument`s; empty disables index emission
    pub indexer_queue_url: String,
    /// Redis host for the coordination store
    pub redis_host: String,
    /// Redis port for the coordination store
    pub redis_port: u16,
    /// Whether image tasks are emitted at all
    pub image_explainer_enabled: bool,
    /// Whether summary tasks are emitted at all
    pub page_summarizer_enabled: bool,
    /// Number of concurrent worker tasks in this process
    pub workers: usize,
}

impl ScraperConfig {
    /// Load the scraper configuration from the environment
    pub fn from_env() -> Result<Self> {
        let redis_port = optional("REDIS_PORT", "6379");
        let redis_port: u16 = redis_port.parse().map_err(|_| Error::Config {
            message: format!("REDIS_PORT is not a valid port: {redis_port}"),
            key: Some("REDIS_PORT".to_string()),
        })?;

        Ok(Self {
            input_queue_url: required("INPUT_QUEUE_URL")?,
            writer_queue_url: required("WRITER_QUEUE_URL")?,
            image_queue_url: required("IMAGE_QUEUE_URL")?,
            summarizer_queue_url: optional("SUMMARIZER_QUEUE_URL", ""),
            indexer_queue_url: optional("INDEXER_QUEUE_URL", ""),
            redis_host: optional("REDIS_HOST", "localhost"),
            redis_port,
            image_explainer_enabled: flag("IMAGE_EXPLAINER_ENABLED"),
            page_summarizer_enabled: flag("PAGE_SUMMARIZER_ENABLED"),
            workers: DEFAULT_SCRAPER_WORKERS,
        })
    }

    /// Redis connection URL for the coordination store
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }
}

/// Writer worker configuration
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Queue of `WriterRecord`s the writer consumes
    pub input_queue_url: String,
    /// Postgres connection string
    pub database_url: String,
    /// DynamoDB status table name; empty disables the mirror (with a warning)
    pub dynamodb_table: String,
    /// Chunk size for multi-row term/link inserts
    pub db_batch_size: usize,
}

impl WriterConfig {
    /// Load the writer configuration from the environment
    pub fn from_env() -> Result<Self> {
        let batch = optional("DB_BATCH_SIZE", "25");
        let db_batch_size = batch.parse::<usize>().ok().filter(|n| *n > 0).unwrap_or(25);

        Ok(Self {
            input_queue_url: required("INPUT_QUEUE_URL")?,
            database_url: required("DATABASE_URL")?,
            dynamodb_table: optional("DYNAMODB_TABLE", ""),
            db_batch_size,
        })
    }
}

/// Image extractor worker configuration
#[derive(Clone, Debug)]
pub struct ImageExtractorConfig {
    /// Queue of `ImageTask`s the extractor consumes
    pub input_queue_url: String,
    /// Queue of `WriterRecord`s
    pub writer_queue_url: String,
    /// Queue of `ExplainerTask`s; empty disables explainer emission
    pub image_explainer_queue_url: String,
    /// Bucket uploaded image bytes land in
    pub images_bucket: String,
}

impl ImageExtractorConfig {
    /// Load the image extractor configuration from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            input_queue_url: required("INPUT_QUEUE_URL")?,
            writer_queue_url: required("WRITER_QUEUE_URL")?,
            image_explainer_queue_url: optional("IMAGE_EXPLAINER_QUEUE_URL", ""),
            images_bucket: optional("IMAGES_BUCKET", "crawl-images"),
        })
    }
}

/// Job submitter configuration
#[derive(Clone, Debug)]
pub struct SubmitterConfig {
    /// Queue the seed `ScrapeTask` is enqueued on
    pub input_queue_url: String,
    /// Postgres connection string (for the job identity row)
    pub database_url: String,
    /// DynamoDB status table name; empty disables the PENDING item
    pub dynamodb_table: String,
    /// Redis host for the coordination store
    pub redis_host: String,
    /// Redis port for the coordination store
    pub redis_port: u16,
    /// The seed URL to crawl
    pub scrape_url: String,
    /// Fan-out depth bound for the job
    pub scrape_depth: u32,
    /// Whether to poll the status table until the job completes
    pub wait_for_completion: bool,
    /// How long to wait for completion before giving up, in seconds
    pub completion_timeout_seconds: u64,
}

impl SubmitterConfig {
    /// Load the submitter configuration from the environment
    pub fn from_env() -> Result<Self> {
        let redis_port = optional("REDIS_PORT", "6379");
        let redis_port: u16 = redis_port.parse().map_err(|_| Error::Config {
            message: format!("REDIS_PORT is not a valid port: {redis_port}"),
            key: Some("REDIS_PORT".to_string()),
        })?;

        let depth = optional("SCRAPE_DEPTH", "1");
        let scrape_depth: u32 = depth.parse().map_err(|_| Error::Config {
            message: format!("SCRAPE_DEPTH is not a valid depth: {depth}"),
            key: Some("SCRAPE_DEPTH".to_string()),
        })?;

        let timeout = optional("COMPLETION_TIMEOUT_SECONDS", "300");
        let completion_timeout_seconds: u64 = timeout.parse().map_err(|_| Error::Config {
            message: format!("COMPLETION_TIMEOUT_SECONDS is not a valid duration: {timeout}"),
            key: Some("COMPLETION_TIMEOUT_SECONDS".to_string()),
        })?;

        Ok(Self {
            input_queue_url: required("INPUT_QUEUE_URL")?,
            database_url: required("DATABASE_URL")?,
            dynamodb_table: optional("DYNAMODB_TABLE", ""),
            redis_host: optional("REDIS_HOST", "localhost"),
            redis_port,
            scrape_url: required("SCRAPE_URL")?,
            scrape_depth,
            wait_for_completion: flag("WAIT_FOR_COMPLETION"),
            completion_timeout_seconds,
        })
    }

    /// Redis connection URL for the coordination store
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }
}

/// Indexer worker configuration
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Queue of `IndexDocument`s the indexer consumes
    pub input_queue_url: String,
    /// Base URL of the search index
    pub search_index_url: String,
}

impl IndexerConfig {
    /// Load the indexer configuration from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            input_queue_url: required("INPUT_QUEUE_URL")?,
            search_index_url: optional("SEARCH_INDEX_URL", "http://localhost:9200"),
        })
    }
}
