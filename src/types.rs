//! Core types for crawlgraph
//!
//! Message bodies are compact JSON with lowercase snake_case field names; the
//! writer stream is a tagged union discriminated by a `type` field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a crawl job
///
/// A job owns all its relational rows and its two coordination objects (the
/// visited set and the pending counter).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ScrapingId(pub i64);

impl ScrapingId {
    /// Create a new ScrapingId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ScrapingId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ScrapingId> for i64 {
    fn from(id: ScrapingId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ScrapingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Postgres> for ScrapingId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ScrapingId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        sqlx::Encode::<sqlx::Postgres>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ScrapingId {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Job lifecycle status, mirrored to the external status table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Created, pending counter above zero
    Pending,
    /// Pending counter reached zero, completion recorded
    Completed,
}

impl JobStatus {
    /// The status string stored in the relational and status tables
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Completed => "COMPLETED",
        }
    }
}

/// A single unit of scraper work: one URL at one depth for one job
///
/// Created by the external submitter (seed, `depth = D`) and by the scraper
/// itself (children, `depth = parent.depth - 1`). The producer of a task has
/// always incremented the job's pending counter before enqueueing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeTask {
    /// The page to fetch
    pub url: String,
    /// Remaining fan-out depth; 0 means process but enqueue no children
    pub depth: u32,
    /// The owning job
    pub scraping_id: ScrapingId,
}

/// Tagged union of downstream facts the Writer persists
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriterRecord {
    /// Terms and outgoing links of one fetched page
    PageData {
        /// The owning job
        scraping_id: ScrapingId,
        /// The page URL
        url: String,
        /// Term frequencies extracted from visible text
        terms: HashMap<String, u64>,
        /// Outgoing link URLs in document order
        links: Vec<String>,
    },

    /// Image discovered on a page, possibly uploaded to blob storage
    ImageMetadata {
        /// The owning job
        scraping_id: ScrapingId,
        /// URL of the page the image was found on
        page_url: String,
        /// URL of the image itself
        image_url: String,
        /// Blob path when the upload succeeded
        #[serde(skip_serializing_if = "Option::is_none")]
        s3_path: Option<String>,
    },

    /// Explanation produced by the external image explainer
    ImageExplanation {
        /// The owning job
        scraping_id: ScrapingId,
        /// URL of the page the image was found on
        page_url: String,
        /// URL of the image itself
        image_url: String,
        /// Model-generated explanation text
        explanation: String,
        /// Blob path of the uploaded image
        s3_path: String,
    },

    /// Summary produced by the external page summarizer
    PageSummary {
        /// The owning job
        scraping_id: ScrapingId,
        /// The page URL the summary belongs to
        url: String,
        /// Summary text
        summary: String,
    },

    /// The job's one-and-only completion signal
    ScrapingComplete {
        /// The completed job
        scraping_id: ScrapingId,
    },
}

impl WriterRecord {
    /// The job this record belongs to
    pub fn scraping_id(&self) -> ScrapingId {
        match self {
            WriterRecord::PageData { scraping_id, .. }
            | WriterRecord::ImageMetadata { scraping_id, .. }
            | WriterRecord::ImageExplanation { scraping_id, .. }
            | WriterRecord::PageSummary { scraping_id, .. }
            | WriterRecord::ScrapingComplete { scraping_id } => *scraping_id,
        }
    }
}

/// Task for the image extractor: download one image URL
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTask {
    /// The image URL to download
    pub url: String,
    /// URL of the page the image was found on
    pub page_url: String,
    /// The owning job
    pub scraping_id: ScrapingId,
}

/// Task for the external page summarizer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTask {
    /// The page URL
    pub url: String,
    /// Visible page text, capped upstream
    pub content: String,
    /// The owning job
    pub scraping_id: ScrapingId,
}

/// Task for the external image explainer, emitted after a successful upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainerTask {
    /// URL of the uploaded image
    pub image_url: String,
    /// URL of the page the image was found on
    pub page_url: String,
    /// The owning job
    pub scraping_id: ScrapingId,
    /// Blob path of the uploaded bytes
    pub s3_path: String,
}

/// Document pushed to the search index
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// The page URL
    pub url: String,
    /// Visible page text, capped upstream
    pub content: String,
    /// The owning job
    pub scraping_id: ScrapingId,
}
