//! External job-status table adapter
//!
//! The DynamoDB status table is the authoritative record of job completion
//! seen by the outside world. The writer performs monotone updates only
//! (PENDING → COMPLETED); repeating a completed update is safe, which makes
//! the `ScrapingComplete` path idempotent under redelivery.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{JobStatus, ScrapingId};

/// Monotone status updates for crawl jobs
#[async_trait]
pub trait StatusTable: Send + Sync {
    /// Create the job's PENDING item when it is submitted
    async fn create_pending(
        &self,
        id: ScrapingId,
        url: &str,
        depth: u32,
        created_at: &str,
    ) -> Result<()>;

    /// Record the job as COMPLETED with the given RFC3339 timestamp
    async fn mark_completed(&self, id: ScrapingId, completed_at: &str) -> Result<()>;

    /// Additively bump the job's `links_count` attribute
    ///
    /// Fire-and-forget telemetry; plays no part in completion accounting.
    async fn increment_link_count(&self, id: ScrapingId, count: i64) -> Result<()>;

    /// Read the job's current status string, if the item exists
    async fn get_status(&self, id: ScrapingId) -> Result<Option<String>>;
}

/// DynamoDB-backed implementation of [`StatusTable`]
///
/// An empty table name disables the mirror: updates become warning-logged
/// no-ops so the writer keeps working in environments without the table.
#[derive(Clone)]
pub struct DynamoStatusTable {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoStatusTable {
    /// Create an adapter over a configured DynamoDB client
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Create an adapter from the ambient AWS environment
    pub async fn from_env(table_name: impl Into<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_cfg = loader.load().await;
        Self::new(aws_sdk_dynamodb::Client::new(&aws_cfg), table_name)
    }
}

#[async_trait]
impl StatusTable for DynamoStatusTable {
    async fn create_pending(
        &self,
        id: ScrapingId,
        url: &str,
        depth: u32,
        created_at: &str,
    ) -> Result<()> {
        if self.table_name.is_empty() {
            tracing::warn!(
                scraping_id = id.get(),
                "status table not configured, skipping PENDING item"
            );
            return Ok(());
        }

        use aws_sdk_dynamodb::types::AttributeValue;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("scraping_id", AttributeValue::S(id.to_string()))
            .item("url", AttributeValue::S(url.to_string()))
            .item("depth", AttributeValue::N(depth.to_string()))
            .item("status", AttributeValue::S(JobStatus::Pending.as_str().to_string()))
            .item("links_count", AttributeValue::N("0".to_string()))
            .item("created_at", AttributeValue::S(created_at.to_string()))
            .send()
            .await
            .map_err(|e| Error::StatusTable(format!("create_pending for scraping {id}: {e}")))?;
        Ok(())
    }

    async fn mark_completed(&self, id: ScrapingId, completed_at: &str) -> Result<()> {
        if self.table_name.is_empty() {
            tracing::warn!(
                scraping_id = id.get(),
                "status table not configured, skipping completion mirror"
            );
            return Ok(());
        }

        use aws_sdk_dynamodb::types::AttributeValue;
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("scraping_id", AttributeValue::S(id.to_string()))
            .update_expression("SET #s = :status, completed_at = :cat")
            .expression_attribute_names("#s", "status")
            .expression_attribute_values(
                ":status",
                AttributeValue::S(JobStatus::Completed.as_str().to_string()),
            )
            .expression_attribute_values(":cat", AttributeValue::S(completed_at.to_string()))
            .send()
            .await
            .map_err(|e| {
                Error::StatusTable(format!("mark_completed for scraping {id}: {e}"))
            })?;

        tracing::info!(
            scraping_id = id.get(),
            completed_at,
            table = %self.table_name,
            "mirrored COMPLETED status"
        );
        Ok(())
    }

    async fn increment_link_count(&self, id: ScrapingId, count: i64) -> Result<()> {
        if self.table_name.is_empty() {
            return Ok(());
        }

        use aws_sdk_dynamodb::types::AttributeValue;
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("scraping_id", AttributeValue::S(id.to_string()))
            .update_expression("ADD links_count :inc")
            .expression_attribute_values(":inc", AttributeValue::N(count.to_string()))
            .send()
            .await
            .map_err(|e| {
                Error::StatusTable(format!("increment_link_count for scraping {id}: {e}"))
            })?;
        Ok(())
    }

    async fn get_status(&self, id: ScrapingId) -> Result<Option<String>> {
        if self.table_name.is_empty() {
            return Ok(None);
        }

        use aws_sdk_dynamodb::types::AttributeValue;
        let out = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("scraping_id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| Error::StatusTable(format!("get_status for scraping {id}: {e}")))?;

        Ok(out.item.and_then(|item| {
            item.get("status")
                .and_then(|v| v.as_s().ok())
                .map(|s| s.to_string())
        }))
    }
}
