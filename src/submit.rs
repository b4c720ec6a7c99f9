//! Job submission
//!
//! The submitter is the other half of the coordination protocol: a scrape
//! task may only enter the input queue after its slot is counted, and for the
//! seed that is the submitter's job. Submission order matters:
//!
//! 1. create the job's identity row (assigns the scraping id),
//! 2. initialize `pending(job)` to 1 — the seed's slot,
//! 3. write the PENDING item to the status table (best-effort),
//! 4. enqueue the seed [`ScrapeTask`].
//!
//! The counter is initialized before the seed is enqueued for the same
//! reason the scraper pre-increments before fanning out: the counter must
//! never under-count outstanding work.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};

use crate::coordination::{pending_key, CoordinationStore};
use crate::error::{Error, Result};
use crate::queue::{send_json, MessageQueue};
use crate::status::StatusTable;
use crate::types::{JobStatus, ScrapeTask, ScrapingId};
use crate::writer::PageRepository;

/// Interval between status polls while waiting for completion
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Submits crawl jobs and optionally waits for their completion
pub struct Submitter {
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn CoordinationStore>,
    repo: Arc<dyn PageRepository>,
    status: Arc<dyn StatusTable>,
    input_queue_url: String,
}

impl Submitter {
    /// Create a submitter over its external collaborators
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn CoordinationStore>,
        repo: Arc<dyn PageRepository>,
        status: Arc<dyn StatusTable>,
        input_queue_url: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            store,
            repo,
            status,
            input_queue_url: input_queue_url.into(),
        }
    }

    /// Submit one crawl job, returning its scraping id
    ///
    /// A failed counter initialization or seed send is fatal: without both,
    /// the job can never complete, so nothing is enqueued and the error is
    /// surfaced. The status-table write is best-effort.
    pub async fn submit(&self, url: &str, depth: u32) -> Result<ScrapingId> {
        let scraping_id = self.repo.create_scraping(url).await?;

        // The seed's slot. INCRBY on the fresh key both creates it and sets
        // it to one.
        let pending = self.store.incr_by(&pending_key(scraping_id), 1).await?;
        if pending != 1 {
            tracing::warn!(
                scraping_id = scraping_id.get(),
                pending,
                "pending counter was not fresh at submission"
            );
        }

        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Err(e) = self
            .status
            .create_pending(scraping_id, url, depth, &created_at)
            .await
        {
            tracing::error!(
                scraping_id = scraping_id.get(),
                error = %e,
                "failed to create PENDING status item"
            );
        }

        let seed = ScrapeTask {
            url: url.to_string(),
            depth,
            scraping_id,
        };
        send_json(self.queue.as_ref(), &self.input_queue_url, &seed).await?;

        tracing::info!(
            scraping_id = scraping_id.get(),
            url,
            depth,
            "submitted crawl job"
        );
        Ok(scraping_id)
    }

    /// Poll the status table until the job completes or `timeout` elapses
    pub async fn wait_for_completion(&self, id: ScrapingId, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.status.get_status(id).await {
                Ok(Some(status)) if status == JobStatus::Completed.as_str() => {
                    tracing::info!(scraping_id = id.get(), "job completed");
                    return Ok(());
                }
                Ok(status) => {
                    tracing::info!(
                        scraping_id = id.get(),
                        status = status.as_deref().unwrap_or("UNKNOWN"),
                        "job still running"
                    );
                }
                Err(e) => {
                    tracing::error!(scraping_id = id.get(), error = %e, "status poll failed");
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::StatusTable(format!(
                    "timed out waiting for scraping {id} to complete"
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
