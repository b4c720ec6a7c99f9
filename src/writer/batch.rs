//! Variant-ordered batch processing.

use chrono::{SecondsFormat, Utc};

use crate::error::Result;
use crate::queue::ReceivedMessage;
use crate::types::{ScrapingId, WriterRecord};
use crate::writer::Writer;

impl Writer {
    /// Materialize one batch into the relational store
    ///
    /// Records are grouped by variant and processed in dependency order:
    /// `PageData` first (it creates the rows everything else references),
    /// then images, then summaries, then `ScrapingComplete`.
    ///
    /// Returns the messages that finished and may be deleted. A record whose
    /// page reference is missing is skipped (its message redelivers). A page
    /// insert failure aborts the whole batch with an error.
    pub(crate) async fn process_batch(
        &self,
        batch: Vec<(WriterRecord, ReceivedMessage)>,
    ) -> Result<Vec<ReceivedMessage>> {
        let mut pages = Vec::new();
        let mut images = Vec::new();
        let mut summaries = Vec::new();
        let mut completions = Vec::new();

        for entry in batch {
            match &entry.0 {
                WriterRecord::PageData { .. } => pages.push(entry),
                WriterRecord::ImageMetadata { .. } | WriterRecord::ImageExplanation { .. } => {
                    images.push(entry)
                }
                WriterRecord::PageSummary { .. } => summaries.push(entry),
                WriterRecord::ScrapingComplete { .. } => completions.push(entry),
            }
        }

        let mut deletable = Vec::new();

        for (record, msg) in pages {
            self.write_page_data(record).await?;
            deletable.push(msg);
        }

        for (record, msg) in images {
            if self.write_image(record).await {
                deletable.push(msg);
            }
        }

        for (record, msg) in summaries {
            if self.write_summary(record).await {
                deletable.push(msg);
            }
        }

        for (record, msg) in completions {
            self.write_completion(record).await;
            deletable.push(msg);
        }

        Ok(deletable)
    }

    /// Insert the page row and its term/link rows
    ///
    /// The page row is the integrity anchor: its failure aborts the batch.
    /// Term and link batch-insert failures only cost those rows.
    async fn write_page_data(&self, record: WriterRecord) -> Result<()> {
        let WriterRecord::PageData {
            scraping_id,
            url,
            terms,
            links,
        } = record
        else {
            return Ok(());
        };

        tracing::info!(scraping_id = scraping_id.get(), url = %url, "writing page data");
        let page_id = self.repo.insert_page(scraping_id, &url).await?;

        if let Err(e) = self.repo.insert_terms(scraping_id, page_id, &terms).await {
            tracing::error!(page_id, error = %e, "failed to batch insert terms");
        }
        if let Err(e) = self.repo.insert_links(scraping_id, page_id, &links).await {
            tracing::error!(page_id, error = %e, "failed to batch insert links");
        }

        if !links.is_empty() {
            // Dashboard telemetry on the status table; unrelated to the
            // pending counter and never read for completion.
            if let Err(e) = self
                .status
                .increment_link_count(scraping_id, links.len() as i64)
                .await
            {
                tracing::error!(
                    scraping_id = scraping_id.get(),
                    error = %e,
                    "failed to increment link count"
                );
            }
        }
        Ok(())
    }

    /// Attach an image row to its page; false means "leave undeleted"
    async fn write_image(&self, record: WriterRecord) -> bool {
        let (scraping_id, page_url, image_url, explanation, s3_path) = match record {
            WriterRecord::ImageMetadata {
                scraping_id,
                page_url,
                image_url,
                s3_path,
            } => (scraping_id, page_url, image_url, None, s3_path),
            WriterRecord::ImageExplanation {
                scraping_id,
                page_url,
                image_url,
                explanation,
                s3_path,
            } => (
                scraping_id,
                page_url,
                image_url,
                Some(explanation),
                Some(s3_path),
            ),
            _ => return true,
        };

        let page_id = match self.find_required_page(scraping_id, &page_url).await {
            Some(page_id) => page_id,
            None => return false,
        };

        match self
            .repo
            .insert_image(
                scraping_id,
                page_id,
                &image_url,
                explanation.as_deref(),
                s3_path.as_deref().filter(|p| !p.is_empty()),
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    scraping_id = scraping_id.get(),
                    image_url = %image_url,
                    error = %e,
                    "failed to insert image row"
                );
                false
            }
        }
    }

    /// Apply a summary to its page; false means "leave undeleted"
    async fn write_summary(&self, record: WriterRecord) -> bool {
        let WriterRecord::PageSummary {
            scraping_id,
            url,
            summary,
        } = record
        else {
            return true;
        };

        match self.repo.update_summary(scraping_id, &url, &summary).await {
            Ok(0) => {
                // The page row hasn't landed yet; redelivery will retry.
                tracing::warn!(
                    scraping_id = scraping_id.get(),
                    url = %url,
                    "no page row for summary yet, leaving for redelivery"
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::error!(scraping_id = scraping_id.get(), url = %url, error = %e, "failed to update summary");
                false
            }
        }
    }

    /// Record completion: the status table is authoritative, the relational
    /// update is an optional hook, and failures never block deletion.
    async fn write_completion(&self, record: WriterRecord) {
        let WriterRecord::ScrapingComplete { scraping_id } = record else {
            return;
        };

        tracing::info!(scraping_id = scraping_id.get(), "job completed");

        if let Err(e) = self.repo.complete_scraping(scraping_id).await {
            tracing::error!(scraping_id = scraping_id.get(), error = %e, "failed to update scraping row");
        }

        let completed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Err(e) = self.status.mark_completed(scraping_id, &completed_at).await {
            tracing::error!(
                scraping_id = scraping_id.get(),
                error = %e,
                "failed to mirror completion to the status table"
            );
        }
    }

    async fn find_required_page(&self, scraping_id: ScrapingId, page_url: &str) -> Option<i64> {
        match self.repo.find_page(scraping_id, page_url).await {
            Ok(Some(page_id)) => Some(page_id),
            Ok(None) => {
                tracing::warn!(
                    scraping_id = scraping_id.get(),
                    page_url = %page_url,
                    "referenced page not found yet, leaving for redelivery"
                );
                None
            }
            Err(e) => {
                tracing::error!(
                    scraping_id = scraping_id.get(),
                    page_url = %page_url,
                    error = %e,
                    "page lookup failed, leaving for redelivery"
                );
                None
            }
        }
    }
}
