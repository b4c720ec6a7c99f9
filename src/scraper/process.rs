//! Scrape-task processing
//!
//! One [`ScrapeTask`] arrives with its slot already counted in the job's
//! pending counter (the seed submitter counts the seed; the scraper counts
//! children before enqueueing them). Processing must therefore release that
//! slot — run the terminal decrement — exactly once on every exit path, with
//! a single exception: when the pre-increment for discovered children fails,
//! the task aborts *without* decrementing so SQS redelivery can retry it from
//! the top. Emitting uncounted children would be worse than re-scraping a
//! page.
//!
//! Control flow makes the contract structural: `scrape` returns an outcome,
//! and only the `Processed` arm reaches [`Scraper::finish`], the sole place
//! the decrement happens.

use crate::coordination::{pending_key, visited_key};
use crate::error::Error;
use crate::queue::send_json;
use crate::scraper::parse::parse_page;
use crate::scraper::Scraper;
use crate::types::{ImageTask, IndexDocument, ScrapeTask, SummaryTask, WriterRecord};

/// How a task's scrape phase ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScrapeOutcome {
    /// The task consumed its counter slot; run the terminal decrement.
    Processed,
    /// Pre-increment failed; the slot is still counted, leave it for
    /// redelivery and do NOT decrement.
    AbortBeforeDecrement,
}

impl Scraper {
    /// Process one scrape task end to end
    ///
    /// Fetch errors, non-2xx responses, parse trouble and per-send failures
    /// are all non-fatal: the task still completes its lifecycle, including
    /// the terminal decrement and a possible completion signal. Only a failed
    /// pre-increment aborts without decrementing.
    pub async fn process(&self, task: &ScrapeTask) {
        tracing::info!(
            url = %task.url,
            depth = task.depth,
            scraping_id = task.scraping_id.get(),
            "processing scrape task"
        );

        match self.scrape(task).await {
            ScrapeOutcome::Processed => self.finish(task).await,
            ScrapeOutcome::AbortBeforeDecrement => {
                tracing::warn!(
                    url = %task.url,
                    scraping_id = task.scraping_id.get(),
                    "task aborted before decrement, awaiting redelivery"
                );
            }
        }
    }

    async fn scrape(&self, task: &ScrapeTask) -> ScrapeOutcome {
        let visited = visited_key(task.scraping_id);
        let pending = pending_key(task.scraping_id);

        // Step 1: mark ourselves visited. The seed may already be in the set
        // (pre-added by the submitter) and duplicate deliveries are harmless,
        // so the result is ignored; a store error here only costs dedup
        // precision for our children.
        if let Err(e) = self.store.set_add(&visited, &task.url).await {
            tracing::warn!(url = %task.url, error = %e, "failed to mark url visited");
        }

        // Step 2: fetch.
        let page = match self.fetcher.fetch(&task.url).await {
            Ok(page) if (200..300).contains(&page.status) => page,
            Ok(page) => {
                tracing::warn!(url = %task.url, status = page.status, "non-success status");
                return ScrapeOutcome::Processed;
            }
            Err(e) => {
                tracing::warn!(url = %task.url, error = %e, "fetch failed");
                return ScrapeOutcome::Processed;
            }
        };

        // Step 3: parse.
        let extract = parse_page(&page.body);

        // Step 4: page data to the writer. Loss on send failure is accepted;
        // the counter slot was spent on fetching, not on delivery.
        let record = WriterRecord::PageData {
            scraping_id: task.scraping_id,
            url: task.url.clone(),
            terms: extract.terms,
            links: extract.links.clone(),
        };
        if let Err(e) = send_json(self.queue.as_ref(), &self.config.writer_queue_url, &record).await
        {
            tracing::error!(url = %task.url, error = %e, "failed to send page data");
        }

        // Step 5: side channels, each independent and best-effort.
        self.emit_side_channels(task, &extract.text, &extract.images)
            .await;

        // Step 6: collect fan-out candidates through the visited set.
        let mut links_to_send = Vec::new();
        if task.depth > 0 {
            for link in extract.links.iter().filter(|l| l.starts_with("http")) {
                match self.store.set_add(&visited, link).await {
                    Ok(true) => links_to_send.push(link.clone()),
                    Ok(false) => {}
                    Err(e) => {
                        // Fail safe against loops: an unverifiable link is
                        // skipped rather than risked.
                        tracing::warn!(link = %link, error = %e, "visited check failed, skipping link");
                    }
                }
            }
        }

        if !links_to_send.is_empty() {
            // Step 7: pre-increment before any child is enqueued, so the
            // counter is never an under-count.
            if let Err(e) = self
                .store
                .incr_by(&pending, links_to_send.len() as i64)
                .await
            {
                tracing::error!(
                    scraping_id = task.scraping_id.get(),
                    links = links_to_send.len(),
                    error = %e,
                    "pre-increment failed, aborting task to avoid premature completion"
                );
                return ScrapeOutcome::AbortBeforeDecrement;
            }

            // Step 8: enqueue children, compensating for failed sends.
            let mut failed: i64 = 0;
            for link in links_to_send {
                let child = ScrapeTask {
                    url: link,
                    depth: task.depth - 1,
                    scraping_id: task.scraping_id,
                };
                if let Err(e) =
                    send_json(self.queue.as_ref(), &self.config.input_queue_url, &child).await
                {
                    tracing::error!(url = %child.url, error = %e, "failed to enqueue child task");
                    failed += 1;
                }
            }
            if failed > 0 {
                if let Err(e) = self.store.incr_by(&pending, -failed).await {
                    // The counter is now an over-count and the job may never
                    // reach zero. Surfaced loudly; accepted as zombie risk.
                    tracing::error!(
                        scraping_id = task.scraping_id.get(),
                        failed,
                        error = %e,
                        "failed to compensate pending counter for failed sends"
                    );
                }
            }
        }

        ScrapeOutcome::Processed
    }

    /// Step 9: the terminal decrement and the one-and-only completion signal
    async fn finish(&self, task: &ScrapeTask) {
        let pending = pending_key(task.scraping_id);
        match self.store.decr(&pending).await {
            Ok(0) => {
                tracing::info!(
                    scraping_id = task.scraping_id.get(),
                    "job complete, notifying writer"
                );
                let record = WriterRecord::ScrapingComplete {
                    scraping_id: task.scraping_id,
                };
                if let Err(e) =
                    send_json(self.queue.as_ref(), &self.config.writer_queue_url, &record).await
                {
                    tracing::error!(
                        scraping_id = task.scraping_id.get(),
                        error = %e,
                        "failed to send completion signal"
                    );
                }
            }
            Ok(v) if v < 0 => {
                let err = Error::CounterUnderflow {
                    scraping_id: task.scraping_id.get(),
                    value: v,
                };
                tracing::error!(error = %err, "suppressing completion");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    scraping_id = task.scraping_id.get(),
                    error = %e,
                    "failed to decrement pending counter"
                );
            }
        }
    }

    async fn emit_side_channels(&self, task: &ScrapeTask, text: &str, images: &[String]) {
        if !self.config.indexer_queue_url.is_empty() {
            let doc = IndexDocument {
                url: task.url.clone(),
                content: text.to_string(),
                scraping_id: task.scraping_id,
            };
            if let Err(e) =
                send_json(self.queue.as_ref(), &self.config.indexer_queue_url, &doc).await
            {
                tracing::error!(url = %task.url, error = %e, "failed to send index document");
            }
        }

        if self.config.page_summarizer_enabled && !self.config.summarizer_queue_url.is_empty() {
            let summary_task = SummaryTask {
                url: task.url.clone(),
                content: text.to_string(),
                scraping_id: task.scraping_id,
            };
            if let Err(e) = send_json(
                self.queue.as_ref(),
                &self.config.summarizer_queue_url,
                &summary_task,
            )
            .await
            {
                tracing::error!(url = %task.url, error = %e, "failed to send summary task");
            }
        }

        if self.config.image_explainer_enabled && !self.config.image_queue_url.is_empty() {
            for image_url in images {
                let image_task = ImageTask {
                    url: image_url.clone(),
                    page_url: task.url.clone(),
                    scraping_id: task.scraping_id,
                };
                if let Err(e) = send_json(
                    self.queue.as_ref(),
                    &self.config.image_queue_url,
                    &image_task,
                )
                .await
                {
                    tracing::error!(image_url = %image_url, error = %e, "failed to send image task");
                }
            }
        }
    }
}
