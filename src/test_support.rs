//! In-memory fakes for the adapter traits
//!
//! Every external collaborator has an in-memory double here with failure
//! injection, so the worker cores can be driven through their full protocol
//! without AWS, Redis or Postgres.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::coordination::CoordinationStore;
use crate::error::{DatabaseError, Error, QueueError, Result};
use crate::fetch::{FetchedPage, PageFetcher};
use crate::image_extractor::ImageDownloader;
use crate::queue::{MessageQueue, ReceivedMessage};
use crate::status::StatusTable;
use crate::storage::BlobStore;
use crate::types::ScrapingId;
use crate::writer::PageRepository;

// ── Message queue ───────────────────────────────────────────────────────

/// In-memory queue fabric: one fake serving every queue URL
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<QueueInner>,
    id_counter: AtomicU64,
}

#[derive(Default)]
struct QueueInner {
    /// Pending (undelivered) messages per queue URL
    queues: HashMap<String, VecDeque<ReceivedMessage>>,
    /// Every body ever sent per queue URL, for assertions
    sent_log: HashMap<String, Vec<String>>,
    /// Deleted receipt handles per queue URL
    deleted: HashMap<String, Vec<String>>,
    /// Per-queue planned send outcomes (front is next); empty means success
    send_plan: HashMap<String, VecDeque<bool>>,
}

impl MemoryQueue {
    /// Plan the next send outcomes for `queue_url` (true = success)
    pub fn plan_sends(&self, queue_url: &str, outcomes: &[bool]) {
        self.inner
            .lock()
            .unwrap()
            .send_plan
            .insert(queue_url.to_string(), outcomes.iter().copied().collect());
    }

    /// All bodies sent to `queue_url`, in order
    pub fn sent_bodies(&self, queue_url: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .sent_log
            .get(queue_url)
            .cloned()
            .unwrap_or_default()
    }

    /// Sent bodies deserialized into `T`
    pub fn sent_as<T: serde::de::DeserializeOwned>(&self, queue_url: &str) -> Vec<T> {
        self.sent_bodies(queue_url)
            .iter()
            .map(|b| serde_json::from_str(b).unwrap())
            .collect()
    }

    /// Receipt handles deleted from `queue_url`
    pub fn deleted_handles(&self, queue_url: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .deleted
            .get(queue_url)
            .cloned()
            .unwrap_or_default()
    }

    /// Push a message straight into a queue, as an external producer would
    pub fn push_raw(&self, queue_url: &str, body: impl Into<String>) -> ReceivedMessage {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let msg = ReceivedMessage {
            message_id: format!("m-{id}"),
            body: body.into(),
            receipt_handle: format!("rh-{id}"),
        };
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(queue_url.to_string())
            .or_default()
            .push_back(msg.clone());
        msg
    }

    /// Push a serializable message into a queue
    pub fn push<T: serde::Serialize>(&self, queue_url: &str, body: &T) -> ReceivedMessage {
        self.push_raw(queue_url, serde_json::to_string(body).unwrap())
    }

    /// Number of undelivered messages on `queue_url`
    pub fn pending_len(&self, queue_url: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(queue_url)
            .map_or(0, |q| q.len())
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: i32,
        _wait_seconds: i32,
    ) -> Result<Vec<ReceivedMessage>> {
        let mut inner = self.inner.lock().unwrap();
        let queue = inner.queues.entry(queue_url.to_string()).or_default();
        let take = (max_messages.max(0) as usize).min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    async fn send_raw(&self, queue_url: &str, body: String) -> Result<()> {
        let planned_ok = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .send_plan
                .get_mut(queue_url)
                .and_then(|plan| plan.pop_front())
                .unwrap_or(true)
        };
        if !planned_ok {
            return Err(Error::Queue(QueueError::Send {
                queue_url: queue_url.to_string(),
                reason: "planned failure".into(),
            }));
        }
        self.inner
            .lock()
            .unwrap()
            .sent_log
            .entry(queue_url.to_string())
            .or_default()
            .push(body.clone());
        // Delivered messages become receivable, so fakes can model the
        // recursive input queue.
        drop(self.push_raw(queue_url, body));
        Ok(())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .deleted
            .entry(queue_url.to_string())
            .or_default()
            .push(receipt_handle.to_string());
        Ok(())
    }

    async fn delete_batch(&self, queue_url: &str, messages: &[ReceivedMessage]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let deleted = inner.deleted.entry(queue_url.to_string()).or_default();
        for msg in messages {
            deleted.push(msg.receipt_handle.clone());
        }
        Ok(())
    }
}

// ── Coordination store ──────────────────────────────────────────────────

/// In-memory coordination store with failure injection
#[derive(Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, HashSet<String>>>,
    counters: Mutex<HashMap<String, i64>>,
    /// set_add fails for these members
    pub fail_set_add_members: Mutex<HashSet<String>>,
    /// incr_by with positive delta fails
    pub fail_positive_incr: Mutex<bool>,
    /// incr_by with negative delta fails
    pub fail_negative_incr: Mutex<bool>,
    /// decr fails
    pub fail_decr: Mutex<bool>,
}

impl MemoryStore {
    /// Seed a counter, as the external submitter does for the seed task
    pub fn seed_counter(&self, key: &str, value: i64) {
        self.counters.lock().unwrap().insert(key.to_string(), value);
    }

    /// Current counter value (0 when untouched)
    pub fn counter(&self, key: &str) -> i64 {
        *self.counters.lock().unwrap().get(key).unwrap_or(&0)
    }

    /// Members of a set
    pub fn set_members(&self, key: &str) -> HashSet<String> {
        self.sets.lock().unwrap().get(key).cloned().unwrap_or_default()
    }

    fn store_error(op: &str) -> Error {
        Error::Coordination(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "injected failure",
            op.to_string(),
        )))
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        if self.fail_set_add_members.lock().unwrap().contains(member) {
            return Err(Self::store_error("sadd"));
        }
        Ok(self
            .sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        if delta > 0 && *self.fail_positive_incr.lock().unwrap() {
            return Err(Self::store_error("incrby"));
        }
        if delta < 0 && *self.fail_negative_incr.lock().unwrap() {
            return Err(Self::store_error("incrby"));
        }
        let mut counters = self.counters.lock().unwrap();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += delta;
        Ok(*value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        if *self.fail_decr.lock().unwrap() {
            return Err(Self::store_error("decr"));
        }
        let mut counters = self.counters.lock().unwrap();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value -= 1;
        Ok(*value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.counters.lock().unwrap().get(key).map(|v| v.to_string()))
    }
}

// ── Page fetcher ────────────────────────────────────────────────────────

/// Canned-page fetcher; unknown URLs fail like a network error
#[derive(Default)]
pub struct MemoryFetcher {
    pages: Mutex<HashMap<String, (u16, Vec<u8>)>>,
}

impl MemoryFetcher {
    /// Serve `body` with status 200 for `url`
    pub fn serve(&self, url: &str, body: &str) {
        self.serve_with_status(url, 200, body);
    }

    /// Serve `body` with an explicit status for `url`
    pub fn serve_with_status(&self, url: &str, status: u16, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.as_bytes().to_vec()));
    }
}

#[async_trait]
impl PageFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        match self.pages.lock().unwrap().get(url) {
            Some((status, body)) => Ok(FetchedPage {
                status: *status,
                body: body.clone(),
            }),
            None => Err(Error::Fetch {
                url: url.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}

// ── Writer repository ───────────────────────────────────────────────────

/// A page row persisted by the in-memory repository
#[derive(Clone, Debug)]
pub struct StoredPage {
    pub id: i64,
    pub scraping_id: i64,
    pub url: String,
    pub summary: Option<String>,
}

/// In-memory [`PageRepository`] with failure injection
#[derive(Default)]
pub struct MemoryRepository {
    next_id: AtomicU64,
    pub scrapings: Mutex<Vec<(i64, String)>>,
    pub pages: Mutex<Vec<StoredPage>>,
    pub terms: Mutex<Vec<(i64, i64, String, u64)>>,
    pub links: Mutex<Vec<(i64, i64, String)>>,
    pub images: Mutex<Vec<(i64, i64, String, Option<String>, Option<String>)>>,
    pub completed: Mutex<Vec<i64>>,
    pub fail_page_insert: Mutex<bool>,
    pub fail_term_insert: Mutex<bool>,
}

impl MemoryRepository {
    fn db_error(what: &str) -> Error {
        Error::Database(DatabaseError::QueryFailed(format!("injected: {what}")))
    }
}

#[async_trait]
impl PageRepository for MemoryRepository {
    async fn create_scraping(&self, url: &str) -> Result<ScrapingId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as i64 + 1;
        self.scrapings.lock().unwrap().push((id, url.to_string()));
        Ok(ScrapingId(id))
    }

    async fn insert_page(&self, scraping_id: ScrapingId, url: &str) -> Result<i64> {
        if *self.fail_page_insert.lock().unwrap() {
            return Err(Self::db_error("insert_page"));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as i64 + 1;
        self.pages.lock().unwrap().push(StoredPage {
            id,
            scraping_id: scraping_id.get(),
            url: url.to_string(),
            summary: None,
        });
        Ok(id)
    }

    async fn insert_terms(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        terms: &HashMap<String, u64>,
    ) -> Result<()> {
        if *self.fail_term_insert.lock().unwrap() {
            return Err(Self::db_error("insert_terms"));
        }
        let mut stored = self.terms.lock().unwrap();
        for (term, freq) in terms {
            stored.push((scraping_id.get(), page_id, term.clone(), *freq));
        }
        Ok(())
    }

    async fn insert_links(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        links: &[String],
    ) -> Result<()> {
        let mut stored = self.links.lock().unwrap();
        for link in links {
            stored.push((scraping_id.get(), page_id, link.clone()));
        }
        Ok(())
    }

    async fn find_page(&self, scraping_id: ScrapingId, url: &str) -> Result<Option<i64>> {
        // Most recent first, like the ORDER BY scraped_at DESC lookup.
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.scraping_id == scraping_id.get() && p.url == url)
            .map(|p| p.id))
    }

    async fn insert_image(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        image_url: &str,
        explanation: Option<&str>,
        s3_path: Option<&str>,
    ) -> Result<()> {
        self.images.lock().unwrap().push((
            scraping_id.get(),
            page_id,
            image_url.to_string(),
            explanation.map(str::to_string),
            s3_path.map(str::to_string),
        ));
        Ok(())
    }

    async fn update_summary(
        &self,
        scraping_id: ScrapingId,
        url: &str,
        summary: &str,
    ) -> Result<u64> {
        let mut pages = self.pages.lock().unwrap();
        let mut updated = 0;
        for page in pages
            .iter_mut()
            .filter(|p| p.scraping_id == scraping_id.get() && p.url == url)
        {
            page.summary = Some(summary.to_string());
            updated += 1;
        }
        Ok(updated)
    }

    async fn complete_scraping(&self, scraping_id: ScrapingId) -> Result<()> {
        self.completed.lock().unwrap().push(scraping_id.get());
        Ok(())
    }
}

// ── Status table ────────────────────────────────────────────────────────

/// In-memory [`StatusTable`] with failure injection
#[derive(Default)]
pub struct MemoryStatusTable {
    pub pending_items: Mutex<Vec<(i64, String, u32, String)>>,
    pub completions: Mutex<Vec<(i64, String)>>,
    pub link_counts: Mutex<HashMap<i64, i64>>,
    pub fail_create_pending: Mutex<bool>,
    pub fail_mark_completed: Mutex<bool>,
}

#[async_trait]
impl StatusTable for MemoryStatusTable {
    async fn create_pending(
        &self,
        id: ScrapingId,
        url: &str,
        depth: u32,
        created_at: &str,
    ) -> Result<()> {
        if *self.fail_create_pending.lock().unwrap() {
            return Err(Error::StatusTable("injected failure".into()));
        }
        self.pending_items.lock().unwrap().push((
            id.get(),
            url.to_string(),
            depth,
            created_at.to_string(),
        ));
        Ok(())
    }

    async fn mark_completed(&self, id: ScrapingId, completed_at: &str) -> Result<()> {
        if *self.fail_mark_completed.lock().unwrap() {
            return Err(Error::StatusTable("injected failure".into()));
        }
        self.completions
            .lock()
            .unwrap()
            .push((id.get(), completed_at.to_string()));
        Ok(())
    }

    async fn increment_link_count(&self, id: ScrapingId, count: i64) -> Result<()> {
        *self.link_counts.lock().unwrap().entry(id.get()).or_insert(0) += count;
        Ok(())
    }

    async fn get_status(&self, id: ScrapingId) -> Result<Option<String>> {
        if self
            .completions
            .lock()
            .unwrap()
            .iter()
            .any(|(jid, _)| *jid == id.get())
        {
            return Ok(Some("COMPLETED".to_string()));
        }
        if self
            .pending_items
            .lock()
            .unwrap()
            .iter()
            .any(|(jid, ..)| *jid == id.get())
        {
            return Ok(Some("PENDING".to_string()));
        }
        Ok(None)
    }
}

// ── Blob store and image downloader ─────────────────────────────────────

/// In-memory [`BlobStore`] with failure injection
#[derive(Default)]
pub struct MemoryBlobStore {
    pub objects: Mutex<Vec<(String, String, usize, String)>>,
    pub fail_puts: Mutex<bool>,
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        if *self.fail_puts.lock().unwrap() {
            return Err(Error::Storage("injected failure".into()));
        }
        self.objects.lock().unwrap().push((
            bucket.to_string(),
            key.to_string(),
            data.len(),
            content_type.to_string(),
        ));
        Ok(format!("s3://{bucket}/{key}"))
    }
}

/// Canned image downloader; unknown URLs fail
#[derive(Default)]
pub struct MemoryDownloader {
    images: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryDownloader {
    /// Serve `data` with the given content type for `url`
    pub fn serve(&self, url: &str, data: &[u8], content_type: &str) {
        self.images
            .lock()
            .unwrap()
            .insert(url.to_string(), (data.to_vec(), content_type.to_string()));
    }
}

#[async_trait]
impl ImageDownloader for MemoryDownloader {
    async fn download(&self, url: &str) -> Result<(Vec<u8>, String)> {
        self.images
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
    }
}
