//! In-memory adapters for end-to-end pipeline tests.
//!
//! These drive the workers through their public trait seams only: an
//! in-memory queue fabric (sent messages become receivable, so the scraper's
//! recursive fan-out actually recurses), a linearizable-by-mutex coordination
//! store, a canned page fetcher and downloader, and in-memory sinks for the
//! relational store, status table and blob store.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crawlgraph::fetch::{FetchedPage, PageFetcher};
use crawlgraph::image_extractor::ImageDownloader;
use crawlgraph::{
    BlobStore, CoordinationStore, Error, MessageQueue, PageRepository, QueueError,
    ReceivedMessage, Result, ScrapingId, StatusTable,
};

// ── queue fabric ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemQueue {
    inner: Mutex<MemQueueInner>,
    id_counter: AtomicU64,
}

#[derive(Default)]
struct MemQueueInner {
    queues: HashMap<String, VecDeque<ReceivedMessage>>,
    sent_log: HashMap<String, Vec<String>>,
    deleted: HashMap<String, Vec<String>>,
    send_plan: HashMap<String, VecDeque<bool>>,
}

impl MemQueue {
    pub fn plan_sends(&self, queue_url: &str, outcomes: &[bool]) {
        self.inner
            .lock()
            .unwrap()
            .send_plan
            .insert(queue_url.to_string(), outcomes.iter().copied().collect());
    }

    pub fn push<T: serde::Serialize>(&self, queue_url: &str, body: &T) {
        let body = serde_json::to_string(body).unwrap();
        self.push_raw(queue_url, body);
    }

    pub fn push_raw(&self, queue_url: &str, body: String) {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let msg = ReceivedMessage {
            message_id: format!("m-{id}"),
            body,
            receipt_handle: format!("rh-{id}"),
        };
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(queue_url.to_string())
            .or_default()
            .push_back(msg);
    }

    pub fn sent_as<T: serde::de::DeserializeOwned>(&self, queue_url: &str) -> Vec<T> {
        self.inner
            .lock()
            .unwrap()
            .sent_log
            .get(queue_url)
            .map(|bodies| {
                bodies
                    .iter()
                    .map(|b| serde_json::from_str(b).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn sent_count(&self, queue_url: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .sent_log
            .get(queue_url)
            .map_or(0, Vec::len)
    }

    pub fn deleted_count(&self, queue_url: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .deleted
            .get(queue_url)
            .map_or(0, Vec::len)
    }

    pub fn pending_len(&self, queue_url: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(queue_url)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl MessageQueue for MemQueue {
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
        self.push_raw(queue_url, body);
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

// ── coordination store ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStore {
    sets: Mutex<HashMap<String, HashSet<String>>>,
    counters: Mutex<HashMap<String, i64>>,
    /// History of every value the counter passed through, per key
    counter_history: Mutex<HashMap<String, Vec<i64>>>,
}

impl MemStore {
    pub fn seed_counter(&self, key: &str, value: i64) {
        self.counters.lock().unwrap().insert(key.to_string(), value);
        self.counter_history
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(value);
    }

    pub fn counter(&self, key: &str) -> i64 {
        *self.counters.lock().unwrap().get(key).unwrap_or(&0)
    }

    pub fn set_members(&self, key: &str) -> HashSet<String> {
        self.sets.lock().unwrap().get(key).cloned().unwrap_or_default()
    }

    /// Every value the counter held, in order; proves it hit zero only once.
    pub fn counter_history(&self, key: &str) -> Vec<i64> {
        self.counter_history
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, key: &str, value: i64) {
        self.counter_history
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(value);
    }
}

#[async_trait]
impl CoordinationStore for MemStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let value = {
            let mut counters = self.counters.lock().unwrap();
            let value = counters.entry(key.to_string()).or_insert(0);
            *value += delta;
            *value
        };
        self.record(key, value);
        Ok(value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let value = {
            let mut counters = self.counters.lock().unwrap();
            let value = counters.entry(key.to_string()).or_insert(0);
            *value -= 1;
            *value
        };
        self.record(key, value);
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.counters.lock().unwrap().get(key).map(|v| v.to_string()))
    }
}

// ── page fetcher ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemFetcher {
    pages: Mutex<HashMap<String, (u16, Vec<u8>)>>,
}

impl MemFetcher {
    pub fn serve(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (200, body.as_bytes().to_vec()));
    }
}

#[async_trait]
impl PageFetcher for MemFetcher {
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

// ── relational sink ─────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct PageRow {
    pub id: i64,
    pub scraping_id: i64,
    pub url: String,
    pub summary: Option<String>,
}

#[derive(Default)]
pub struct MemRepo {
    next_id: AtomicU64,
    pub scrapings: Mutex<Vec<(i64, String)>>,
    pub pages: Mutex<Vec<PageRow>>,
    pub terms: Mutex<Vec<(i64, i64, String, u64)>>,
    pub links: Mutex<Vec<(i64, i64, String)>>,
    pub images: Mutex<Vec<(i64, i64, String, Option<String>, Option<String>)>>,
    pub completed: Mutex<Vec<i64>>,
}

#[async_trait]
impl PageRepository for MemRepo {
    async fn create_scraping(&self, url: &str) -> Result<ScrapingId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as i64 + 1;
        self.scrapings.lock().unwrap().push((id, url.to_string()));
        Ok(ScrapingId(id))
    }

    async fn insert_page(&self, scraping_id: ScrapingId, url: &str) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as i64 + 1;
        self.pages.lock().unwrap().push(PageRow {
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

// ── status table ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStatus {
    pub pending_items: Mutex<Vec<(i64, String, u32, String)>>,
    pub completions: Mutex<Vec<(i64, String)>>,
    pub link_counts: Mutex<HashMap<i64, i64>>,
}

#[async_trait]
impl StatusTable for MemStatus {
    async fn create_pending(
        &self,
        id: ScrapingId,
        url: &str,
        depth: u32,
        created_at: &str,
    ) -> Result<()> {
        self.pending_items.lock().unwrap().push((
            id.get(),
            url.to_string(),
            depth,
            created_at.to_string(),
        ));
        Ok(())
    }

    async fn mark_completed(&self, id: ScrapingId, completed_at: &str) -> Result<()> {
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
        Ok(Some("PENDING".to_string()))
    }
}

// ── blob store and downloader ───────────────────────────────────────────

#[derive(Default)]
pub struct MemBlobs {
    pub objects: Mutex<Vec<(String, String, usize, String)>>,
}

#[async_trait]
impl BlobStore for MemBlobs {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.objects.lock().unwrap().push((
            bucket.to_string(),
            key.to_string(),
            data.len(),
            content_type.to_string(),
        ));
        Ok(format!("s3://{bucket}/{key}"))
    }
}

#[derive(Default)]
pub struct MemDownloader {
    images: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemDownloader {
    pub fn serve(&self, url: &str, data: &[u8], content_type: &str) {
        self.images
            .lock()
            .unwrap()
            .insert(url.to_string(), (data.to_vec(), content_type.to_string()));
    }
}

#[async_trait]
impl ImageDownloader for MemDownloader {
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
