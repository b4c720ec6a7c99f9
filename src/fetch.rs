//! Page fetching
//!
//! The HTTP fetcher is an external collaborator of the scraper core; the
//! [`PageFetcher`] trait is the seam that lets tests feed canned pages
//! through the processing pipeline.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Request timeout for page fetches
const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Connect timeout for page fetches
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("crawlgraph/", env!("CARGO_PKG_VERSION"));

/// A successfully fetched page body
#[derive(Clone, Debug)]
pub struct FetchedPage {
    /// Final response status code
    pub status: u16,
    /// Raw response body
    pub body: Vec<u8>,
}

/// Fetches one page over HTTP
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, returning the status and body
    ///
    /// Network failures are errors; non-2xx statuses are returned in the
    /// page so the caller can decide (the scraper treats them like fetch
    /// failures but logs the status).
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// reqwest-backed implementation of [`PageFetcher`]
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Build a fetcher with crawl-appropriate timeouts
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let resp = self.client.get(url).send().await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            reason: format!("reading body: {e}"),
        })?;
        Ok(FetchedPage {
            status,
            body: body.to_vec(),
        })
    }
}
