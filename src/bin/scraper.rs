//! Scraper worker binary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crawlgraph::shutdown::cancel_on_shutdown;
use crawlgraph::{HttpPageFetcher, RedisStore, Result, Scraper, ScraperConfig, SqsQueue};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "scraper exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ScraperConfig::from_env()?;

    let queue = Arc::new(SqsQueue::from_env().await);
    let store = Arc::new(RedisStore::connect(&config.redis_url()).await?);
    let fetcher = Arc::new(HttpPageFetcher::new()?);
    let scraper = Scraper::new(queue, store, fetcher, config);

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    scraper.run(cancel).await
}
