//! Indexer worker binary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crawlgraph::shutdown::cancel_on_shutdown;
use crawlgraph::{HttpSearchIndex, Indexer, IndexerConfig, Result, SqsQueue};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "indexer exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = IndexerConfig::from_env()?;

    let queue = Arc::new(SqsQueue::from_env().await);
    let index = Arc::new(HttpSearchIndex::new(config.search_index_url.clone()));
    let indexer = Indexer::new(queue, index, config);

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    indexer.run(cancel).await
}
