//! Image extractor worker binary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crawlgraph::shutdown::cancel_on_shutdown;
use crawlgraph::{
    HttpImageDownloader, ImageExtractor, ImageExtractorConfig, Result, S3BlobStore, SqsQueue,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "image extractor exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ImageExtractorConfig::from_env()?;

    let queue = Arc::new(SqsQueue::from_env().await);
    let blobs = Arc::new(S3BlobStore::from_env().await);
    let downloader = Arc::new(HttpImageDownloader::new()?);
    let extractor = ImageExtractor::new(queue, blobs, downloader, config);

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    extractor.run(cancel).await
}
