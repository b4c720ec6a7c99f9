//! Job submission binary: seed one crawl and optionally wait for it.

use std::sync::Arc;
use std::time::Duration;

use crawlgraph::{Database, DynamoStatusTable, RedisStore, Result, SqsQueue, Submitter, SubmitterConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "submission failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = SubmitterConfig::from_env()?;

    let queue = Arc::new(SqsQueue::from_env().await);
    let store = Arc::new(RedisStore::connect(&config.redis_url()).await?);
    let db = Arc::new(Database::connect(&config.database_url, 25).await?);
    let status = Arc::new(DynamoStatusTable::from_env(config.dynamodb_table.clone()).await);

    let submitter = Submitter::new(queue, store, db, status, config.input_queue_url.clone());
    let id = submitter
        .submit(&config.scrape_url, config.scrape_depth)
        .await?;
    println!("{id}");

    if config.wait_for_completion {
        submitter
            .wait_for_completion(id, Duration::from_secs(config.completion_timeout_seconds))
            .await?;
    }
    Ok(())
}
