//! Writer worker binary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crawlgraph::shutdown::cancel_on_shutdown;
use crawlgraph::{Database, DynamoStatusTable, Result, SqsQueue, Writer, WriterConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "writer exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = WriterConfig::from_env()?;

    let queue = Arc::new(SqsQueue::from_env().await);
    let db = Arc::new(Database::connect(&config.database_url, config.db_batch_size).await?);
    let status = Arc::new(DynamoStatusTable::from_env(config.dynamodb_table.clone()).await);
    let writer = Writer::new(queue, db, status, config);

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    writer.run(cancel).await
}
