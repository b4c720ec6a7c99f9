//! Relational persistence layer
//!
//! Postgres persistence for the crawl result graph. Methods on [`Database`]
//! are organized by domain:
//! - [`migrations`] — connection lifecycle, idempotent schema migrations
//! - [`pages`] — page / term / link / image materialization (the
//!   [`crate::writer::PageRepository`] implementation)
//!
//! The writer is the only component that touches this store.

mod migrations;
mod pages;

use sqlx::postgres::PgPool;

/// Database handle for crawlgraph
///
/// Cheap to clone; the underlying pool is shared.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    /// Chunk size for multi-row term/link inserts
    batch_size: usize,
}

impl Database {
    /// The connection pool, for integration tooling
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
