//! Connection lifecycle and schema migrations.

use sqlx::postgres::PgPoolOptions;

use crate::error::{DatabaseError, Error, Result};

use super::Database;

/// Schema statements, applied in order; every statement is idempotent so
/// startup can run them unconditionally.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scrapings (
        id           BIGSERIAL PRIMARY KEY,
        url          TEXT NOT NULL,
        status       TEXT NOT NULL DEFAULT 'PENDING',
        created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
        completed_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scraped_pages (
        id          BIGSERIAL PRIMARY KEY,
        scraping_id BIGINT NOT NULL,
        url         TEXT NOT NULL,
        summary     TEXT,
        scraped_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS page_terms (
        id          BIGSERIAL PRIMARY KEY,
        scraping_id BIGINT NOT NULL,
        page_id     BIGINT NOT NULL,
        term        TEXT NOT NULL,
        frequency   BIGINT NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS page_links (
        id             BIGSERIAL PRIMARY KEY,
        scraping_id    BIGINT NOT NULL,
        source_page_id BIGINT NOT NULL,
        target_url     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS page_images (
        id          BIGSERIAL PRIMARY KEY,
        scraping_id BIGINT NOT NULL,
        page_id     BIGINT NOT NULL,
        image_url   TEXT NOT NULL,
        explanation TEXT,
        s3_path     TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_scraped_pages_scraping_id ON scraped_pages (scraping_id)",
    "CREATE INDEX IF NOT EXISTS idx_scraped_pages_url ON scraped_pages (url)",
    "CREATE INDEX IF NOT EXISTS idx_page_terms_term ON page_terms (term)",
];

impl Database {
    /// Connect to Postgres and run migrations
    pub async fn connect(database_url: &str, batch_size: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to connect to database: {e}"
                )))
            })?;

        let db = Self {
            pool,
            batch_size: batch_size.max(1),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Apply the schema migrations
    async fn run_migrations(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "statement failed: {e}"
                    )))
                })?;
        }
        tracing::debug!(statements = MIGRATIONS.len(), "migrations applied");
        Ok(())
    }
}
