//! Page, term, link and image materialization.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{DatabaseError, Error, Result};
use crate::types::ScrapingId;
use crate::writer::PageRepository;

use super::Database;

fn query_failed(context: &str, e: sqlx::Error) -> Error {
    Error::Database(DatabaseError::QueryFailed(format!("{context}: {e}")))
}

#[async_trait]
impl PageRepository for Database {
    async fn create_scraping(&self, url: &str) -> Result<ScrapingId> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO scrapings (url)
            VALUES ($1)
            RETURNING id
            "#,
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_failed("insert scrapings", e))?;

        Ok(ScrapingId(id))
    }

    async fn insert_page(&self, scraping_id: ScrapingId, url: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO scraped_pages (scraping_id, url)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(scraping_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_failed("insert scraped_pages", e))?;

        Ok(id)
    }

    async fn insert_terms(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        terms: &HashMap<String, u64>,
    ) -> Result<()> {
        if terms.is_empty() {
            return Ok(());
        }

        let rows: Vec<(&String, i64)> = terms.iter().map(|(t, f)| (t, *f as i64)).collect();
        for chunk in rows.chunks(self.batch_size) {
            let mut builder = sqlx::QueryBuilder::new(
                "INSERT INTO page_terms (scraping_id, page_id, term, frequency) ",
            );
            builder.push_values(chunk, |mut b, (term, frequency)| {
                b.push_bind(scraping_id)
                    .push_bind(page_id)
                    .push_bind(term.as_str())
                    .push_bind(*frequency);
            });
            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| query_failed("batch insert page_terms", e))?;
        }
        Ok(())
    }

    async fn insert_links(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        links: &[String],
    ) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        for chunk in links.chunks(self.batch_size) {
            let mut builder = sqlx::QueryBuilder::new(
                "INSERT INTO page_links (scraping_id, source_page_id, target_url) ",
            );
            builder.push_values(chunk, |mut b, link| {
                b.push_bind(scraping_id)
                    .push_bind(page_id)
                    .push_bind(link.as_str());
            });
            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| query_failed("batch insert page_links", e))?;
        }
        Ok(())
    }

    async fn find_page(&self, scraping_id: ScrapingId, url: &str) -> Result<Option<i64>> {
        // Duplicate deliveries can leave several rows for the same page; the
        // most recent one is the attachment anchor.
        sqlx::query_scalar(
            r#"
            SELECT id FROM scraped_pages
            WHERE scraping_id = $1 AND url = $2
            ORDER BY scraped_at DESC
            LIMIT 1
            "#,
        )
        .bind(scraping_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_failed("find scraped_page", e))
    }

    async fn insert_image(
        &self,
        scraping_id: ScrapingId,
        page_id: i64,
        image_url: &str,
        explanation: Option<&str>,
        s3_path: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO page_images (scraping_id, page_id, image_url, explanation, s3_path)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(scraping_id)
        .bind(page_id)
        .bind(image_url)
        .bind(explanation)
        .bind(s3_path)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("insert page_images", e))?;
        Ok(())
    }

    async fn update_summary(
        &self,
        scraping_id: ScrapingId,
        url: &str,
        summary: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE scraped_pages
            SET summary = $3
            WHERE scraping_id = $1 AND url = $2
            "#,
        )
        .bind(scraping_id)
        .bind(url)
        .bind(summary)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("update scraped_pages summary", e))?;

        Ok(result.rows_affected())
    }

    async fn complete_scraping(&self, scraping_id: ScrapingId) -> Result<()> {
        // Monotone: PENDING -> COMPLETED, never back.
        sqlx::query(
            r#"
            UPDATE scrapings
            SET status = 'COMPLETED', completed_at = now()
            WHERE id = $1 AND status <> 'COMPLETED'
            "#,
        )
        .bind(scraping_id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("complete scraping", e))?;
        Ok(())
    }
}
