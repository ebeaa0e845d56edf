//! Repository for page lifecycle operations.
//!
//! Owns all page mutation. Status transitions are validated here so no
//! caller can regress a page or publish it twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::{CoreError, Result},
    models::{NewPage, Page, PageId, PageStatus, SiteId},
};

const PAGE_COLUMNS: &str = "id, site_id, kind, parent_id, title, slug, status, content_html, \
                            failure_count, next_attempt_at, published_at, published_url, \
                            created_at, updated_at";

/// Repository for page database operations.
pub struct Repository {
    pool: Arc<SqlitePool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<SqlitePool> {
        self.pool.clone()
    }

    /// Inserts a new page in `Pending` status.
    ///
    /// The parent edge must already be resolved to an id by the importer;
    /// this repository never resolves parents by name.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or the parent reference is invalid.
    pub async fn create(&self, page: &NewPage, now: DateTime<Utc>) -> Result<PageId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pages (site_id, kind, parent_id, title, slug, status,
                               failure_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?)
            RETURNING id
            "#,
        )
        .bind(page.site_id)
        .bind(page.kind)
        .bind(page.parent_id)
        .bind(&page.title)
        .bind(&page.slug)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(PageId(id))
    }

    /// Finds a page by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, page_id: PageId) -> Result<Option<Page>> {
        let page = sqlx::query_as::<_, Page>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?"
        ))
        .bind(page_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(page)
    }

    /// Advances a page to the given status.
    ///
    /// Rejects regressions and transitions out of terminal states.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the page does not exist and `InvalidInput` if
    /// the transition is not a legal forward step.
    pub async fn set_status(
        &self,
        page_id: PageId,
        status: PageStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let current = self
            .find_by_id(page_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("page {page_id} not found")))?
            .status;

        if !current.can_transition_to(status) {
            return Err(CoreError::InvalidInput(format!(
                "illegal status transition for page {page_id}: {current} -> {status}"
            )));
        }

        sqlx::query("UPDATE pages SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(page_id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    /// Attaches rendered HTML and advances `DataReady` -> `ContentReady`.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the page is not in `DataReady`.
    pub async fn set_content(
        &self,
        page_id: PageId,
        content_html: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE pages
            SET content_html = ?, status = 'content_ready', updated_at = ?
            WHERE id = ? AND status = 'data_ready'
            "#,
        )
        .bind(content_html)
        .bind(now)
        .bind(page_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConstraintViolation(format!(
                "page {page_id} is not in data_ready status"
            )));
        }

        Ok(())
    }

    /// Fetches the single oldest delivery-eligible page for a site.
    ///
    /// Eligible means `ContentReady`, past any retry backoff, and with a
    /// published parent if a parent edge exists. FIFO by creation time with
    /// id as the tie-break.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn next_ready(
        &self,
        site_id: SiteId,
        now: DateTime<Utc>,
    ) -> Result<Option<Page>> {
        let page = sqlx::query_as::<_, Page>(&format!(
            r#"
            SELECT {PAGE_COLUMNS} FROM pages
            WHERE site_id = ?
              AND status = 'content_ready'
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
              AND (parent_id IS NULL OR EXISTS (
                    SELECT 1 FROM pages parent
                    WHERE parent.id = pages.parent_id
                      AND parent.status = 'published'))
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#
        ))
        .bind(site_id)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(page)
    }

    /// Marks a page published, recording timestamp and locator together.
    ///
    /// The guard on current status makes the publish transition atomic at
    /// item granularity: a page already published cannot be published again.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the page is not in `ContentReady`.
    pub async fn mark_published(
        &self,
        page_id: PageId,
        published_url: &str,
        published_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE pages
            SET status = 'published', published_at = ?, published_url = ?,
                next_attempt_at = NULL, updated_at = ?
            WHERE id = ? AND status = 'content_ready'
            "#,
        )
        .bind(published_at)
        .bind(published_url)
        .bind(published_at)
        .bind(page_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ConstraintViolation(format!(
                "page {page_id} is not in content_ready status"
            )));
        }

        Ok(())
    }

    /// Records a failed delivery attempt.
    ///
    /// With `next_attempt_at` set the page stays `ContentReady` and becomes
    /// eligible again after the backoff. With `None` the page enters the
    /// terminal `Failed` state.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn record_failure(
        &self,
        page_id: PageId,
        failure_count: i64,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let status =
            if next_attempt_at.is_some() { PageStatus::ContentReady } else { PageStatus::Failed };

        sqlx::query(
            r#"
            UPDATE pages
            SET status = ?, failure_count = ?, next_attempt_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(failure_count)
        .bind(next_attempt_at)
        .bind(now)
        .bind(page_id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Counts pages of a site published at or after `since`.
    ///
    /// This is the quota tracker's source of truth; it is recomputed fresh
    /// on every call, never cached across cycles.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_published_since(
        &self,
        site_id: SiteId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM pages
            WHERE site_id = ? AND status = 'published' AND published_at >= ?
            "#,
        )
        .bind(site_id)
        .bind(since)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count)
    }

    /// Page counts grouped by status, for the operator surface.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn status_counts(&self) -> Result<Vec<(PageStatus, i64)>> {
        let counts = sqlx::query_as::<_, (PageStatus, i64)>(
            "SELECT status, COUNT(*) FROM pages GROUP BY status",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(counts)
    }
}
