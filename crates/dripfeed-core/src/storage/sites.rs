//! Repository for the site registry.
//!
//! Sites are created by management tooling before any page references them;
//! the dispatcher only ever lists and reads them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::Result,
    models::{NewSite, Site, SiteId},
};

const SITE_COLUMNS: &str = "id, name, endpoint_url, username, app_password, daily_quota, \
                            timezone, max_attempts, is_active, created_at, updated_at";

/// Repository for site database operations.
pub struct Repository {
    pool: Arc<SqlitePool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Registers a new site.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or the name is already taken.
    pub async fn create(&self, site: &NewSite, now: DateTime<Utc>) -> Result<SiteId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sites (name, endpoint_url, username, app_password, daily_quota,
                               timezone, max_attempts, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&site.name)
        .bind(&site.endpoint_url)
        .bind(&site.username)
        .bind(&site.app_password)
        .bind(site.daily_quota)
        .bind(&site.timezone)
        .bind(site.max_attempts)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(SiteId(id))
    }

    /// Lists active sites in registry order (ascending id).
    ///
    /// The dispatcher visits sites in exactly this order every cycle, so
    /// publish order is deterministic given the same store state.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE is_active = 1 ORDER BY id ASC"
        ))
        .fetch_all(&*self.pool)
        .await?;

        Ok(sites)
    }

    /// Finds a site by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, site_id: SiteId) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE id = ?"
        ))
        .bind(site_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(site)
    }

    /// Activates or deactivates a site.
    ///
    /// Deactivation stops future dispatch for the site; its pages are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn set_active(
        &self,
        site_id: SiteId,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE sites SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now)
            .bind(site_id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }
}
