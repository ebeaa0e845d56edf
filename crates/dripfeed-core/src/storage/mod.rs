//! Database access layer implementing the repository pattern.
//!
//! The repositories are the only components allowed to mutate pages and
//! sites; everything else issues transition requests through them. Direct
//! SQL outside this module is forbidden so the lifecycle invariants stay in
//! one place.

use std::sync::Arc;

use sqlx::SqlitePool;

pub mod pages;
pub mod sites;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for page lifecycle operations.
    pub pages: Arc<pages::Repository>,

    /// Repository for site registry operations.
    pub sites: Arc<sites::Repository>,
}

impl Storage {
    /// Creates a new storage instance over the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        let pool = Arc::new(pool);

        Self {
            pages: Arc::new(pages::Repository::new(pool.clone())),
            sites: Arc::new(sites::Repository::new(pool)),
        }
    }

    /// Verifies database connectivity with a trivial query.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&*self.pages.pool()).await?;
        Ok(())
    }
}

/// Creates the schema if it does not exist yet.
///
/// All timestamps are written from the application clock, never from SQLite
/// defaults, so stored values always decode as UTC.
///
/// # Errors
///
/// Returns error if any DDL statement fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sites (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            endpoint_url TEXT NOT NULL,
            username TEXT NOT NULL,
            app_password TEXT NOT NULL,
            daily_quota INTEGER NOT NULL,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            max_attempts INTEGER NOT NULL DEFAULT 5,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            site_id INTEGER NOT NULL REFERENCES sites(id),
            kind TEXT NOT NULL CHECK (kind IN ('city', 'topic')),
            parent_id INTEGER REFERENCES pages(id) ON DELETE SET NULL,
            title TEXT NOT NULL,
            slug TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'data_ready', 'content_ready',
                                  'published', 'failed')),
            content_html TEXT,
            failure_count INTEGER NOT NULL DEFAULT 0,
            next_attempt_at TEXT,
            published_at TEXT,
            published_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pages_site_status ON pages(site_id, status)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pages_published ON pages(site_id, published_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}
