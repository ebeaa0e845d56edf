//! Storage abstraction layer for the dispatch cycle.
//!
//! Provides trait-based abstractions over storage operations to enable
//! testability without database dependencies. Production implementations
//! use the concrete `dripfeed_core::storage::Storage` while tests can
//! provide mock implementations for deterministic behavior validation.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use dripfeed_core::{
    error::Result,
    models::{Page, PageId, PageStatus, Site, SiteId},
};

/// Storage operations required by the dispatch cycle.
///
/// This trait abstracts all database operations needed to select, publish,
/// and account for pages, enabling both the production SQLite implementation
/// and lightweight test doubles. The separation allows testing selection
/// order, quota accounting, and failure handling without database overhead.
pub trait DispatchStorage: Send + Sync + 'static {
    /// Lists active sites in stable registry order.
    fn list_active_sites(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Site>>> + Send + '_>>;

    /// Finds the next page eligible for delivery to a site.
    ///
    /// Pages are ordered oldest-first by creation time with the id as a
    /// tie-break. A page is eligible when its content is ready, any retry
    /// backoff has elapsed, and its parent (if it has one) is published.
    fn next_ready_page(
        &self,
        site_id: SiteId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Page>>> + Send + '_>>;

    /// Counts pages published to a site at or after `since`.
    fn count_published_since(
        &self,
        site_id: SiteId,
        since: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;

    /// Marks a page as published with its destination-assigned locator.
    ///
    /// This is a terminal state. The locator and timestamp are set in the
    /// same write that flips the status, so no published page is ever
    /// observed without them.
    fn mark_published(
        &self,
        page_id: PageId,
        published_url: &str,
        published_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Records a failed delivery attempt.
    ///
    /// With `Some(next_attempt_at)` the page stays eligible and waits out
    /// the backoff. With `None` the page transitions to the terminal failed
    /// state and leaves the delivery pool.
    fn record_failure(
        &self,
        page_id: PageId,
        failure_count: i64,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds the current status of a page.
    ///
    /// Used for verification in tests and monitoring the page lifecycle.
    fn page_status(
        &self,
        page_id: PageId,
    ) -> Pin<Box<dyn Future<Output = Result<PageStatus>> + Send + '_>>;
}

/// Production storage implementation using SQLite.
///
/// Wraps the concrete `dripfeed_core::storage::Storage` to implement the
/// `DispatchStorage` trait. All database operations go through the
/// repository pattern for consistency and type safety.
pub struct SqliteDispatchStorage {
    storage: Arc<dripfeed_core::storage::Storage>,
}

impl SqliteDispatchStorage {
    /// Creates a new SQLite storage adapter.
    pub fn new(storage: Arc<dripfeed_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl DispatchStorage for SqliteDispatchStorage {
    fn list_active_sites(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Site>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.sites.list_active().await })
    }

    fn next_ready_page(
        &self,
        site_id: SiteId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Page>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.pages.next_ready(site_id, now).await })
    }

    fn count_published_since(
        &self,
        site_id: SiteId,
        since: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.pages.count_published_since(site_id, since).await })
    }

    fn mark_published(
        &self,
        page_id: PageId,
        published_url: &str,
        published_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        let published_url = published_url.to_string();
        Box::pin(async move {
            storage.pages.mark_published(page_id, &published_url, published_at).await
        })
    }

    fn record_failure(
        &self,
        page_id: PageId,
        failure_count: i64,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.pages.record_failure(page_id, failure_count, next_attempt_at, now).await
        })
    }

    fn page_status(
        &self,
        page_id: PageId,
    ) -> Pin<Box<dyn Future<Output = Result<PageStatus>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage
                .pages
                .find_by_id(page_id)
                .await?
                .map(|page| page.status)
                .ok_or_else(|| {
                    dripfeed_core::error::CoreError::NotFound(format!("page {page_id} not found"))
                })
        })
    }
}

pub mod mock {
    //! Mock storage implementation for testing.
    //!
    //! Provides deterministic, in-memory storage for testing dispatch logic
    //! without database dependencies. Supports configurable behavior for
    //! simulating various storage conditions.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use chrono::{DateTime, Utc};
    use dripfeed_core::error::Result;
    use tokio::sync::RwLock;

    use super::{DispatchStorage, Page, PageId, PageStatus, Site, SiteId};

    /// Mock storage for testing dispatch logic without a database.
    ///
    /// Stores data in-memory with configurable behavior. Supports injecting
    /// failures, controlling page order, and verifying operations.
    pub struct MockDispatchStorage {
        sites: Arc<RwLock<Vec<Site>>>,
        pages: Arc<RwLock<HashMap<PageId, Page>>>,
        list_error: Arc<RwLock<Option<String>>>,
    }

    impl MockDispatchStorage {
        /// Creates a new mock storage with empty state.
        pub fn new() -> Self {
            Self {
                sites: Arc::new(RwLock::new(Vec::new())),
                pages: Arc::new(RwLock::new(HashMap::new())),
                list_error: Arc::new(RwLock::new(None)),
            }
        }

        /// Registers a site for testing. Sites are listed in insertion order.
        pub async fn add_site(&self, site: Site) {
            self.sites.write().await.push(site);
        }

        /// Adds a page to storage.
        pub async fn add_page(&self, page: Page) {
            self.pages.write().await.insert(page.id, page);
        }

        /// Injects an error for the next site listing.
        pub async fn inject_list_error(&self, error: String) {
            *self.list_error.write().await = Some(error);
        }

        /// Returns a snapshot of a page for verification.
        pub async fn page(&self, page_id: PageId) -> Option<Page> {
            self.pages.read().await.get(&page_id).cloned()
        }

        /// Verifies a page reached the expected status.
        pub async fn verify_page_status(&self, page_id: PageId, expected: PageStatus) -> bool {
            self.pages.read().await.get(&page_id).is_some_and(|p| p.status == expected)
        }
    }

    impl Default for MockDispatchStorage {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DispatchStorage for MockDispatchStorage {
        fn list_active_sites(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Site>>> + Send + '_>> {
            let sites = self.sites.clone();
            let list_error = self.list_error.clone();
            Box::pin(async move {
                let error = list_error.write().await.take();
                if let Some(error) = error {
                    return Err(dripfeed_core::error::CoreError::Database(error));
                }
                Ok(sites.read().await.iter().filter(|s| s.is_active).cloned().collect())
            })
        }

        fn next_ready_page(
            &self,
            site_id: SiteId,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Page>>> + Send + '_>> {
            let pages = self.pages.clone();
            Box::pin(async move {
                let pages = pages.read().await;
                let mut eligible: Vec<&Page> = pages
                    .values()
                    .filter(|p| p.site_id == site_id && p.status == PageStatus::ContentReady)
                    .filter(|p| p.next_attempt_at.is_none_or(|at| at <= now))
                    .filter(|p| match p.parent_id {
                        None => true,
                        Some(parent_id) => pages
                            .get(&parent_id)
                            .is_some_and(|parent| parent.status == PageStatus::Published),
                    })
                    .collect();
                eligible.sort_by_key(|p| (p.created_at, p.id.0));
                Ok(eligible.first().map(|p| (*p).clone()))
            })
        }

        fn count_published_since(
            &self,
            site_id: SiteId,
            since: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
            let pages = self.pages.clone();
            Box::pin(async move {
                let count = pages
                    .read()
                    .await
                    .values()
                    .filter(|p| p.site_id == site_id && p.status == PageStatus::Published)
                    .filter(|p| p.published_at.is_some_and(|at| at >= since))
                    .count();
                Ok(count as i64)
            })
        }

        fn mark_published(
            &self,
            page_id: PageId,
            published_url: &str,
            published_at: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let pages = self.pages.clone();
            let published_url = published_url.to_string();
            Box::pin(async move {
                if let Some(page) = pages.write().await.get_mut(&page_id) {
                    page.status = PageStatus::Published;
                    page.published_at = Some(published_at);
                    page.published_url = Some(published_url);
                    page.next_attempt_at = None;
                    page.updated_at = published_at;
                }
                Ok(())
            })
        }

        fn record_failure(
            &self,
            page_id: PageId,
            failure_count: i64,
            next_attempt_at: Option<DateTime<Utc>>,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let pages = self.pages.clone();
            Box::pin(async move {
                if let Some(page) = pages.write().await.get_mut(&page_id) {
                    page.failure_count = failure_count;
                    page.next_attempt_at = next_attempt_at;
                    page.updated_at = now;
                    if next_attempt_at.is_none() {
                        page.status = PageStatus::Failed;
                    }
                }
                Ok(())
            })
        }

        fn page_status(
            &self,
            page_id: PageId,
        ) -> Pin<Box<dyn Future<Output = Result<PageStatus>> + Send + '_>> {
            let pages = self.pages.clone();
            Box::pin(async move {
                pages.read().await.get(&page_id).map(|p| p.status).ok_or_else(|| {
                    dripfeed_core::error::CoreError::NotFound(format!("page {page_id} not found"))
                })
            })
        }
    }
}
