//! Event sink for dispatch outcomes.
//!
//! The dispatch cycle reports every attempt, skip, and cycle summary as a
//! [`PublishEvent`] through an [`EventHandler`] passed in explicitly. This
//! replaces ambient global log state: observers are wired at construction
//! time and can be swapped for recording handlers in tests.

use std::{future::Future, pin::Pin};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PageId, SiteId};

/// Events emitted by the dispatch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PublishEvent {
    /// A page went live on its destination site.
    PagePublished(PagePublishedEvent),

    /// A delivery attempt failed; the page stays eligible unless attempts
    /// are exhausted.
    PublishFailed(PublishFailedEvent),

    /// A site was skipped this cycle without touching any page.
    SiteSkipped(SiteSkippedEvent),

    /// A full dispatch cycle finished.
    CycleCompleted(CycleCompletedEvent),
}

/// Emitted when a delivery succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePublishedEvent {
    /// Page that was published.
    pub page_id: PageId,
    /// Destination site.
    pub site_id: SiteId,
    /// Locator assigned by the destination, verbatim.
    pub published_url: String,
    /// When the publish was recorded.
    pub published_at: DateTime<Utc>,
    /// Attempt number that succeeded (1-based).
    pub attempt_number: u32,
}

/// Emitted when a delivery attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishFailedEvent {
    /// Page whose delivery failed.
    pub page_id: PageId,
    /// Destination site.
    pub site_id: SiteId,
    /// Failure description from the publish client.
    pub error_message: String,
    /// Attempt number that failed (1-based).
    pub attempt_number: u32,
    /// Whether the page was marked terminally failed.
    pub exhausted: bool,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
}

/// Reason a site was skipped in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Daily quota already reached.
    Quota,
    /// No delivery-eligible page for the site.
    Empty,
}

/// Emitted when a site is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSkippedEvent {
    /// Site that was skipped.
    pub site_id: SiteId,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Emitted once per completed cycle with summary counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleCompletedEvent {
    /// Deliveries attempted.
    pub attempted: usize,
    /// Deliveries that succeeded.
    pub published: usize,
    /// Deliveries that failed.
    pub failed: usize,
    /// Sites skipped (quota or empty).
    pub skipped: usize,
    /// When the cycle finished.
    pub finished_at: DateTime<Utc>,
}

/// Handler for dispatch events.
///
/// Implementations must be cheap and non-blocking relative to the dispatch
/// path; the cycle awaits each event inline.
pub trait EventHandler: Send + Sync {
    /// Handles a single event.
    fn handle_event(&self, event: PublishEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Handler that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn handle_event(&self, _event: PublishEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Handler that emits one structured tracing line per event.
///
/// This is the production sink: operators observe outcomes through these
/// lines plus the store's status distribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventHandler;

impl EventHandler for TracingEventHandler {
    fn handle_event(&self, event: PublishEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        match event {
            PublishEvent::PagePublished(e) => {
                tracing::info!(
                    page_id = %e.page_id,
                    site_id = %e.site_id,
                    url = %e.published_url,
                    attempt = e.attempt_number,
                    "page published"
                );
            },
            PublishEvent::PublishFailed(e) => {
                tracing::warn!(
                    page_id = %e.page_id,
                    site_id = %e.site_id,
                    attempt = e.attempt_number,
                    exhausted = e.exhausted,
                    error = %e.error_message,
                    "publish failed"
                );
            },
            PublishEvent::SiteSkipped(e) => {
                tracing::info!(site_id = %e.site_id, reason = ?e.reason, "site skipped");
            },
            PublishEvent::CycleCompleted(e) => {
                tracing::info!(
                    attempted = e.attempted,
                    published = e.published,
                    failed = e.failed,
                    skipped = e.skipped,
                    "dispatch cycle completed"
                );
            },
        }
        Box::pin(async {})
    }
}
