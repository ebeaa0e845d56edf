//! Core domain models and strongly-typed identifiers.
//!
//! Defines pages, sites, and newtype ID wrappers for compile-time type
//! safety. Includes the page lifecycle status with its transition rules.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Strongly-typed page identifier.
///
/// Wraps the store's rowid. Ids are assigned in insertion order, which is
/// what the dispatcher's FIFO tie-break relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct PageId(pub i64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Strongly-typed site identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct SiteId(pub i64);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SiteId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Page lifecycle status.
///
/// Pages progress monotonically through these states:
///
/// ```text
/// Pending -> DataReady -> ContentReady -> Published
///                                      -> Failed (after max attempts)
/// ```
///
/// `Published` and `Failed` are terminal. Only `ContentReady` pages are
/// eligible for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PageStatus {
    /// Imported but not yet enriched with search/entity data.
    Pending,

    /// Enrichment data attached, content not yet generated.
    DataReady,

    /// Rendered HTML attached and waiting for a dispatch slot.
    ContentReady,

    /// Live on the destination site. Terminal.
    Published,

    /// Delivery attempts exhausted. Terminal.
    Failed,
}

impl PageStatus {
    /// Whether moving to `next` is a legal forward transition.
    ///
    /// Status never regresses and terminal states never move.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::DataReady)
                | (Self::DataReady, Self::ContentReady)
                | (Self::ContentReady, Self::Published)
                | (Self::ContentReady, Self::Failed)
        )
    }

    /// True for `Published` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::DataReady => write!(f, "data_ready"),
            Self::ContentReady => write!(f, "content_ready"),
            Self::Published => write!(f, "published"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Kind of content a page carries.
///
/// Closed set consumed by the content-construction stages; replaces the
/// string comparisons the upstream pipeline used to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ContentKind {
    /// Location hub page (city-level resource guide).
    City,

    /// Topic spoke page, optionally parented to a city hub.
    Topic,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City => write!(f, "city"),
            Self::Topic => write!(f, "topic"),
        }
    }
}

/// One unit of content progressing from import to a live URL.
///
/// The store exclusively owns mutation of pages; the dispatcher only issues
/// transition requests through the repositories.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    /// Unique identifier for this page.
    pub id: PageId,

    /// Site this page will be published to.
    pub site_id: SiteId,

    /// Content kind (city hub or topic spoke).
    pub kind: ContentKind,

    /// Parent hub page, resolved at insert time.
    ///
    /// A topic page carrying a parent is not delivery-eligible until the
    /// parent is published.
    pub parent_id: Option<PageId>,

    /// Page title carried to the destination.
    pub title: String,

    /// URL slug carried to the destination.
    pub slug: String,

    /// Current lifecycle status.
    pub status: PageStatus,

    /// Rendered HTML, present once status reaches `ContentReady`.
    pub content_html: Option<String>,

    /// Number of failed delivery attempts so far.
    pub failure_count: i64,

    /// Earliest time the next delivery attempt may run (retry backoff).
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// When the page went live. Set exactly once, with `published_url`.
    pub published_at: Option<DateTime<Utc>>,

    /// Destination-assigned locator. Set exactly once, with `published_at`.
    pub published_url: Option<String>,

    /// When the page was first imported.
    pub created_at: DateTime<Utc>,

    /// When the page was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a new page.
#[derive(Debug, Clone)]
pub struct NewPage {
    /// Site the page belongs to.
    pub site_id: SiteId,
    /// Content kind.
    pub kind: ContentKind,
    /// Parent hub, already resolved to an id by the importer.
    pub parent_id: Option<PageId>,
    /// Page title.
    pub title: String,
    /// URL slug.
    pub slug: String,
}

/// A publishing destination: one CMS backend with its own credentials and
/// drip quota.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Site {
    /// Unique identifier for this site.
    pub id: SiteId,

    /// Human-readable site name.
    pub name: String,

    /// Base URL of the destination CMS.
    pub endpoint_url: String,

    /// CMS account username.
    pub username: String,

    /// CMS application password. Opaque to the core; only the publish
    /// client reads it.
    pub app_password: String,

    /// Maximum publishes allowed per day window.
    pub daily_quota: i64,

    /// IANA timezone anchoring the quota window (e.g. `America/New_York`).
    pub timezone: String,

    /// Delivery attempts per page before it is marked `Failed`.
    pub max_attempts: i64,

    /// Whether this site participates in dispatch cycles.
    ///
    /// Deactivation stops future dispatch but does not alter existing pages.
    pub is_active: bool,

    /// When this site was registered.
    pub created_at: DateTime<Utc>,

    /// When this site was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a new site.
#[derive(Debug, Clone)]
pub struct NewSite {
    /// Human-readable site name.
    pub name: String,
    /// Base URL of the destination CMS.
    pub endpoint_url: String,
    /// CMS account username.
    pub username: String,
    /// CMS application password.
    pub app_password: String,
    /// Maximum publishes per day window.
    pub daily_quota: i64,
    /// IANA timezone for the quota window.
    pub timezone: String,
    /// Delivery attempts per page before terminal failure.
    pub max_attempts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_move_forward_only() {
        assert!(PageStatus::Pending.can_transition_to(PageStatus::DataReady));
        assert!(PageStatus::DataReady.can_transition_to(PageStatus::ContentReady));
        assert!(PageStatus::ContentReady.can_transition_to(PageStatus::Published));
        assert!(PageStatus::ContentReady.can_transition_to(PageStatus::Failed));

        // No regressions or skips
        assert!(!PageStatus::DataReady.can_transition_to(PageStatus::Pending));
        assert!(!PageStatus::Pending.can_transition_to(PageStatus::ContentReady));
        assert!(!PageStatus::Pending.can_transition_to(PageStatus::Published));

        // Terminal states never move
        assert!(!PageStatus::Published.can_transition_to(PageStatus::ContentReady));
        assert!(!PageStatus::Failed.can_transition_to(PageStatus::ContentReady));
        assert!(PageStatus::Published.is_terminal());
        assert!(PageStatus::Failed.is_terminal());
    }

    #[test]
    fn status_display_matches_stored_form() {
        assert_eq!(PageStatus::ContentReady.to_string(), "content_ready");
        assert_eq!(PageStatus::Published.to_string(), "published");
        assert_eq!(ContentKind::City.to_string(), "city");
    }
}
