//! Integration tests for the page and site repositories.
//!
//! Runs against an in-memory SQLite database, exercising the lifecycle
//! transitions the dispatcher depends on: FIFO selection, publish guards,
//! retry bookkeeping, and quota counting.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dripfeed_core::{
    models::{ContentKind, NewPage, NewSite, PageId, SiteId},
    storage::{run_migrations, Storage},
    CoreError, PageStatus,
};
use sqlx::SqlitePool;

async fn setup() -> Result<Storage> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    run_migrations(&pool).await?;
    Ok(Storage::new(pool))
}

async fn create_site(storage: &Storage, name: &str, now: DateTime<Utc>) -> Result<SiteId> {
    let site = NewSite {
        name: name.to_string(),
        endpoint_url: "https://cms.example".to_string(),
        username: "editor".to_string(),
        app_password: "secret".to_string(),
        daily_quota: 5,
        timezone: "UTC".to_string(),
        max_attempts: 3,
    };
    Ok(storage.sites.create(&site, now).await?)
}

/// Creates a page and walks it to ContentReady.
async fn create_ready_page(
    storage: &Storage,
    site_id: SiteId,
    slug: &str,
    parent_id: Option<PageId>,
    now: DateTime<Utc>,
) -> Result<PageId> {
    let kind = if parent_id.is_some() { ContentKind::Topic } else { ContentKind::City };
    let page_id = storage
        .pages
        .create(
            &NewPage {
                site_id,
                kind,
                parent_id,
                title: slug.replace('-', " "),
                slug: slug.to_string(),
            },
            now,
        )
        .await?;
    storage.pages.set_status(page_id, PageStatus::DataReady, now).await?;
    storage.pages.set_content(page_id, "<html>body</html>", now).await?;
    Ok(page_id)
}

#[tokio::test]
async fn page_walks_full_lifecycle_to_published() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "lifecycle", now).await?;
    let page_id = create_ready_page(&storage, site_id, "rehab-newark", None, now).await?;

    let picked = storage.pages.next_ready(site_id, now).await?.expect("page should be eligible");
    assert_eq!(picked.id, page_id);
    assert_eq!(picked.status, PageStatus::ContentReady);
    assert!(picked.content_html.is_some());

    let published_at = now + Duration::minutes(1);
    storage
        .pages
        .mark_published(page_id, "https://site.example/rehab-newark/", published_at)
        .await?;

    let page = storage.pages.find_by_id(page_id).await?.expect("page exists");
    assert_eq!(page.status, PageStatus::Published);
    assert_eq!(page.published_url.as_deref(), Some("https://site.example/rehab-newark/"));
    assert_eq!(page.published_at, Some(published_at));

    // Published pages leave the ready queue
    assert!(storage.pages.next_ready(site_id, published_at).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn status_never_regresses() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "regress", now).await?;
    let page_id = create_ready_page(&storage, site_id, "no-going-back", None, now).await?;

    let err = storage.pages.set_status(page_id, PageStatus::Pending, now).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));

    let err = storage.pages.set_status(page_id, PageStatus::DataReady, now).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));

    Ok(())
}

#[tokio::test]
async fn publish_transition_is_guarded_against_double_publish() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "double", now).await?;
    let page_id = create_ready_page(&storage, site_id, "once-only", None, now).await?;

    storage.pages.mark_published(page_id, "https://site.example/once-only/", now).await?;

    let err = storage
        .pages
        .mark_published(page_id, "https://site.example/duplicate/", now)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConstraintViolation(_)));

    // Original locator and timestamp untouched
    let page = storage.pages.find_by_id(page_id).await?.expect("page exists");
    assert_eq!(page.published_url.as_deref(), Some("https://site.example/once-only/"));

    Ok(())
}

#[tokio::test]
async fn next_ready_is_fifo_by_creation_then_id() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "fifo", now).await?;

    let older = create_ready_page(&storage, site_id, "older", None, now).await?;
    let newer =
        create_ready_page(&storage, site_id, "newer", None, now + Duration::minutes(5)).await?;

    let picked = storage
        .pages
        .next_ready(site_id, now + Duration::minutes(10))
        .await?
        .expect("one page eligible");
    assert_eq!(picked.id, older);

    // Same created_at: lowest id wins
    let tied = create_ready_page(&storage, site_id, "tied", None, now).await?;
    let picked = storage
        .pages
        .next_ready(site_id, now + Duration::minutes(10))
        .await?
        .expect("one page eligible");
    assert_eq!(picked.id, older, "older id still first among equals");

    storage.pages.mark_published(older, "https://site.example/older/", now).await?;
    let picked = storage
        .pages
        .next_ready(site_id, now + Duration::minutes(10))
        .await?
        .expect("one page eligible");
    assert_eq!(picked.id, tied, "created_at beats insertion id: {newer} is newer");

    Ok(())
}

#[tokio::test]
async fn topic_page_waits_for_published_parent() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "hub-spoke", now).await?;

    let hub = create_ready_page(&storage, site_id, "newark", None, now).await?;
    let spoke =
        create_ready_page(&storage, site_id, "newark-detox", Some(hub), now - Duration::hours(1))
            .await?;

    // Spoke is older but invisible while its hub is unpublished
    let picked = storage.pages.next_ready(site_id, now).await?.expect("hub eligible");
    assert_eq!(picked.id, hub);

    storage.pages.mark_published(hub, "https://site.example/newark/", now).await?;

    let picked = storage.pages.next_ready(site_id, now).await?.expect("spoke now eligible");
    assert_eq!(picked.id, spoke);

    Ok(())
}

#[tokio::test]
async fn retry_backoff_delays_eligibility() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "backoff", now).await?;
    let page_id = create_ready_page(&storage, site_id, "flaky", None, now).await?;

    let retry_at = now + Duration::minutes(30);
    storage.pages.record_failure(page_id, 1, Some(retry_at), now).await?;

    let page = storage.pages.find_by_id(page_id).await?.expect("page exists");
    assert_eq!(page.status, PageStatus::ContentReady, "failure keeps the page retryable");
    assert_eq!(page.failure_count, 1);
    assert!(page.published_at.is_none());

    assert!(storage.pages.next_ready(site_id, now).await?.is_none(), "hidden during backoff");
    let picked = storage.pages.next_ready(site_id, retry_at).await?.expect("eligible again");
    assert_eq!(picked.id, page_id);

    Ok(())
}

#[tokio::test]
async fn exhausted_page_becomes_terminally_failed() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "exhausted", now).await?;
    let page_id = create_ready_page(&storage, site_id, "broken", None, now).await?;

    storage.pages.record_failure(page_id, 3, None, now).await?;

    let page = storage.pages.find_by_id(page_id).await?.expect("page exists");
    assert_eq!(page.status, PageStatus::Failed);
    assert!(page.published_at.is_none());
    assert!(storage.pages.next_ready(site_id, now + Duration::days(1)).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn published_count_respects_window_boundary() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "window", now).await?;

    let yesterday = create_ready_page(&storage, site_id, "old-news", None, now).await?;
    let today = create_ready_page(&storage, site_id, "fresh", None, now).await?;

    let window_start = now - Duration::hours(2);
    storage
        .pages
        .mark_published(yesterday, "https://site.example/old-news/", window_start - Duration::hours(20))
        .await?;
    storage.pages.mark_published(today, "https://site.example/fresh/", now).await?;

    assert_eq!(storage.pages.count_published_since(site_id, window_start).await?, 1);
    assert_eq!(
        storage.pages.count_published_since(site_id, window_start - Duration::days(2)).await?,
        2
    );

    Ok(())
}

#[tokio::test]
async fn deactivated_sites_leave_the_registry_order() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let first = create_site(&storage, "first", now).await?;
    let second = create_site(&storage, "second", now).await?;
    let third = create_site(&storage, "third", now).await?;

    let active: Vec<SiteId> =
        storage.sites.list_active().await?.into_iter().map(|s| s.id).collect();
    assert_eq!(active, vec![first, second, third]);

    storage.sites.set_active(second, false, now).await?;

    let active: Vec<SiteId> =
        storage.sites.list_active().await?.into_iter().map(|s| s.id).collect();
    assert_eq!(active, vec![first, third], "registry order preserved for the rest");

    // Reactivation restores its slot
    storage.sites.set_active(second, true, now).await?;
    let active: Vec<SiteId> =
        storage.sites.list_active().await?.into_iter().map(|s| s.id).collect();
    assert_eq!(active, vec![first, second, third]);

    Ok(())
}

#[tokio::test]
async fn status_counts_report_the_distribution() -> Result<()> {
    let storage = setup().await?;
    let now = Utc::now();
    let site_id = create_site(&storage, "counts", now).await?;

    let pending = NewPage {
        site_id,
        kind: ContentKind::City,
        parent_id: None,
        title: "Pending".to_string(),
        slug: "pending".to_string(),
    };
    storage.pages.create(&pending, now).await?;
    let ready = create_ready_page(&storage, site_id, "ready", None, now).await?;
    let live = create_ready_page(&storage, site_id, "live", None, now).await?;
    storage.pages.mark_published(live, "https://site.example/live/", now).await?;

    let counts = storage.pages.status_counts().await?;
    let get = |status: PageStatus| {
        counts.iter().find(|(s, _)| *s == status).map(|(_, n)| *n).unwrap_or(0)
    };
    assert_eq!(get(PageStatus::Pending), 1);
    assert_eq!(get(PageStatus::ContentReady), 1);
    assert_eq!(get(PageStatus::Published), 1);
    let _ = ready;

    Ok(())
}
