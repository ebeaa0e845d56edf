//! Dispatch cycle orchestration.
//!
//! A cycle walks every active site once, in registry order, and publishes at
//! most one page per site. Quota is checked before selection, so a site that
//! exhausted its daily budget is skipped without touching its queue. Failures
//! are contained per site: one destination misbehaving never stops the walk.

use std::{sync::Arc, time::Duration};

use dripfeed_core::{
    events::{
        CycleCompletedEvent, PagePublishedEvent, PublishEvent, PublishFailedEvent, SiteSkippedEvent,
        SkipReason,
    },
    models::{Page, PageId, Site, SiteId},
    Clock, EventHandler,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    client::PublishClient,
    error::{PublishError, Result},
    quota::QuotaTracker,
    retry::{RetryDecision, RetryPolicy},
    storage::DispatchStorage,
};

/// Configuration for a dispatch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Pause after each successful publish, spacing requests out so a run
    /// of publishes does not hit destinations back to back.
    pub pacing_delay: Duration,

    /// Backoff schedule applied to failed delivery attempts.
    pub retry_policy: RetryPolicy,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { pacing_delay: Duration::from_secs(10), retry_policy: RetryPolicy::default() }
    }
}

/// What happened at a single site during one cycle.
#[derive(Debug)]
pub enum Outcome {
    /// A page was delivered and recorded as published.
    Published {
        /// The page that was published.
        page_id: PageId,
        /// Destination-assigned locator.
        url: String,
    },
    /// A delivery attempt failed; the page stays queued or leaves the pool.
    Failed {
        /// The page whose delivery failed.
        page_id: PageId,
        /// The classified failure.
        error: PublishError,
    },
    /// The site already used its daily budget.
    SkippedQuota {
        /// Pages published within the current window.
        published_today: i64,
        /// The site's configured daily quota.
        quota: i64,
    },
    /// The site had no eligible page.
    SkippedEmpty,
    /// The site could not be processed at all, before any delivery attempt.
    Faulted {
        /// The underlying error.
        error: PublishError,
    },
}

/// Per-site result of one cycle.
#[derive(Debug)]
pub struct SiteOutcome {
    /// The site this outcome belongs to.
    pub site_id: SiteId,
    /// What happened at the site.
    pub outcome: Outcome,
}

/// Summary of one completed dispatch cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// One entry per active site, in the order they were visited.
    pub outcomes: Vec<SiteOutcome>,
}

impl CycleReport {
    /// Number of sites where a delivery was attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Published { .. } | Outcome::Failed { .. }))
            .count()
    }

    /// Number of pages published this cycle.
    pub fn published(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o.outcome, Outcome::Published { .. })).count()
    }

    /// Number of failed delivery attempts this cycle.
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. } | Outcome::Faulted { .. }))
            .count()
    }

    /// Number of sites skipped for quota or an empty queue.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::SkippedQuota { .. } | Outcome::SkippedEmpty))
            .count()
    }
}

/// Runs one drip-publishing pass over all active sites.
pub struct DispatchCycle {
    storage: Arc<dyn DispatchStorage>,
    client: Arc<PublishClient>,
    quota: QuotaTracker,
    config: CycleConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
}

impl DispatchCycle {
    /// Creates a dispatch cycle over the given storage and client.
    pub fn new(
        storage: Arc<dyn DispatchStorage>,
        client: Arc<PublishClient>,
        config: CycleConfig,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        let quota = QuotaTracker::new(storage.clone(), clock.clone());
        Self { storage, client, quota, config, clock, events }
    }

    /// Visits every active site once and publishes at most one page each.
    ///
    /// Per-site failures are recorded in the report and never abort the
    /// walk. The pacing delay runs only after a successful publish.
    ///
    /// # Errors
    ///
    /// Returns error only if the site registry itself cannot be listed.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let sites = self.storage.list_active_sites().await?;
        debug!(site_count = sites.len(), "starting dispatch cycle");

        let mut report = CycleReport::default();

        for site in &sites {
            let outcome = match self.dispatch_site(site).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(site_id = %site.id, error = %e, "site could not be processed");
                    Outcome::Faulted { error: e }
                },
            };

            let pace = matches!(outcome, Outcome::Published { .. });
            report.outcomes.push(SiteOutcome { site_id: site.id, outcome });

            if pace {
                self.clock.sleep(self.config.pacing_delay).await;
            }
        }

        info!(
            sites = sites.len(),
            attempted = report.attempted(),
            published = report.published(),
            failed = report.failed(),
            skipped = report.skipped(),
            "dispatch cycle completed"
        );

        self.events
            .handle_event(PublishEvent::CycleCompleted(CycleCompletedEvent {
                attempted: report.attempted(),
                published: report.published(),
                failed: report.failed(),
                skipped: report.skipped(),
                finished_at: self.clock.now_utc(),
            }))
            .await;

        Ok(report)
    }

    /// Processes one site: quota check, page selection, delivery, recording.
    async fn dispatch_site(&self, site: &Site) -> Result<Outcome> {
        let published_today = self.quota.published_in_window(site).await?;
        if published_today >= site.daily_quota {
            debug!(
                site_id = %site.id,
                published_today,
                quota = site.daily_quota,
                "daily quota reached, skipping site"
            );
            self.emit_skip(site.id, SkipReason::Quota).await;
            return Ok(Outcome::SkippedQuota { published_today, quota: site.daily_quota });
        }

        let now = self.clock.now_utc();
        let Some(page) = self.storage.next_ready_page(site.id, now).await? else {
            debug!(site_id = %site.id, "no eligible page, skipping site");
            self.emit_skip(site.id, SkipReason::Empty).await;
            return Ok(Outcome::SkippedEmpty);
        };

        let attempt_number = attempt_number(&page);
        match self.client.publish(&page, site).await {
            Ok(published) => {
                let published_at = self.clock.now_utc();
                if let Err(e) =
                    self.storage.mark_published(page.id, &published.url, published_at).await
                {
                    // The remote page exists but the local record does not
                    // reflect it. Surface the locator so the operator can
                    // reconcile by hand.
                    error!(
                        page_id = %page.id,
                        site_id = %site.id,
                        url = %published.url,
                        error = %e,
                        "page published remotely but could not be recorded"
                    );
                    return Err(e.into());
                }

                info!(
                    page_id = %page.id,
                    site_id = %site.id,
                    url = %published.url,
                    attempt = attempt_number,
                    "page published"
                );

                self.events
                    .handle_event(PublishEvent::PagePublished(PagePublishedEvent {
                        page_id: page.id,
                        site_id: site.id,
                        published_url: published.url.clone(),
                        published_at,
                        attempt_number,
                    }))
                    .await;

                Ok(Outcome::Published { page_id: page.id, url: published.url })
            },
            Err(e) => {
                let failed_at = self.clock.now_utc();
                let failure_count = page.failure_count + 1;
                let max_attempts = u32::try_from(site.max_attempts).unwrap_or(u32::MAX);

                let decision =
                    self.config.retry_policy.decide_retry(attempt_number, max_attempts, failed_at);
                let exhausted = match decision {
                    RetryDecision::Retry { next_attempt_at } => {
                        warn!(
                            page_id = %page.id,
                            site_id = %site.id,
                            error = %e,
                            attempt = attempt_number,
                            next_attempt_at = %next_attempt_at,
                            "delivery failed, retry scheduled"
                        );
                        self.storage
                            .record_failure(page.id, failure_count, Some(next_attempt_at), failed_at)
                            .await?;
                        false
                    },
                    RetryDecision::GiveUp { reason } => {
                        warn!(
                            page_id = %page.id,
                            site_id = %site.id,
                            error = %e,
                            attempt = attempt_number,
                            reason,
                            "delivery failed permanently"
                        );
                        self.storage
                            .record_failure(page.id, failure_count, None, failed_at)
                            .await?;
                        true
                    },
                };

                self.events
                    .handle_event(PublishEvent::PublishFailed(PublishFailedEvent {
                        page_id: page.id,
                        site_id: site.id,
                        error_message: e.to_string(),
                        attempt_number,
                        exhausted,
                        failed_at,
                    }))
                    .await;

                Ok(Outcome::Failed { page_id: page.id, error: e })
            },
        }
    }

    async fn emit_skip(&self, site_id: SiteId, reason: SkipReason) {
        self.events
            .handle_event(PublishEvent::SiteSkipped(SiteSkippedEvent { site_id, reason }))
            .await;
    }
}

/// The 1-based attempt number the next delivery of this page will be.
fn attempt_number(page: &Page) -> u32 {
    u32::try_from(page.failure_count).unwrap_or(u32::MAX).saturating_add(1)
}
