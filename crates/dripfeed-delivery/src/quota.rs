//! Daily publish quota accounting.
//!
//! The quota window is the current calendar day in the site's own timezone,
//! so a site configured for `America/New_York` gets its budget back at
//! midnight Eastern rather than midnight UTC. Consumption is derived from
//! publish timestamps already in storage, never from a separate counter, so
//! the quota survives restarts without drift.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use dripfeed_core::{error::Result, models::Site, Clock};
use tracing::warn;

use crate::storage::DispatchStorage;

/// Tracks per-site publish counts against the daily quota window.
pub struct QuotaTracker {
    storage: Arc<dyn DispatchStorage>,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    /// Creates a tracker backed by the given storage and clock.
    pub fn new(storage: Arc<dyn DispatchStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Counts pages published to the site within its current quota window.
    ///
    /// # Errors
    ///
    /// Returns error if the storage query fails.
    pub async fn published_in_window(&self, site: &Site) -> Result<i64> {
        let now = self.clock.now_utc();
        let since = window_start(&site.timezone, now);
        self.storage.count_published_since(site.id, since).await
    }
}

/// Start of the current quota window: local midnight in the site's timezone,
/// expressed in UTC.
///
/// An unrecognized timezone name falls back to UTC with a warning rather
/// than stalling the site. When a DST transition removes local midnight,
/// the naive date at UTC is used instead.
pub fn window_start(timezone: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone, "unrecognized timezone name, using UTC for quota window");
            Tz::UTC
        },
    };

    let local_date = now.with_timezone(&tz).date_naive();
    let local_midnight = local_date.and_hms_opt(0, 0, 0).unwrap_or_default();

    match tz.from_local_datetime(&local_midnight).earliest() {
        Some(start) => start.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&local_midnight),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn utc_window_starts_at_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 0).unwrap();
        let start = window_start("UTC", now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn window_follows_site_local_day_not_utc_day() {
        // 03:00 UTC is still the previous evening in New York
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap();
        let start = window_start("America/New_York", now);

        // Local midnight of Jan 14 Eastern is 05:00 UTC on Jan 14
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 1, 14, 5, 0, 0).unwrap());
    }

    #[test]
    fn window_accounts_for_daylight_saving_offset() {
        // Mid-July: Eastern is UTC-4, not UTC-5
        let now = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();
        let start = window_start("America/New_York", now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 7, 15, 4, 0, 0).unwrap());
    }

    #[test]
    fn unrecognized_timezone_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 0).unwrap();
        let start = window_start("Mars/Olympus_Mons", now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn skipped_local_midnight_still_yields_a_window() {
        // America/Santiago springs forward at midnight, so 00:00 local does
        // not exist on the transition day. The window must still resolve.
        let now = Utc.with_ymd_and_hms(2024, 9, 8, 12, 0, 0).unwrap();
        let start = window_start("America/Santiago", now);
        assert!(start <= now);
    }
}
