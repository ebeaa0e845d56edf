//! Interval scheduler for dispatch cycles.
//!
//! Runs one dispatch cycle per interval. Cycles never overlap: if a slow
//! cycle is still in flight when the next tick fires, that tick is dropped
//! rather than queued. The cadence comes from the interval alone; there is
//! no catch-up after a long cycle.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use dripfeed_core::Clock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    cycle::{CycleReport, DispatchCycle},
    error::Result,
};

/// Drives dispatch cycles on a fixed interval until cancelled.
pub struct Scheduler {
    cycle: Arc<DispatchCycle>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
    in_flight: Arc<AtomicBool>,
}

impl Scheduler {
    /// Creates a scheduler running `cycle` every `interval`.
    pub fn new(
        cycle: Arc<DispatchCycle>,
        interval: Duration,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            cycle,
            interval,
            clock,
            cancellation_token,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the tick loop until the cancellation token fires.
    ///
    /// The first cycle runs after one full interval, not immediately, so a
    /// restart loop cannot turn into a publish burst.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                () = self.clock.sleep(self.interval) => {},
                () = self.cancellation_token.cancelled() => break,
            }

            match self.tick().await {
                Ok(Some(report)) => {
                    debug!(
                        published = report.published(),
                        failed = report.failed(),
                        "scheduled cycle finished"
                    );
                },
                Ok(None) => {
                    warn!("previous cycle still in flight, tick dropped");
                },
                Err(error) => {
                    error!(error = %error, "scheduled cycle failed");
                },
            }
        }

        info!("scheduler stopped");
    }

    /// Runs one cycle unless another is already in flight.
    ///
    /// Returns `Ok(None)` when the tick was dropped because of an
    /// in-flight cycle.
    ///
    /// # Errors
    ///
    /// Returns error if the cycle itself fails before visiting any site.
    pub async fn tick(&self) -> Result<Option<CycleReport>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }

        let result = self.cycle.run_cycle().await;
        self.in_flight.store(false, Ordering::Release);

        result.map(Some)
    }
}
