//! Drip-publishing delivery engine.
//!
//! This crate implements the dispatch side of the system: it walks the site
//! registry on a fixed cadence, selects at most one content-ready page per
//! site per cycle, pushes it to the site's CMS over HTTP, and records the
//! outcome durably.
//!
//! # Architecture
//!
//! A single [`Scheduler`] drives one [`DispatchCycle`] per interval. Each
//! cycle visits every active site once:
//!
//! 1. **Quota Check** - Count pages published in the site's local day
//! 2. **Selection** - Pick the oldest eligible page, parents before children
//! 3. **HTTP Delivery** - Create the page at the destination CMS
//! 4. **Recording** - Persist the locator on success, backoff on failure
//!
//! # Key Properties
//!
//! - **Bounded Rate** - At most one publish per site per cycle, capped by a
//!   per-site daily quota in the site's own timezone
//! - **No Overlap** - A tick that fires while a cycle is in flight is dropped
//! - **Failure Containment** - One misbehaving destination never stalls the
//!   walk over the remaining sites
//! - **Bounded Retries** - Exponential backoff with jitter until the site's
//!   attempt budget runs out
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use dripfeed_core::{NoOpEventHandler, RealClock};
//! use dripfeed_delivery::{
//!     ClientConfig, CycleConfig, DispatchCycle, PublishClient, Scheduler, SqliteDispatchStorage,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(storage: Arc<dripfeed_core::storage::Storage>) -> anyhow::Result<()> {
//! let clock = Arc::new(RealClock);
//! let client = Arc::new(PublishClient::new(ClientConfig::default())?);
//! let cycle = Arc::new(DispatchCycle::new(
//!     Arc::new(SqliteDispatchStorage::new(storage)),
//!     client,
//!     CycleConfig::default(),
//!     clock.clone(),
//!     Arc::new(NoOpEventHandler),
//! ));
//!
//! let scheduler =
//!     Scheduler::new(cycle, Duration::from_secs(3600), clock, CancellationToken::new());
//! scheduler.run().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod cycle;
pub mod error;
pub mod quota;
pub mod retry;
pub mod scheduler;
pub mod storage;

// Re-export main public API
pub use client::{ClientConfig, PublishClient, PublishedPage};
pub use cycle::{CycleConfig, CycleReport, DispatchCycle, Outcome, SiteOutcome};
pub use error::{FailureKind, PublishError, Result};
pub use quota::QuotaTracker;
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::Scheduler;
pub use storage::{DispatchStorage, SqliteDispatchStorage};

/// Default interval between dispatch cycles in seconds.
pub const DEFAULT_CYCLE_INTERVAL_SECONDS: u64 = 3600;

/// Default pause after each successful publish in seconds.
pub const DEFAULT_PACING_DELAY_SECONDS: u64 = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
