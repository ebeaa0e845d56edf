//! Core domain models, storage layer, and event types.
//!
//! Provides the page and site entities, the SQLite repositories that own all
//! mutation of them, the clock abstraction, and the publish event definitions.
//! The delivery crate builds on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{EventHandler, NoOpEventHandler, PublishEvent, TracingEventHandler};
pub use models::{ContentKind, Page, PageId, PageStatus, Site, SiteId};
pub use time::{Clock, RealClock, TestClock};
