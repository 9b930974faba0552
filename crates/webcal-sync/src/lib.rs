//! Subscription reconciliation.
//!
//! This crate implements the third stage of the subscription refresh
//! pipeline: for each subscription, fetch and normalize the remote feed
//! (via `webcal-feed`), then replace the cached calendar objects in a
//! pluggable store.
//!
//! - [`SubscriptionStore`] / [`CalendarObjectStore`] - object-safe store
//!   traits; [`MemoryStore`] implements both in-process
//! - [`RefreshService`] - the fetch → normalize → purge → insert cycle
//!   with per-subscription failure isolation
//! - [`RefreshScheduler`] - periodic driver with jitter, backoff and a
//!   command channel

pub mod memory;
pub mod refresh;
pub mod report;
pub mod scheduler;
pub mod store;

pub use memory::MemoryStore;
pub use refresh::{FeedSource, RefreshOptions, RefreshService};
pub use report::{RefreshError, RefreshReport, RefreshStatus, Skipped, SubscriptionOutcome};
pub use scheduler::{
    RefreshScheduler, ReportSummary, SchedulerCommand, SchedulerConfig, SchedulerHandle,
    SchedulerState,
};
pub use store::{BoxFuture, CalendarObjectStore, CalendarType, StoreError, SubscriptionStore};
