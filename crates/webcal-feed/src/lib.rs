//! Feed fetching and calendar format normalization.
//!
//! This crate implements the first two stages of the subscription refresh
//! pipeline:
//!
//! - [`FeedFetcher`] - outbound HTTP GET with an SSRF-blocking access
//!   policy and a bounded manual redirect loop
//! - [`normalize_feed`] - parses iCalendar / jCal / xCal payloads into the
//!   canonical [`CalendarDocument`] model and re-serializes to iCalendar
//!   text, applying per-subscription strip rules
//!
//! # Architecture
//!
//! ```text
//!    remote feed URL
//!          │
//!          ▼
//!   ┌──────────────┐   AccessPolicy refuses loopback/private/
//!   │  FeedFetcher │   link-local targets on every redirect hop
//!   └──────┬───────┘
//!          │ FetchedFeed { body, content_type }
//!          ▼
//!   ┌──────────────┐   text/calendar         → ical parser
//!   │ normalize_feed│  application/…+json    → jcal reader
//!   └──────┬───────┘   application/…+xml     → xcal reader
//!          │ CalendarDocument → strip pass → iCalendar text
//!          ▼
//!    NormalizedFeed
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod ical;
pub mod jcal;
pub mod model;
pub mod normalize;
pub mod policy;
pub mod strip;
pub mod xcal;

pub use config::FetcherConfig;
pub use error::{FetchError, FetchErrorKind, FetchResult, NormalizeError};
pub use fetcher::{FeedFetcher, FetchedFeed};
pub use model::{
    Alarm, CalendarDocument, Component, ComponentBody, DateTimeValue, Param, PeriodEnd, Property,
    TimezoneComponent, TimezoneRule, TimezoneRuleKind, Value,
};
pub use normalize::{FeedFormat, NormalizedFeed, normalize_feed};
pub use policy::AccessPolicy;
pub use strip::apply_strip_rules;
