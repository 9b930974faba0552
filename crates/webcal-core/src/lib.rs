//! Core types: subscriptions, refresh intervals, cached objects, tracing

pub mod interval;
pub mod object;
pub mod subscription;
pub mod tracing;

pub use interval::{IntervalParseError, RefreshInterval};
pub use object::CachedCalendarObject;
pub use subscription::{StripRules, Subscription, SubscriptionError};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
