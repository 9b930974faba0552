//! Cached calendar objects.

use serde::{Deserialize, Serialize};

/// One fetched-and-normalized feed body, attached to a subscription.
///
/// At most the objects produced by the most recent successful fetch exist
/// for a subscription: the reconciler purges all prior objects before
/// inserting a new one (replace, not merge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCalendarObject {
    /// The owning subscription id.
    pub subscription_id: i64,
    /// Generated object URI: a random token plus an `.ics` suffix.
    pub uri: String,
    /// The serialized iCalendar payload.
    pub calendar_data: String,
}

impl CachedCalendarObject {
    /// Creates a cached object.
    pub fn new(
        subscription_id: i64,
        uri: impl Into<String>,
        calendar_data: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id,
            uri: uri.into(),
            calendar_data: calendar_data.into(),
        }
    }
}
