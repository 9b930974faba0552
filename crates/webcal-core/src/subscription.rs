//! Subscription records.
//!
//! A [`Subscription`] is a user-configured pointer to a remote calendar
//! feed: the source URL plus refresh and strip policy. The loosely-typed
//! property bags of DAV subscription storage become named, typed fields
//! here, validated once at the store boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interval::RefreshInterval;

/// Which component types to strip from a fetched feed before caching.
///
/// Mirrors the calendarserver.org `subscribed-strip-*` subscription
/// properties. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripRules {
    /// Drop VTODO components.
    pub todos: bool,
    /// Drop VALARM subcomponents.
    pub alarms: bool,
    /// Drop inline binary ATTACH properties.
    pub attachments: bool,
}

impl StripRules {
    /// Creates rules with everything kept.
    pub fn keep_all() -> Self {
        Self::default()
    }

    /// Builder: strip todos.
    pub fn with_todos(mut self, strip: bool) -> Self {
        self.todos = strip;
        self
    }

    /// Builder: strip alarms.
    pub fn with_alarms(mut self, strip: bool) -> Self {
        self.alarms = strip;
        self
    }

    /// Builder: strip binary attachments.
    pub fn with_attachments(mut self, strip: bool) -> Self {
        self.attachments = strip;
        self
    }

    /// Returns true if no rule is active.
    pub fn is_noop(&self) -> bool {
        !(self.todos || self.alarms || self.attachments)
    }
}

/// Error returned when a subscription record is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The subscription has no source URL.
    #[error("subscription {uri:?} has an empty source URL")]
    EmptySource {
        /// The subscription URI.
        uri: String,
    },
    /// The subscription URI itself is empty.
    #[error("subscription has an empty URI")]
    EmptyUri,
}

/// A calendar feed subscription.
///
/// Identity is the opaque store id plus a URI unique per principal. The
/// reconciler only ever updates `last_refreshed`; creation and deletion
/// are user actions handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Opaque store identifier.
    pub id: i64,
    /// The owning principal (e.g. `principals/users/alice`).
    pub principal: String,
    /// Subscription URI, unique per principal.
    pub uri: String,
    /// The remote feed source URL.
    pub source: String,
    /// How often the feed should be refreshed.
    pub refresh_interval: RefreshInterval,
    /// Component stripping policy.
    pub strip: StripRules,
    /// When the feed was last successfully refreshed.
    pub last_refreshed: Option<DateTime<Utc>>,
    /// Human-readable display name.
    pub display_name: Option<String>,
}

impl Subscription {
    /// Creates a subscription with defaults for the optional fields.
    pub fn new(
        id: i64,
        principal: impl Into<String>,
        uri: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id,
            principal: principal.into(),
            uri: uri.into(),
            source: source.into(),
            refresh_interval: RefreshInterval::default(),
            strip: StripRules::default(),
            last_refreshed: None,
            display_name: None,
        }
    }

    /// Builder: set the refresh interval.
    pub fn with_refresh_interval(mut self, interval: RefreshInterval) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Builder: set the strip rules.
    pub fn with_strip(mut self, strip: StripRules) -> Self {
        self.strip = strip;
        self
    }

    /// Builder: set the last refreshed timestamp.
    pub fn with_last_refreshed(mut self, at: DateTime<Utc>) -> Self {
        self.last_refreshed = Some(at);
        self
    }

    /// Builder: set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Validates the structural invariants of the record.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] when the URI or source is empty.
    /// Stores should call this before handing records to the reconciler.
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.uri.trim().is_empty() {
            return Err(SubscriptionError::EmptyUri);
        }
        if self.source.trim().is_empty() {
            return Err(SubscriptionError::EmptySource {
                uri: self.uri.clone(),
            });
        }
        Ok(())
    }

    /// Returns true if a refresh is due at `now`.
    ///
    /// A never-refreshed subscription is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_refreshed {
            None => true,
            Some(last) => now - last >= self.refresh_interval.as_duration(),
        }
    }
}
