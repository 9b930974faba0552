//! Store traits for subscriptions and cached calendar objects.
//!
//! The traits are object safe via [`BoxFuture`], so the refresh service
//! can hold `Arc<dyn SubscriptionStore>` handles and durable backends
//! can be plugged in without touching the reconciler.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;
use webcal_core::{CachedCalendarObject, Subscription};

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which kind of calendar a cached object belongs to.
///
/// Subscription caches live alongside regular calendars in object
/// storage; the discriminator keeps purges from touching user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarType {
    /// A regular user calendar.
    Calendar = 0,
    /// A read-only subscription cache.
    Subscription = 1,
}

impl CalendarType {
    /// The integer discriminator used by storage backends.
    pub fn as_int(&self) -> i64 {
        *self as i64
    }
}

/// An error from a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No subscription matches the given principal and URI.
    #[error("no subscription {uri:?} for principal {principal:?}")]
    SubscriptionNotFound {
        /// The owning principal.
        principal: String,
        /// The subscription URI.
        uri: String,
    },

    /// No subscription has the given id.
    #[error("no subscription with id {id}")]
    UnknownId {
        /// The subscription id.
        id: i64,
    },

    /// The store refused a calendar object payload.
    #[error("calendar object {uri:?} rejected: {reason}")]
    Rejected {
        /// The object URI that was being written.
        uri: String,
        /// Why the payload was refused.
        reason: String,
    },

    /// A backend failure (connection lost, constraint violation, ...).
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Read/update access to subscription records.
pub trait SubscriptionStore: Send + Sync {
    /// Lists all subscriptions owned by a principal, in store order.
    fn subscriptions_for_principal(
        &self,
        principal: &str,
    ) -> BoxFuture<'_, Result<Vec<Subscription>, StoreError>>;

    /// Looks up one subscription by principal and URI.
    fn subscription(
        &self,
        principal: &str,
        uri: &str,
    ) -> BoxFuture<'_, Result<Subscription, StoreError>>;

    /// Records a successful refresh at `at`.
    fn mark_refreshed(&self, id: i64, at: DateTime<Utc>)
    -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Write access to cached calendar objects.
pub trait CalendarObjectStore: Send + Sync {
    /// Deletes every cached object of a subscription. Returns how many
    /// objects were removed.
    fn purge_subscription_objects(
        &self,
        subscription_id: i64,
        calendar_type: CalendarType,
    ) -> BoxFuture<'_, Result<usize, StoreError>>;

    /// Inserts one cached object.
    ///
    /// Stores may refuse structurally invalid payloads with
    /// [`StoreError::Rejected`].
    fn create_calendar_object(
        &self,
        object: CachedCalendarObject,
        calendar_type: CalendarType,
    ) -> BoxFuture<'_, Result<(), StoreError>>;
}
