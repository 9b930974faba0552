//! In-memory store for tests and embedding.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use webcal_core::{CachedCalendarObject, Subscription};

use crate::store::{
    BoxFuture, CalendarObjectStore, CalendarType, StoreError, SubscriptionStore,
};

#[derive(Default)]
struct Inner {
    /// Subscriptions in insertion order.
    subscriptions: Vec<Subscription>,
    /// Cached objects keyed by subscription id and calendar type.
    objects: HashMap<(i64, CalendarType), Vec<CachedCalendarObject>>,
}

/// An in-process implementation of both store traits.
///
/// Clones share the same state. The object store refuses payloads that
/// contain no calendar instances, which makes replace-not-merge and
/// rejection-after-purge behavior observable in tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription record.
    pub async fn add_subscription(&self, subscription: Subscription) {
        self.inner.write().await.subscriptions.push(subscription);
    }

    /// Returns the cached objects of a subscription, in insertion order.
    pub async fn objects_for(
        &self,
        subscription_id: i64,
        calendar_type: CalendarType,
    ) -> Vec<CachedCalendarObject> {
        self.inner
            .read()
            .await
            .objects
            .get(&(subscription_id, calendar_type))
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of cached objects across all subscriptions.
    pub async fn object_count(&self) -> usize {
        self.inner.read().await.objects.values().map(Vec::len).sum()
    }
}

/// Returns true when the payload contains at least one VEVENT, VTODO or
/// VJOURNAL component.
fn has_calendar_instances(calendar_data: &str) -> bool {
    calendar_data.lines().any(|line| {
        let line = line.trim_end();
        line.eq_ignore_ascii_case("BEGIN:VEVENT")
            || line.eq_ignore_ascii_case("BEGIN:VTODO")
            || line.eq_ignore_ascii_case("BEGIN:VJOURNAL")
    })
}

impl SubscriptionStore for MemoryStore {
    fn subscriptions_for_principal(
        &self,
        principal: &str,
    ) -> BoxFuture<'_, Result<Vec<Subscription>, StoreError>> {
        let principal = principal.to_string();
        Box::pin(async move {
            Ok(self
                .inner
                .read()
                .await
                .subscriptions
                .iter()
                .filter(|s| s.principal == principal)
                .cloned()
                .collect())
        })
    }

    fn subscription(
        &self,
        principal: &str,
        uri: &str,
    ) -> BoxFuture<'_, Result<Subscription, StoreError>> {
        let principal = principal.to_string();
        let uri = uri.to_string();
        Box::pin(async move {
            self.inner
                .read()
                .await
                .subscriptions
                .iter()
                .find(|s| s.principal == principal && s.uri == uri)
                .cloned()
                .ok_or(StoreError::SubscriptionNotFound { principal, uri })
        })
    }

    fn mark_refreshed(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let subscription = inner
                .subscriptions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(StoreError::UnknownId { id })?;
            subscription.last_refreshed = Some(at);
            Ok(())
        })
    }
}

impl CalendarObjectStore for MemoryStore {
    fn purge_subscription_objects(
        &self,
        subscription_id: i64,
        calendar_type: CalendarType,
    ) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            Ok(inner
                .objects
                .remove(&(subscription_id, calendar_type))
                .map(|objects| objects.len())
                .unwrap_or(0))
        })
    }

    fn create_calendar_object(
        &self,
        object: CachedCalendarObject,
        calendar_type: CalendarType,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if !has_calendar_instances(&object.calendar_data) {
                return Err(StoreError::Rejected {
                    uri: object.uri,
                    reason: "payload contains no calendar instances".to_string(),
                });
            }

            let mut inner = self.inner.write().await;
            inner
                .objects
                .entry((object.subscription_id, calendar_type))
                .or_default()
                .push(object);
            Ok(())
        })
    }
}
