//! The subscription refresh service.
//!
//! Runs the per-subscription cycle: fetch the feed, normalize it with
//! the subscription's strip rules, purge the old cache, insert the fresh
//! object and advance `last_refreshed`. Failures are isolated per
//! subscription; a batch always runs to completion and reports every
//! outcome.
//!
//! The purge only happens after fetch and normalize have succeeded, so
//! an unreachable or malformed feed leaves the previous cache untouched.
//! A store rejection after the purge leaves the cache empty until the
//! next cycle repairs it; the report carries that distinction.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, error, info, warn};
use webcal_core::{CachedCalendarObject, Subscription};
use webcal_feed::fetcher::FetchedFeed;
use webcal_feed::{FeedFetcher, FetchResult, FetcherConfig, normalize_feed};

use crate::report::{RefreshError, RefreshReport, RefreshStatus, Skipped, SubscriptionOutcome};
use crate::store::{BoxFuture, CalendarObjectStore, CalendarType, StoreError, SubscriptionStore};

/// Length of the random token in cached object URIs.
const OBJECT_URI_TOKEN_LEN: usize = 32;

/// Object-safe source of feed payloads.
///
/// [`FeedFetcher`] is the production implementation; tests substitute
/// canned payloads.
pub trait FeedSource: Send + Sync {
    /// Fetches the feed at `source`.
    fn fetch(&self, source: &str) -> BoxFuture<'_, FetchResult<FetchedFeed>>;
}

impl FeedSource for FeedFetcher {
    fn fetch(&self, source: &str) -> BoxFuture<'_, FetchResult<FetchedFeed>> {
        let source = source.to_string();
        Box::pin(async move { FeedFetcher::fetch(self, &source).await })
    }
}

/// Options for a refresh run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Refresh even when the subscription's interval has not elapsed.
    pub force: bool,
}

impl RefreshOptions {
    /// Options that bypass the due-ness check.
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Drives the fetch → normalize → purge → insert cycle.
pub struct RefreshService {
    feed: Arc<dyn FeedSource>,
    subscriptions: Arc<dyn SubscriptionStore>,
    objects: Arc<dyn CalendarObjectStore>,
}

impl RefreshService {
    /// Creates a service from an existing feed source.
    pub fn new(
        feed: Arc<dyn FeedSource>,
        subscriptions: Arc<dyn SubscriptionStore>,
        objects: Arc<dyn CalendarObjectStore>,
    ) -> Self {
        Self {
            feed,
            subscriptions,
            objects,
        }
    }

    /// Creates a service with a real HTTP fetcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_config(
        config: FetcherConfig,
        subscriptions: Arc<dyn SubscriptionStore>,
        objects: Arc<dyn CalendarObjectStore>,
    ) -> FetchResult<Self> {
        let fetcher = FeedFetcher::new(config)?;
        Ok(Self::new(Arc::new(fetcher), subscriptions, objects))
    }

    /// Refreshes every subscription of a principal.
    ///
    /// No per-subscription error escapes the loop; each subscription
    /// contributes exactly one outcome to the report.
    ///
    /// # Errors
    ///
    /// Only listing the subscriptions can fail here.
    pub async fn refresh_principal(
        &self,
        principal: &str,
        options: RefreshOptions,
    ) -> Result<RefreshReport, StoreError> {
        let subscriptions = self
            .subscriptions
            .subscriptions_for_principal(principal)
            .await?;

        info!(
            principal = %principal,
            subscriptions = subscriptions.len(),
            "Starting refresh batch"
        );

        let mut report = RefreshReport::default();
        for subscription in &subscriptions {
            report.push(self.run_cycle(subscription, options).await);
        }

        info!(
            principal = %principal,
            refreshed = report.refreshed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Refresh batch finished"
        );

        Ok(report)
    }

    /// Refreshes a single subscription addressed by principal and URI.
    ///
    /// # Errors
    ///
    /// Only the subscription lookup can fail; cycle failures are
    /// reported in the outcome.
    pub async fn refresh_subscription(
        &self,
        principal: &str,
        uri: &str,
        options: RefreshOptions,
    ) -> Result<SubscriptionOutcome, StoreError> {
        let subscription = self.subscriptions.subscription(principal, uri).await?;
        Ok(self.run_cycle(&subscription, options).await)
    }

    /// Runs one subscription's cycle and classifies the outcome.
    async fn run_cycle(
        &self,
        subscription: &Subscription,
        options: RefreshOptions,
    ) -> SubscriptionOutcome {
        let outcome = |status| SubscriptionOutcome {
            subscription_id: subscription.id,
            uri: subscription.uri.clone(),
            source: subscription.source.clone(),
            status,
        };

        if !options.force && !subscription.is_due(Utc::now()) {
            debug!(
                subscription_id = subscription.id,
                "Refresh not due, skipping"
            );
            return outcome(RefreshStatus::Skipped(Skipped::NotDue));
        }

        match self.attempt(subscription).await {
            Ok(components) => {
                info!(
                    subscription_id = subscription.id,
                    components, "Subscription refreshed"
                );
                outcome(RefreshStatus::Refreshed { components })
            }
            Err(e @ RefreshError::Fetch(_)) => {
                warn!(
                    subscription_id = subscription.id,
                    error = %e,
                    "Feed unavailable, keeping cached objects"
                );
                outcome(RefreshStatus::Failed(e))
            }
            Err(e) => {
                error!(
                    subscription_id = subscription.id,
                    source = %subscription.source,
                    error = %e,
                    "Refresh failed"
                );
                outcome(RefreshStatus::Failed(e))
            }
        }
    }

    /// The fallible part of the cycle. Ordering is the contract: nothing
    /// is purged until the replacement payload is ready.
    async fn attempt(&self, subscription: &Subscription) -> Result<usize, RefreshError> {
        let feed = self.feed.fetch(&subscription.source).await?;
        let normalized = normalize_feed(&feed.body, feed.format(), &subscription.strip)?;

        let purged = self
            .objects
            .purge_subscription_objects(subscription.id, CalendarType::Subscription)
            .await?;
        debug!(
            subscription_id = subscription.id,
            purged, "Purged cached objects"
        );

        self.objects
            .create_calendar_object(
                CachedCalendarObject {
                    subscription_id: subscription.id,
                    uri: random_object_uri(),
                    calendar_data: normalized.calendar_data,
                },
                CalendarType::Subscription,
            )
            .await?;

        self.subscriptions
            .mark_refreshed(subscription.id, Utc::now())
            .await?;

        Ok(normalized.component_count)
    }
}

/// Generates a cached-object URI: 32 random alphanumerics plus `.ics`.
fn random_object_uri() -> String {
    let token: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(OBJECT_URI_TOKEN_LEN)
        .map(char::from)
        .collect();
    format!("{}.ics", token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use webcal_core::RefreshInterval;
    use webcal_feed::{FetchError, NormalizeError};

    use crate::memory::MemoryStore;
    use crate::store::StoreError;

    const PRINCIPAL: &str = "principals/users/alice";

    const EVENT_FEED: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        PRODID:-//Remote//Feed//EN\r\n\
        BEGIN:VEVENT\r\n\
        UID:12345\r\n\
        DTSTAMP:20250201T090000Z\r\n\
        DTSTART:20250205T100000Z\r\n\
        SUMMARY:Team Meeting\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    const EMPTY_FEED: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        PRODID:-//Remote//Feed//EN\r\n\
        END:VCALENDAR\r\n";

    /// Serves canned payloads keyed by source URL.
    struct StubFeed {
        responses: HashMap<String, FetchedFeed>,
    }

    impl StubFeed {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
            }
        }

        fn with(mut self, source: &str, body: &str, content_type: &str) -> Self {
            self.responses.insert(
                source.to_string(),
                FetchedFeed {
                    body: body.to_string(),
                    content_type: content_type.to_string(),
                },
            );
            self
        }
    }

    impl FeedSource for StubFeed {
        fn fetch(&self, source: &str) -> BoxFuture<'_, FetchResult<FetchedFeed>> {
            let result = self
                .responses
                .get(source)
                .cloned()
                .ok_or_else(|| FetchError::network(format!("no stub for {}", source)));
            Box::pin(async move { result })
        }
    }

    fn service(feed: StubFeed, store: &MemoryStore) -> RefreshService {
        RefreshService::new(
            Arc::new(feed),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
    }

    async fn seed_old_object(store: &MemoryStore, subscription_id: i64) {
        store
            .create_calendar_object(
                CachedCalendarObject {
                    subscription_id,
                    uri: "stale.ics".to_string(),
                    calendar_data:
                        "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:old\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
                            .to_string(),
                },
                CalendarType::Subscription,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_replaces_cached_objects() {
        let store = MemoryStore::new();
        store
            .add_subscription(Subscription::new(
                42,
                PRINCIPAL,
                "team-feed",
                "https://example.com/feed.ics",
            ))
            .await;
        seed_old_object(&store, 42).await;

        let feed = StubFeed::new().with("https://example.com/feed.ics", EVENT_FEED, "text/calendar");
        let service = service(feed, &store);

        let report = service
            .refresh_principal(PRINCIPAL, RefreshOptions::default())
            .await
            .unwrap();
        assert_eq!(report.refreshed(), 1);
        assert_eq!(report.failed(), 0);

        let objects = store.objects_for(42, CalendarType::Subscription).await;
        assert_eq!(objects.len(), 1);
        // The stale object is gone; the new one has a fresh token URI.
        assert_ne!(objects[0].uri, "stale.ics");
        assert!(objects[0].uri.ends_with(".ics"));
        assert_eq!(objects[0].uri.len(), OBJECT_URI_TOKEN_LEN + 4);
        assert!(objects[0].calendar_data.contains("UID:12345"));

        let sub = store.subscription(PRINCIPAL, "team-feed").await.unwrap();
        assert!(sub.last_refreshed.is_some());
    }

    #[tokio::test]
    async fn invalid_source_is_skipped_with_cache_intact() {
        let store = MemoryStore::new();
        store
            .add_subscription(Subscription::new(7, PRINCIPAL, "bad", "localhost/foo.bar"))
            .await;
        seed_old_object(&store, 7).await;

        // The real fetcher refuses the source before any network call.
        let service = RefreshService::with_config(
            FetcherConfig::new(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        )
        .unwrap();

        let report = service
            .refresh_principal(PRINCIPAL, RefreshOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed(), 1);

        match &report.outcomes[0].status {
            RefreshStatus::Failed(RefreshError::Fetch(e)) => {
                assert_eq!(e.kind(), webcal_feed::FetchErrorKind::InvalidUrl);
            }
            other => panic!("expected fetch failure, got {:?}", other),
        }

        // Old cache untouched.
        let objects = store.objects_for(7, CalendarType::Subscription).await;
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].uri, "stale.ics");

        let sub = store.subscription(PRINCIPAL, "bad").await.unwrap();
        assert!(sub.last_refreshed.is_none());
    }

    #[tokio::test]
    async fn malformed_feed_keeps_cache() {
        let store = MemoryStore::new();
        store
            .add_subscription(Subscription::new(
                9,
                PRINCIPAL,
                "garbled",
                "https://example.com/garbled",
            ))
            .await;
        seed_old_object(&store, 9).await;

        let feed = StubFeed::new().with(
            "https://example.com/garbled",
            "this is not a calendar",
            "application/calendar+json",
        );
        let service = service(feed, &store);

        let outcome = service
            .refresh_subscription(PRINCIPAL, "garbled", RefreshOptions::default())
            .await
            .unwrap();

        match outcome.status {
            RefreshStatus::Failed(RefreshError::Normalize(NormalizeError::JcalJson(_))) => {}
            other => panic!("expected jCal parse failure, got {:?}", other),
        }

        assert_eq!(store.objects_for(9, CalendarType::Subscription).await.len(), 1);
    }

    #[tokio::test]
    async fn store_rejection_after_purge_is_isolated() {
        let store = MemoryStore::new();
        store
            .add_subscription(Subscription::new(
                1,
                PRINCIPAL,
                "empty",
                "https://example.com/empty.ics",
            ))
            .await;
        store
            .add_subscription(Subscription::new(
                2,
                PRINCIPAL,
                "good",
                "https://example.com/good.ics",
            ))
            .await;
        seed_old_object(&store, 1).await;

        let feed = StubFeed::new()
            .with("https://example.com/empty.ics", EMPTY_FEED, "text/calendar")
            .with("https://example.com/good.ics", EVENT_FEED, "text/calendar");
        let service = service(feed, &store);

        let report = service
            .refresh_principal(PRINCIPAL, RefreshOptions::default())
            .await
            .unwrap();

        // The first subscription failed after its purge.
        match &report.outcomes[0].status {
            RefreshStatus::Failed(RefreshError::Store(StoreError::Rejected { .. })) => {}
            other => panic!("expected store rejection, got {:?}", other),
        }
        assert!(store.objects_for(1, CalendarType::Subscription).await.is_empty());

        // The batch still processed the second subscription.
        assert!(report.outcomes[1].is_refreshed());
        assert_eq!(store.objects_for(2, CalendarType::Subscription).await.len(), 1);
    }

    #[tokio::test]
    async fn not_due_subscriptions_are_skipped_unless_forced() {
        let store = MemoryStore::new();
        store
            .add_subscription(
                Subscription::new(3, PRINCIPAL, "weekly", "https://example.com/feed.ics")
                    .with_refresh_interval(RefreshInterval::parse("P1W").unwrap())
                    .with_last_refreshed(Utc::now()),
            )
            .await;

        let feed = StubFeed::new().with("https://example.com/feed.ics", EVENT_FEED, "text/calendar");
        let service = service(feed, &store);

        let outcome = service
            .refresh_subscription(PRINCIPAL, "weekly", RefreshOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            outcome.status,
            RefreshStatus::Skipped(Skipped::NotDue)
        ));
        assert!(store.objects_for(3, CalendarType::Subscription).await.is_empty());

        let outcome = service
            .refresh_subscription(PRINCIPAL, "weekly", RefreshOptions::forced())
            .await
            .unwrap();
        assert!(outcome.is_refreshed());
        assert_eq!(store.objects_for(3, CalendarType::Subscription).await.len(), 1);
    }

    #[tokio::test]
    async fn jcal_feed_is_cached_as_icalendar() {
        let store = MemoryStore::new();
        store
            .add_subscription(Subscription::new(
                5,
                PRINCIPAL,
                "json-feed",
                "https://example.com/feed.json",
            ))
            .await;

        let body = serde_json::json!([
            "vcalendar",
            [["version", {}, "text", "2.0"]],
            [["vevent",
                [["uid", {}, "text", "json-uid"],
                 ["summary", {}, "text", "From jCal"]],
                []]]
        ])
        .to_string();

        let feed = StubFeed::new().with(
            "https://example.com/feed.json",
            &body,
            "application/calendar+json; charset=utf-8",
        );
        let service = service(feed, &store);

        let outcome = service
            .refresh_subscription(PRINCIPAL, "json-feed", RefreshOptions::default())
            .await
            .unwrap();
        assert!(outcome.is_refreshed());

        let objects = store.objects_for(5, CalendarType::Subscription).await;
        assert!(objects[0].calendar_data.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(objects[0].calendar_data.contains("UID:json-uid\r\n"));
    }

    #[tokio::test]
    async fn strip_rules_are_applied_from_the_record() {
        let store = MemoryStore::new();
        store
            .add_subscription(
                Subscription::new(6, PRINCIPAL, "no-todos", "https://example.com/mixed.ics")
                    .with_strip(webcal_core::StripRules::default().with_todos(true)),
            )
            .await;

        let mixed = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//R//F//EN\r\n\
            BEGIN:VEVENT\r\nUID:e1\r\nEND:VEVENT\r\n\
            BEGIN:VTODO\r\nUID:t1\r\nEND:VTODO\r\n\
            END:VCALENDAR\r\n";
        let feed = StubFeed::new().with("https://example.com/mixed.ics", mixed, "text/calendar");
        let service = service(feed, &store);

        let outcome = service
            .refresh_subscription(PRINCIPAL, "no-todos", RefreshOptions::default())
            .await
            .unwrap();
        match outcome.status {
            RefreshStatus::Refreshed { components } => assert_eq!(components, 1),
            other => panic!("expected refresh, got {:?}", other),
        }

        let objects = store.objects_for(6, CalendarType::Subscription).await;
        assert!(!objects[0].calendar_data.contains("VTODO"));
    }

    #[test]
    fn object_uris_are_random_tokens() {
        let a = random_object_uri();
        let b = random_object_uri();

        assert_eq!(a.len(), OBJECT_URI_TOKEN_LEN + 4);
        assert!(a.ends_with(".ics"));
        assert!(
            a[..OBJECT_URI_TOKEN_LEN]
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        );
        assert_ne!(a, b);
    }
}
