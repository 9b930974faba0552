//! Per-subscription outcomes and the batch refresh report.

use thiserror::Error;
use webcal_feed::{FetchError, NormalizeError};

use crate::store::StoreError;

/// Why a subscription's refresh failed.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The feed could not be fetched (policy refusal, bad URL, network,
    /// HTTP status, redirect cap).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The fetched payload did not parse as its declared format.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RefreshError {
    /// Returns true when the failure happened before any cache write, so
    /// the previously cached objects are still intact.
    pub fn cache_intact(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

/// Why a subscription was skipped without an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skipped {
    /// The refresh interval has not elapsed since the last refresh.
    NotDue,
}

/// The result of one subscription's refresh cycle.
#[derive(Debug)]
pub enum RefreshStatus {
    /// The cache was replaced.
    Refreshed {
        /// Number of calendar instances in the new cache object.
        components: usize,
    },
    /// The subscription was not attempted.
    Skipped(Skipped),
    /// The cycle failed; the old cache survives unless the failure was a
    /// store rejection after the purge.
    Failed(RefreshError),
}

/// One entry of a [`RefreshReport`].
#[derive(Debug)]
pub struct SubscriptionOutcome {
    /// The subscription's store id.
    pub subscription_id: i64,
    /// The subscription URI.
    pub uri: String,
    /// The feed source URL.
    pub source: String,
    /// What happened.
    pub status: RefreshStatus,
}

impl SubscriptionOutcome {
    /// Returns true for a successful refresh.
    pub fn is_refreshed(&self) -> bool {
        matches!(self.status, RefreshStatus::Refreshed { .. })
    }

    /// Returns true for a skip.
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, RefreshStatus::Skipped(_))
    }

    /// Returns true for a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self.status, RefreshStatus::Failed(_))
    }
}

/// The aggregate of one batch run. No error escapes the batch; every
/// subscription contributes exactly one outcome.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Per-subscription outcomes in processing order.
    pub outcomes: Vec<SubscriptionOutcome>,
}

impl RefreshReport {
    /// Adds one outcome.
    pub fn push(&mut self, outcome: SubscriptionOutcome) {
        self.outcomes.push(outcome);
    }

    /// Number of successful refreshes.
    pub fn refreshed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_refreshed()).count()
    }

    /// Number of skipped subscriptions.
    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    /// Number of failed subscriptions.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}
