//! Per-connection subscription table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::models::BoxUpdate;

/// Delivery callback invoked with each normalized box update.
pub type SnapshotHandler = Arc<dyn Fn(BoxUpdate) + Send + Sync>;

/// One registered instrument subscription.
struct Subscription {
    handler: SnapshotHandler,
    /// Baseline for staleness detection; set at registration and stamped
    /// on every delivery.
    last_delivery: Instant,
}

/// Instrument key → delivery handler + last-delivery timestamp.
///
/// Owned exclusively by the streaming client; entries are created on
/// `subscribe`, removed on `unsubscribe` or client teardown, and used as
/// the source of truth for resubscribe-all after (re)authentication.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: HashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    /// Registers a handler for an instrument, stamping `now` as the
    /// staleness baseline. Replaces any previous handler for the key.
    pub fn insert(&mut self, key: impl Into<String>, handler: SnapshotHandler, now: Instant) {
        self.subscriptions.insert(
            key.into(),
            Subscription {
                handler,
                last_delivery: now,
            },
        );
    }

    /// Removes an instrument's subscription. Returns `true` if one existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.subscriptions.remove(key).is_some()
    }

    /// Returns the handler for an instrument, if subscribed.
    #[must_use]
    pub fn handler(&self, key: &str) -> Option<SnapshotHandler> {
        self.subscriptions.get(key).map(|s| Arc::clone(&s.handler))
    }

    /// Stamps a delivery for an instrument. No-op if not subscribed.
    pub fn record_delivery(&mut self, key: &str, now: Instant) {
        if let Some(subscription) = self.subscriptions.get_mut(key) {
            subscription.last_delivery = now;
        }
    }

    /// True if the instrument has a registered subscription.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.subscriptions.contains_key(key)
    }

    /// All subscribed instrument keys, in unspecified order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Instruments whose last delivery is older than `threshold` at `now`.
    #[must_use]
    pub fn stale_keys(&self, now: Instant, threshold: std::time::Duration) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_delivery) > threshold)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if no subscriptions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Drops every subscription.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.keys())
            .finish()
    }
}
