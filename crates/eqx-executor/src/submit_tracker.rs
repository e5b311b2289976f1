//! Local order-id → submit-time map.
//!
//! The only mutable state the engine keeps between cycles. Brokers do not
//! report when an order was submitted, so the minimum-age gate relies on
//! this map. Orders placed by another process are simply absent.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use eqx_core::OrderId;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SubmitTimeTracker {
    submitted: DashMap<OrderId, DateTime<Utc>>,
}

impl SubmitTimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, order_id: OrderId, at: DateTime<Utc>) {
        self.submitted.insert(order_id, at);
    }

    pub fn record_now(&self, order_id: OrderId) {
        self.record(order_id, Utc::now());
    }

    pub fn submitted_at(&self, order_id: OrderId) -> Option<DateTime<Utc>> {
        self.submitted.get(&order_id).map(|entry| *entry.value())
    }

    /// Whole seconds since submission, if the order was tracked.
    pub fn age_seconds(&self, order_id: OrderId, now: DateTime<Utc>) -> Option<i64> {
        self.submitted_at(order_id)
            .map(|at| (now - at).num_seconds())
    }

    /// Drop entries the broker no longer reports as working. Entries younger
    /// than `keep_seconds` survive since a fresh order may not be listed yet.
    pub fn prune(&self, working: &HashSet<OrderId>, now: DateTime<Utc>, keep_seconds: i64) {
        let before = self.submitted.len();
        self.submitted
            .retain(|id, at| working.contains(id) || (now - *at).num_seconds() < keep_seconds);
        let pruned = before.saturating_sub(self.submitted.len());
        if pruned > 0 {
            debug!(pruned, remaining = self.submitted.len(), "Pruned submit times");
        }
    }

    pub fn len(&self) -> usize {
        self.submitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_and_age() {
        let tracker = SubmitTimeTracker::new();
        let now = Utc::now();
        tracker.record(OrderId(7), now - Duration::seconds(90));

        assert_eq!(tracker.age_seconds(OrderId(7), now), Some(90));
        assert_eq!(tracker.age_seconds(OrderId(8), now), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_rerecord_overwrites() {
        let tracker = SubmitTimeTracker::new();
        let first = Utc::now() - Duration::hours(2);
        tracker.record(OrderId(1), first);
        tracker.record_now(OrderId(1));

        assert!(tracker.submitted_at(OrderId(1)).is_some_and(|at| at > first));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_prune_drops_stale_orders_no_longer_working() {
        let tracker = SubmitTimeTracker::new();
        let now = Utc::now();
        tracker.record(OrderId(1), now - Duration::hours(3));
        tracker.record(OrderId(2), now - Duration::hours(3));
        tracker.record(OrderId(3), now - Duration::seconds(5));

        let working: HashSet<_> = [OrderId(2)].into_iter().collect();
        tracker.prune(&working, now, 3600);

        assert_eq!(tracker.submitted_at(OrderId(1)), None);
        assert!(tracker.submitted_at(OrderId(2)).is_some());
        assert!(tracker.submitted_at(OrderId(3)).is_some());
        assert_eq!(tracker.len(), 2);
    }
}
