//! # Event Bus
//!
//! Per-bucket fan-out of structured lifecycle events. Every mutator on
//! [`crate::token_bucket::LocalBucket`] and [`crate::distributed::DistributedBucket`]
//! emits exactly one business event (`allowed`/`denied`/`penalty`/`reward`/
//! `blocked`/`unblocked`/`reset`) plus, on the distributed path, at most one
//! administrative event (`store-error`/`insurance-on`/`insurance-off`).
//!
//! Observers are plain closures registered by value; there is no
//! back-pointer from the bus into observer state, so a bucket and its
//! observers can be dropped independently.
//!
//! ## Example
//!
//! ```rust
//! use throttler::events::{EventBus, Event};
//!
//! let mut bus = EventBus::new();
//! let handle = bus.subscribe(|event: &Event| {
//!     println!("{:?}", event);
//! });
//! bus.unsubscribe(handle);
//! ```

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a business decision was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Served by a plain in-process `LocalBucket` (no distributed wrapper).
    Local,
    /// Served by the atomic program on the shared store.
    Redis,
    /// Served by the embedded insurance `LocalBucket` of a `DistributedBucket`.
    Insurance,
}

/// Why a `try_consume` call was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Blocked,
    InsufficientTokens,
}

/// A single structured lifecycle event emitted by a bucket.
///
/// Carries exactly the data documented in the event table: one business
/// event per call plus at most one administrative event.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    Allowed {
        remaining_tokens: i64,
        cost: f64,
        source: Source,
        timestamp: u64,
    },
    Denied {
        remaining_tokens: i64,
        cost: f64,
        retry_after_ms: u64,
        reason: DenyReason,
        source: Source,
        timestamp: u64,
    },
    Penalty {
        applied: f64,
        remaining_tokens: f64,
        before: f64,
        source: Source,
        timestamp: u64,
    },
    Reward {
        applied: f64,
        remaining_tokens: f64,
        before: f64,
        capped_at_capacity: bool,
        source: Source,
        timestamp: u64,
    },
    Blocked {
        block_duration_ms: u64,
        block_until: u64,
        timestamp: u64,
    },
    Unblocked {
        was_blocked: bool,
        timestamp: u64,
    },
    Reset {
        old_tokens: f64,
        new_tokens: f64,
        capacity: f64,
        timestamp: u64,
    },
    StoreError {
        operation: String,
        error: String,
        timestamp: u64,
    },
    InsuranceOn {
        reason: String,
        failure_count: u64,
        insurance_capacity: f64,
        insurance_refill_rate: f64,
        timestamp: u64,
    },
    InsuranceOff {
        reason: String,
        total_failures: u64,
        timestamp: u64,
    },
}

impl Event {
    /// Current time in epoch milliseconds, used to stamp every event.
    pub fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Handle returned by [`EventBus::subscribe`], used to remove an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&Event) + Send + Sync>;

/// Fan-out of bucket lifecycle events to registered observers.
///
/// Dispatch is synchronous and ordered; observers must not block, as they
/// run inline on the thread driving the bucket operation. `EventBus` is
/// `Send + Sync` and safe to share behind an `Arc` across concurrently
/// accessed buckets.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    observers: Vec<(SubscriptionId, Observer)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { next_id: 0, observers: Vec::new() }
    }

    /// Registers an observer, returning a handle that can later be passed
    /// to [`EventBus::unsubscribe`].
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Arc::new(observer)));
        id
    }

    /// Removes a previously registered observer. A no-op if the handle is
    /// unknown (already unsubscribed).
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.observers.retain(|(existing, _)| *existing != id);
    }

    /// Dispatches `event` to every registered observer, in registration
    /// order.
    pub fn publish(&self, event: Event) {
        for (_, observer) in &self.observers {
            observer(&event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_reaches_all_observers() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        bus.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        bus.subscribe(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Event::Unblocked { was_blocked: true, timestamp: 0 });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let id = bus.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });

        bus.unsubscribe(id);
        bus.publish(Event::Unblocked { was_blocked: false, timestamp: 0 });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
