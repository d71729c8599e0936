//! # Insurance Supervisor
//!
//! The failover state machine embedded in every [`crate::distributed::DistributedBucket`].
//! Tracks whether the shared store is healthy and decides whether routed
//! operations should go to the atomic program or fall back to the
//! in-process insurance bucket.
//!
//! Only the atomic-program path drives automatic transitions; probes like
//! `health_check` must call neither [`InsuranceSupervisor::record_failure`]
//! nor [`InsuranceSupervisor::record_success`].

use crate::events::{Event, EventBus};
use std::time::{SystemTime, UNIX_EPOCH};

/// Failover state of a [`crate::distributed::DistributedBucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Healthy,
    Degraded,
}

/// Default insurance capacity: `max(1, floor(capacity * 0.1))`.
pub fn default_insurance_capacity(capacity: f64) -> f64 {
    (capacity * 0.1).floor().max(1.0)
}

/// Default insurance refill rate: `max(0.1, refill_rate * 0.1)`.
pub fn default_insurance_refill_rate(refill_rate: f64) -> f64 {
    (refill_rate * 0.1).max(0.1)
}

/// The C4 failover state machine. Owns no I/O; callers tell it about store
/// outcomes and it decides when to flip `active` and what event to emit.
#[derive(Debug)]
pub struct InsuranceSupervisor {
    active: bool,
    consecutive_failures: u64,
    total_failures: u64,
    last_store_success_at: Option<u64>,
    insurance_capacity: f64,
    insurance_refill_rate: f64,
}

impl InsuranceSupervisor {
    pub fn new(insurance_capacity: f64, insurance_refill_rate: f64) -> Self {
        Self {
            active: false,
            consecutive_failures: 0,
            total_failures: 0,
            last_store_success_at: None,
            insurance_capacity,
            insurance_refill_rate,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    pub fn state(&self) -> State {
        if self.active {
            State::Degraded
        } else {
            State::Healthy
        }
    }

    pub fn insurance_capacity(&self) -> f64 {
        self.insurance_capacity
    }

    pub fn insurance_refill_rate(&self) -> f64 {
        self.insurance_refill_rate
    }

    /// Called after a routed store operation fails. Publishes exactly one
    /// `insurance-on` event the first time this happens in a given outage
    /// (Healthy -> Degraded); subsequent failures while already Degraded
    /// just bump the counter.
    pub fn record_failure(&mut self, error: &str, bus: &EventBus) {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        if !self.active {
            self.active = true;
            bus.publish(Event::InsuranceOn {
                reason: "store-error".to_string(),
                failure_count: self.consecutive_failures,
                insurance_capacity: self.insurance_capacity,
                insurance_refill_rate: self.insurance_refill_rate,
                timestamp: now_ms(),
            });
            let _ = error; // carried by the caller's own `store-error` event, not here
        }
    }

    /// Called after a routed store operation succeeds. If this recovers
    /// from Degraded, publishes exactly one `insurance-off` and resets the
    /// embedded insurance bucket (caller's responsibility — see
    /// `reset_on_recovery`). A no-op while already Healthy.
    ///
    /// Returns `true` iff this call transitioned Degraded -> Healthy, so
    /// the caller knows whether to reset its embedded `LocalBucket`.
    pub fn record_success(&mut self, bus: &EventBus) -> bool {
        self.last_store_success_at = Some(now_ms());
        if self.active {
            self.active = false;
            let total = self.consecutive_failures;
            self.consecutive_failures = 0;
            bus.publish(Event::InsuranceOff {
                reason: "store-recovered".to_string(),
                total_failures: total,
                timestamp: now_ms(),
            });
            true
        } else {
            false
        }
    }

    /// Manual override: force insurance on. Emits `insurance-on{reason:"manual"}`
    /// even if already active is a no-op for the event (only fires on an
    /// actual transition) to keep the single-emission rule.
    pub fn force_active(&mut self, bus: &EventBus) {
        if !self.active {
            self.active = true;
            self.consecutive_failures = self.consecutive_failures.max(1);
            bus.publish(Event::InsuranceOn {
                reason: "manual".to_string(),
                failure_count: self.consecutive_failures,
                insurance_capacity: self.insurance_capacity,
                insurance_refill_rate: self.insurance_refill_rate,
                timestamp: now_ms(),
            });
        }
    }

    /// Manual override: force insurance off. Returns `true` iff this was a
    /// real transition (so the caller knows to reset the insurance bucket).
    pub fn force_inactive(&mut self, bus: &EventBus) -> bool {
        if self.active {
            self.active = false;
            let total = self.consecutive_failures;
            self.consecutive_failures = 0;
            bus.publish(Event::InsuranceOff {
                reason: "manual".to_string(),
                total_failures: total,
                timestamp: now_ms(),
            });
            true
        } else {
            false
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_insurance_sizing() {
        assert_eq!(default_insurance_capacity(100.0), 10.0);
        assert_eq!(default_insurance_capacity(5.0), 1.0);
        assert_eq!(default_insurance_capacity(0.0), 1.0);
        assert_eq!(default_insurance_refill_rate(10.0), 1.0);
        assert_eq!(default_insurance_refill_rate(0.01), 0.1);
    }

    #[test]
    fn first_failure_activates_and_emits_once() {
        let bus = EventBus::new();
        let mut sup = InsuranceSupervisor::new(10.0, 1.0);
        sup.record_failure("timeout", &bus);
        assert!(sup.is_active());
        assert_eq!(sup.consecutive_failures(), 1);
        sup.record_failure("timeout", &bus);
        assert_eq!(sup.consecutive_failures(), 2);
    }

    #[test]
    fn success_recovers_and_resets_counters() {
        let bus = EventBus::new();
        let mut sup = InsuranceSupervisor::new(10.0, 1.0);
        sup.record_failure("timeout", &bus);
        sup.record_failure("timeout", &bus);
        let transitioned = sup.record_success(&bus);
        assert!(transitioned);
        assert!(!sup.is_active());
        assert_eq!(sup.consecutive_failures(), 0);
    }

    #[test]
    fn success_while_healthy_is_a_noop_transition() {
        let bus = EventBus::new();
        let mut sup = InsuranceSupervisor::new(10.0, 1.0);
        assert!(!sup.record_success(&bus));
    }

    #[test]
    fn manual_override_round_trip() {
        let bus = EventBus::new();
        let mut sup = InsuranceSupervisor::new(10.0, 1.0);
        sup.force_active(&bus);
        assert!(sup.is_active());
        assert!(sup.force_inactive(&bus));
        assert!(!sup.is_active());
    }
}
