//! # Token Bucket Algorithm Implementation
//!
//! This module implements the [token bucket algorithm](https://en.wikipedia.org/wiki/Token_bucket)
//! for rate limiting. The token bucket is a simple, efficient algorithm that allows
//! controlled bursts while maintaining a long-term average rate.
//!
//! ## How It Works
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                         TOKEN BUCKET VISUALIZATION                          │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                                                                             │
//! │   Bucket State Over Time (capacity=10, refill_rate=2/sec):                  │
//! │                                                                             │
//! │   Time 0s:  [██████████] 10/10 tokens (full)                                │
//! │             ↓ Request arrives, consumes 1 token                             │
//! │                                                                             │
//! │   Time 0s:  [█████████ ] 9/10 tokens                                        │
//! │             ↓ 3 more requests arrive                                        │
//! │                                                                             │
//! │   Time 0s:  [██████   ] 6/10 tokens                                         │
//! │             ↓ 0.5 seconds pass (refill = 0.5 × 2 = 1 token)                 │
//! │                                                                             │
//! │   Time 0.5s: [███████  ] 7/10 tokens                                        │
//! │              ↓ 10 requests arrive (only 7 allowed)                          │
//! │                                                                             │
//! │   Time 0.5s: [         ] 0/10 tokens (3 requests DENIED)                    │
//! │              ↓ 1 second passes (refill = 1 × 2 = 2 tokens)                  │
//! │                                                                             │
//! │   Time 1.5s: [██       ] 2/10 tokens                                        │
//! │                                                                             │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Edge Case Handling
//!
//! - **Overflow prevention**: Elapsed time capped at 1 hour
//! - **NaN/Infinity protection**: Validates floating point arithmetic
//! - **Precision**: Uses f64 for fractional token accumulation, and tokens
//!   may go negative after a `penalty` (debt is legal state)
//! - **Time skew**: Saturating subtraction prevents underflow

use crate::error::ThrottlerError;
use crate::events::{DenyReason, Event, EventBus, Source, SubscriptionId};
use crate::snapshot::{BucketSnapshot, SnapshotMetadata};
use parking_lot::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Outcome of a [`LocalBucket::try_consume`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumeResult {
    pub allowed: bool,
    /// Floor of tokens remaining after the call settles.
    pub remaining_tokens: i64,
    pub cost: f64,
    /// Milliseconds until this cost would be satisfiable; zero when allowed.
    pub retry_after_ms: u64,
    pub reason: Option<DenyReason>,
}

/// Outcome of a [`LocalBucket::penalty`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyResult {
    pub applied: f64,
    pub remaining_tokens: f64,
}

/// Outcome of a [`LocalBucket::reward`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardResult {
    pub applied: f64,
    pub remaining_tokens: f64,
    pub capped_at_capacity: bool,
}

/// Point-in-time view of a bucket, for observability (`get_state`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BucketState {
    pub capacity: f64,
    pub tokens: f64,
    pub refill_rate: f64,
    pub last_refill_at: u64,
    pub blocked: bool,
    pub block_until: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill_at: u64,
    block_until: Option<u64>,
}

impl Inner {
    fn refill(&mut self, now: u64) {
        let elapsed_ms = now.saturating_sub(self.last_refill_at).min(3_600_000);
        let elapsed_seconds = elapsed_ms as f64 / 1000.0;
        if elapsed_seconds >= 0.001 {
            let tokens_to_add = self.refill_rate * elapsed_seconds;
            if tokens_to_add.is_finite() && tokens_to_add > 0.0 {
                self.tokens = (self.tokens + tokens_to_add).min(self.capacity);
            }
            self.last_refill_at = now;
        }
    }

    /// Resolves an expired block, returning whether still blocked.
    fn settle_block(&mut self, now: u64) -> bool {
        match self.block_until {
            Some(until) if until > now => true,
            Some(_) => {
                self.block_until = None;
                false
            }
            None => false,
        }
    }
}

/// A single-process token bucket: refill, penalty, reward, time-based
/// block, snapshot. Performs no I/O. Safe to share across threads via
/// `Arc<LocalBucket>` — every mutator locks internally and is O(1).
#[derive(Debug)]
pub struct LocalBucket {
    state: Mutex<Inner>,
    events: Mutex<EventBus>,
}

impl LocalBucket {
    /// Creates a new bucket at full capacity.
    ///
    /// Returns `InvalidArgument` if `capacity` or `refill_rate` is
    /// non-finite or non-positive.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, ThrottlerError> {
        if !capacity.is_finite() || capacity <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "capacity must be a finite positive number".to_string(),
            ));
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "refill_rate must be a finite positive number".to_string(),
            ));
        }
        Ok(Self {
            state: Mutex::new(Inner {
                capacity,
                tokens: capacity,
                refill_rate,
                last_refill_at: now_ms(),
                block_until: None,
            }),
            events: Mutex::new(EventBus::new()),
        })
    }

    fn now(&self) -> u64 {
        now_ms()
    }

    pub fn capacity(&self) -> f64 {
        self.state.lock().capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.state.lock().refill_rate
    }

    /// Registers an observer for this bucket's lifecycle events.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.lock().subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.events.lock().unsubscribe(id);
    }

    /// Attempts to consume `cost` tokens, tagging the emitted event with
    /// `source`. `source` lets a `DistributedBucket` attribute calls routed
    /// through its embedded insurance bucket correctly.
    pub fn try_consume_from(&self, cost: f64, source: Source) -> Result<ConsumeResult, ThrottlerError> {
        if !cost.is_finite() || cost <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "cost must be a finite positive number".to_string(),
            ));
        }
        let now = self.now();
        let mut inner = self.state.lock();

        if inner.settle_block(now) {
            let remaining = inner.block_until.unwrap() - now;
            let remaining_tokens = inner.tokens.floor() as i64;
            drop(inner);
            let result = ConsumeResult {
                allowed: false,
                remaining_tokens,
                cost,
                retry_after_ms: remaining,
                reason: Some(DenyReason::Blocked),
            };
            self.events.lock().publish(Event::Denied {
                remaining_tokens,
                cost,
                retry_after_ms: result.retry_after_ms,
                reason: DenyReason::Blocked,
                source,
                timestamp: Event::now_ms(),
            });
            return Ok(result);
        }

        inner.refill(now);

        let result = if inner.tokens >= cost {
            inner.tokens -= cost;
            let remaining_tokens = inner.tokens.floor() as i64;
            drop(inner);
            let result = ConsumeResult {
                allowed: true,
                remaining_tokens,
                cost,
                retry_after_ms: 0,
                reason: None,
            };
            self.events.lock().publish(Event::Allowed {
                remaining_tokens,
                cost,
                source,
                timestamp: Event::now_ms(),
            });
            result
        } else {
            let retry_after_ms = if inner.refill_rate > 0.0 {
                (((cost - inner.tokens) / inner.refill_rate) * 1000.0).ceil() as u64
            } else {
                u64::MAX
            };
            let remaining_tokens = inner.tokens.floor() as i64;
            drop(inner);
            let result = ConsumeResult {
                allowed: false,
                remaining_tokens,
                cost,
                retry_after_ms,
                reason: Some(DenyReason::InsufficientTokens),
            };
            self.events.lock().publish(Event::Denied {
                remaining_tokens,
                cost,
                retry_after_ms,
                reason: DenyReason::InsufficientTokens,
                source,
                timestamp: Event::now_ms(),
            });
            result
        };

        Ok(result)
    }

    pub fn try_consume(&self, cost: f64) -> Result<ConsumeResult, ThrottlerError> {
        self.try_consume_from(cost, Source::Local)
    }

    /// Subtracts `points` tokens, allowing the balance to go negative.
    pub fn penalty(&self, points: f64) -> Result<PenaltyResult, ThrottlerError> {
        self.penalty_from(points, Source::Local)
    }

    pub fn penalty_from(&self, points: f64, source: Source) -> Result<PenaltyResult, ThrottlerError> {
        if !points.is_finite() || points <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "penalty points must be a finite positive number".to_string(),
            ));
        }
        let now = self.now();
        let mut inner = self.state.lock();
        inner.refill(now);
        let before = inner.tokens;
        inner.tokens -= points;
        let remaining_tokens = inner.tokens;
        drop(inner);
        self.events.lock().publish(Event::Penalty {
            applied: points,
            remaining_tokens,
            before,
            source,
            timestamp: Event::now_ms(),
        });
        Ok(PenaltyResult { applied: points, remaining_tokens })
    }

    /// Adds `points` tokens, clamped to capacity.
    pub fn reward(&self, points: f64) -> Result<RewardResult, ThrottlerError> {
        self.reward_from(points, Source::Local)
    }

    pub fn reward_from(&self, points: f64, source: Source) -> Result<RewardResult, ThrottlerError> {
        if !points.is_finite() || points <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "reward points must be a finite positive number".to_string(),
            ));
        }
        let now = self.now();
        let mut inner = self.state.lock();
        inner.refill(now);
        let before = inner.tokens;
        let uncapped = inner.tokens + points;
        inner.tokens = uncapped.min(inner.capacity);
        let capped_at_capacity = uncapped > inner.capacity;
        let remaining_tokens = inner.tokens;
        drop(inner);
        self.events.lock().publish(Event::Reward {
            applied: points,
            remaining_tokens,
            before,
            capped_at_capacity,
            source,
            timestamp: Event::now_ms(),
        });
        Ok(RewardResult { applied: points, remaining_tokens, capped_at_capacity })
    }

    /// Blocks all future `try_consume` calls for `duration`. Returns the
    /// absolute unblock instant (epoch milliseconds).
    pub fn block(&self, duration: Duration) -> Result<u64, ThrottlerError> {
        if duration.is_zero() {
            return Err(ThrottlerError::InvalidArgument(
                "block duration must be positive".to_string(),
            ));
        }
        let now = self.now();
        let block_until = now + duration.as_millis() as u64;
        {
            let mut inner = self.state.lock();
            inner.block_until = Some(block_until);
        }
        self.events.lock().publish(Event::Blocked {
            block_duration_ms: duration.as_millis() as u64,
            block_until,
            timestamp: Event::now_ms(),
        });
        Ok(block_until)
    }

    /// Clears any active block. Returns whether a block was in effect.
    pub fn unblock(&self) -> bool {
        let was_blocked = {
            let mut inner = self.state.lock();
            let now = self.now();
            let was = inner.settle_block(now);
            inner.block_until = None;
            was
        };
        self.events.lock().publish(Event::Unblocked {
            was_blocked,
            timestamp: Event::now_ms(),
        });
        was_blocked
    }

    pub fn is_blocked(&self) -> bool {
        let now = self.now();
        self.state.lock().settle_block(now)
    }

    /// Remaining duration of an active block, `Duration::ZERO` if unblocked.
    pub fn block_remaining(&self) -> Duration {
        let now = self.now();
        let mut inner = self.state.lock();
        if inner.settle_block(now) {
            Duration::from_millis(inner.block_until.unwrap() - now)
        } else {
            Duration::ZERO
        }
    }

    /// Current whole tokens available, after applying pending refill.
    pub fn available_tokens(&self) -> i64 {
        let now = self.now();
        let mut inner = self.state.lock();
        inner.refill(now);
        inner.tokens.floor() as i64
    }

    /// Time until at least one more token is available.
    pub fn time_until_next_token(&self) -> Duration {
        let now = self.now();
        let mut inner = self.state.lock();
        inner.refill(now);
        if inner.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if inner.refill_rate <= 0.0 {
            return Duration::from_secs(u64::MAX / 1000);
        }
        let needed = 1.0 - inner.tokens;
        let seconds = (needed / inner.refill_rate).min(86_400.0);
        Duration::from_secs_f64(seconds)
    }

    /// Resets the bucket to `tokens` (default: full capacity), validates
    /// `0 <= tokens <= capacity`, clears any block.
    pub fn reset(&self, tokens: Option<f64>) -> Result<(), ThrottlerError> {
        let mut inner = self.state.lock();
        let new_tokens = tokens.unwrap_or(inner.capacity);
        if !new_tokens.is_finite() || new_tokens < 0.0 || new_tokens > inner.capacity {
            return Err(ThrottlerError::InvalidArgument(format!(
                "reset tokens must be within [0, {}]",
                inner.capacity
            )));
        }
        let old_tokens = inner.tokens;
        inner.tokens = new_tokens;
        inner.last_refill_at = now_ms();
        inner.block_until = None;
        let capacity = inner.capacity;
        drop(inner);
        self.events.lock().publish(Event::Reset {
            old_tokens,
            new_tokens,
            capacity,
            timestamp: Event::now_ms(),
        });
        Ok(())
    }

    pub fn get_state(&self) -> BucketState {
        let now = self.now();
        let mut inner = self.state.lock();
        inner.refill(now);
        BucketState {
            capacity: inner.capacity,
            tokens: inner.tokens,
            refill_rate: inner.refill_rate,
            last_refill_at: inner.last_refill_at,
            blocked: inner.settle_block(now),
            block_until: inner.block_until,
        }
    }

    pub fn snapshot(&self) -> BucketSnapshot {
        let now = self.now();
        let mut inner = self.state.lock();
        inner.refill(now);
        BucketSnapshot {
            version: crate::snapshot::SNAPSHOT_VERSION,
            capacity: inner.capacity,
            tokens: inner.tokens,
            refill_rate: inner.refill_rate,
            last_refill_at: inner.last_refill_at,
            block_until: inner.block_until,
            metadata: SnapshotMetadata::now("LocalBucket"),
        }
    }

    /// Restores a bucket from a validated snapshot. The bucket's own
    /// `capacity`/`refill_rate` are replaced by the snapshot's.
    pub fn restore(snapshot: BucketSnapshot) -> Result<Self, ThrottlerError> {
        snapshot.validate()?;
        Ok(Self {
            state: Mutex::new(Inner {
                capacity: snapshot.capacity,
                tokens: snapshot.tokens,
                refill_rate: snapshot.refill_rate,
                last_refill_at: snapshot.last_refill_at,
                block_until: snapshot.block_until,
            }),
            events: Mutex::new(EventBus::new()),
        })
    }

    /// Overwrites this bucket's state in place from a validated snapshot,
    /// preserving its registered observers. Used by the supervisor to
    /// reset the embedded insurance bucket on recovery.
    pub fn restore_into(&self, snapshot: BucketSnapshot) -> Result<(), ThrottlerError> {
        snapshot.validate()?;
        let mut inner = self.state.lock();
        inner.capacity = snapshot.capacity;
        inner.tokens = snapshot.tokens;
        inner.refill_rate = snapshot.refill_rate;
        inner.last_refill_at = snapshot.last_refill_at;
        inner.block_until = snapshot.block_until;
        Ok(())
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
    fn new_bucket_has_full_capacity() {
        let bucket = LocalBucket::new(100.0, 10.0).unwrap();
        assert_eq!(bucket.available_tokens(), 100);
    }

    #[test]
    fn rejects_non_positive_capacity() {
        assert!(LocalBucket::new(0.0, 10.0).is_err());
        assert!(LocalBucket::new(-1.0, 10.0).is_err());
        assert!(LocalBucket::new(f64::NAN, 10.0).is_err());
    }

    #[test]
    fn consume_never_exceeds_capacity_and_denies_when_empty() {
        let bucket = LocalBucket::new(10.0, 1.0).unwrap();
        let r = bucket.try_consume(10.0).unwrap();
        assert!(r.allowed);
        assert_eq!(r.remaining_tokens, 0);
        let r2 = bucket.try_consume(1.0).unwrap();
        assert!(!r2.allowed);
        assert_eq!(r2.reason, Some(DenyReason::InsufficientTokens));
    }

    #[test]
    fn try_consume_rejects_non_positive_cost() {
        let bucket = LocalBucket::new(10.0, 1.0).unwrap();
        assert!(bucket.try_consume(0.0).is_err());
        assert!(bucket.try_consume(-5.0).is_err());
    }

    #[test]
    fn penalty_can_drive_tokens_negative() {
        let bucket = LocalBucket::new(10.0, 0.001).unwrap();
        bucket.penalty(5.0).unwrap();
        bucket.penalty(10.0).unwrap();
        let r = bucket.try_consume(1.0).unwrap();
        assert!(!r.allowed);
    }

    #[test]
    fn reward_is_capped_at_capacity() {
        let bucket = LocalBucket::new(10.0, 1.0).unwrap();
        bucket.try_consume(5.0).unwrap();
        bucket.reward(100.0).unwrap();
        assert_eq!(bucket.available_tokens(), 10);
    }

    #[test]
    fn block_denies_consume_until_expiry_and_unblock_is_idempotent() {
        let bucket = LocalBucket::new(10.0, 1.0).unwrap();
        bucket.block(Duration::from_secs(60)).unwrap();
        assert!(bucket.is_blocked());
        let r = bucket.try_consume(1.0).unwrap();
        assert!(!r.allowed);
        assert_eq!(r.reason, Some(DenyReason::Blocked));

        assert!(bucket.unblock());
        assert!(!bucket.unblock());
        assert!(!bucket.is_blocked());
    }

    #[test]
    fn block_rejects_zero_duration() {
        let bucket = LocalBucket::new(10.0, 1.0).unwrap();
        assert!(bucket.block(Duration::ZERO).is_err());
    }

    #[test]
    fn reset_validates_bounds() {
        let bucket = LocalBucket::new(10.0, 1.0).unwrap();
        bucket.try_consume(10.0).unwrap();
        bucket.reset(None).unwrap();
        assert_eq!(bucket.available_tokens(), 10);
        assert!(bucket.reset(Some(-1.0)).is_err());
        assert!(bucket.reset(Some(11.0)).is_err());
    }

    #[test]
    fn snapshot_round_trips() {
        let bucket = LocalBucket::new(100.0, 10.0).unwrap();
        bucket.try_consume(30.0).unwrap();
        let snap = bucket.snapshot();
        let restored = LocalBucket::restore(snap).unwrap();
        assert_eq!(restored.available_tokens(), 70);
    }

    #[test]
    fn cost_greater_than_capacity_is_always_denied() {
        let bucket = LocalBucket::new(10.0, 1.0).unwrap();
        let r = bucket.try_consume(11.0).unwrap();
        assert!(!r.allowed);
    }
}
