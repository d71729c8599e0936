//! # Distributed Bucket
//!
//! Component C3: wraps the shared-store atomic program (`redis.rs`) with
//! an embedded insurance [`LocalBucket`] and an [`InsuranceSupervisor`]
//! failover state machine, and owns the primary key `K` and block key
//! `K:block` for one rate-limited entity.
//!
//! Dispatch for every operation:
//!
//! 1. If `K:block` holds an unexpired instant, deny with `reason:"blocked"`.
//! 2. If the supervisor says insurance is active, route to the embedded
//!    `LocalBucket`, tagging the event `source:"insurance"`.
//! 3. Else invoke the atomic program. On success, tag `source:"redis"` and
//!    tell the supervisor about the success.
//! 4. On any store error, emit `store-error`, tell the supervisor about the
//!    failure, and fall through to the embedded `LocalBucket`.

use crate::error::ThrottlerError;
use crate::events::{DenyReason, Event, EventBus, Source, SubscriptionId};
use crate::redis::RedisClient;
use crate::snapshot::{BucketSnapshot, DistributedConfigSnapshot, DistributedFullSnapshot, SnapshotMetadata};
use crate::supervisor::{self, InsuranceSupervisor};
use crate::token_bucket::{ConsumeResult, LocalBucket, PenaltyResult, RewardResult};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use parking_lot::Mutex;

/// Configuration for a single `DistributedBucket`.
#[derive(Debug, Clone)]
pub struct DistributedBucketConfig {
    pub key: String,
    pub capacity: f64,
    pub refill_rate: f64,
    /// Inactivity TTL applied to the primary key on every write.
    pub ttl_seconds: u64,
    /// When `false`, a store failure is fail-open (caller sees the error)
    /// rather than fail-soft (routed to the insurance bucket). Fixed at
    /// construction time; never changes dynamically.
    pub insurance_enabled: bool,
    pub insurance_capacity: Option<f64>,
    pub insurance_refill_rate: Option<f64>,
}

impl DistributedBucketConfig {
    pub fn validate(&self) -> Result<(), ThrottlerError> {
        if self.key.is_empty() {
            return Err(ThrottlerError::InvalidArgument("key must not be empty".to_string()));
        }
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "capacity must be a finite positive number".to_string(),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "refill_rate must be a finite positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// A rate-limited entity backed by the shared store, with in-process
/// insurance fallback. Safe to share across tasks via `Arc<DistributedBucket>`.
pub struct DistributedBucket {
    store: Arc<RedisClient>,
    config: DistributedBucketConfig,
    supervisor: Mutex<InsuranceSupervisor>,
    insurance: LocalBucket,
    events: Mutex<EventBus>,
}

impl DistributedBucket {
    pub fn new(store: Arc<RedisClient>, config: DistributedBucketConfig) -> Result<Self, ThrottlerError> {
        config.validate()?;
        let insurance_capacity = config
            .insurance_capacity
            .unwrap_or_else(|| supervisor::default_insurance_capacity(config.capacity));
        let insurance_refill_rate = config
            .insurance_refill_rate
            .unwrap_or_else(|| supervisor::default_insurance_refill_rate(config.refill_rate));

        Ok(Self {
            store,
            config,
            supervisor: Mutex::new(InsuranceSupervisor::new(insurance_capacity, insurance_refill_rate)),
            insurance: LocalBucket::new(insurance_capacity, insurance_refill_rate)?,
            events: Mutex::new(EventBus::new()),
        })
    }

    fn block_key(&self) -> String {
        format!("{}:block", self.config.key)
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.lock().subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.events.lock().unsubscribe(id);
    }

    pub fn is_insurance_active(&self) -> bool {
        self.supervisor.lock().is_active()
    }

    fn is_blocked_in_store(&self, now: u64) -> Result<bool, ThrottlerError> {
        match self.store.get_block(&self.block_key())? {
            Some(until) if until > now => Ok(true),
            Some(_) => {
                let _ = self.store.delete_block(&self.block_key());
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn remaining_block_ms(&self, now: u64) -> Result<Option<u64>, ThrottlerError> {
        match self.store.get_block(&self.block_key())? {
            Some(until) if until > now => Ok(Some(until - now)),
            _ => Ok(None),
        }
    }

    pub fn try_consume(&self, cost: f64) -> Result<ConsumeResult, ThrottlerError> {
        if !cost.is_finite() || cost <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "cost must be a finite positive number".to_string(),
            ));
        }
        let now = now_ms();

        match self.remaining_block_ms(now) {
            Ok(Some(retry_after_ms)) => {
                let remaining_tokens = self.insurance.available_tokens();
                self.events.lock().publish(Event::Denied {
                    remaining_tokens,
                    cost,
                    retry_after_ms,
                    reason: DenyReason::Blocked,
                    source: Source::Redis,
                    timestamp: Event::now_ms(),
                });
                return Ok(ConsumeResult {
                    allowed: false,
                    remaining_tokens,
                    cost,
                    retry_after_ms,
                    reason: Some(DenyReason::Blocked),
                });
            }
            Ok(None) => {}
            Err(err) => {
                self.on_store_failure("block-check", &err);
                return if self.config.insurance_enabled {
                    self.insurance.try_consume_from(cost, Source::Insurance)
                } else {
                    Err(err)
                };
            }
        }

        if self.is_insurance_active() {
            return self.insurance.try_consume_from(cost, Source::Insurance);
        }

        match self.store.consume(
            &self.config.key,
            self.config.capacity,
            self.config.refill_rate,
            cost,
            now,
            self.config.ttl_seconds,
        ) {
            Ok(outcome) => {
                self.on_store_success();
                let remaining_tokens = outcome.tokens_after.floor() as i64;
                if outcome.allowed {
                    self.events.lock().publish(Event::Allowed {
                        remaining_tokens,
                        cost,
                        source: Source::Redis,
                        timestamp: Event::now_ms(),
                    });
                    Ok(ConsumeResult { allowed: true, remaining_tokens, cost, retry_after_ms: 0, reason: None })
                } else {
                    let deficit = cost - outcome.tokens_after;
                    let retry_after_ms = if self.config.refill_rate > 0.0 {
                        ((deficit / self.config.refill_rate) * 1000.0).ceil() as u64
                    } else {
                        u64::MAX
                    };
                    self.events.lock().publish(Event::Denied {
                        remaining_tokens,
                        cost,
                        retry_after_ms,
                        reason: DenyReason::InsufficientTokens,
                        source: Source::Redis,
                        timestamp: Event::now_ms(),
                    });
                    Ok(ConsumeResult {
                        allowed: false,
                        remaining_tokens,
                        cost,
                        retry_after_ms,
                        reason: Some(DenyReason::InsufficientTokens),
                    })
                }
            }
            Err(err) => {
                self.on_store_failure("consume", &err);
                if self.config.insurance_enabled {
                    self.insurance.try_consume_from(cost, Source::Insurance)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn penalty(&self, points: f64) -> Result<PenaltyResult, ThrottlerError> {
        if !points.is_finite() || points <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "penalty points must be a finite positive number".to_string(),
            ));
        }
        let now = now_ms();
        if self.is_insurance_active() {
            return self.insurance.penalty_from(points, Source::Insurance);
        }
        match self.store.penalty(
            &self.config.key,
            self.config.capacity,
            self.config.refill_rate,
            points,
            now,
            self.config.ttl_seconds,
        ) {
            Ok(outcome) => {
                self.on_store_success();
                self.events.lock().publish(Event::Penalty {
                    applied: outcome.applied,
                    remaining_tokens: outcome.tokens_after,
                    before: outcome.tokens_before,
                    source: Source::Redis,
                    timestamp: Event::now_ms(),
                });
                Ok(PenaltyResult { applied: outcome.applied, remaining_tokens: outcome.tokens_after })
            }
            Err(err) => {
                self.on_store_failure("penalty", &err);
                if self.config.insurance_enabled {
                    self.insurance.penalty_from(points, Source::Insurance)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn reward(&self, points: f64) -> Result<RewardResult, ThrottlerError> {
        if !points.is_finite() || points <= 0.0 {
            return Err(ThrottlerError::InvalidArgument(
                "reward points must be a finite positive number".to_string(),
            ));
        }
        let now = now_ms();
        if self.is_insurance_active() {
            return self.insurance.reward_from(points, Source::Insurance);
        }
        match self.store.reward(
            &self.config.key,
            self.config.capacity,
            self.config.refill_rate,
            points,
            now,
            self.config.ttl_seconds,
        ) {
            Ok(outcome) => {
                self.on_store_success();
                self.events.lock().publish(Event::Reward {
                    applied: outcome.applied,
                    remaining_tokens: outcome.tokens_after,
                    before: outcome.tokens_before,
                    capped_at_capacity: outcome.capped_at_capacity,
                    source: Source::Redis,
                    timestamp: Event::now_ms(),
                });
                Ok(RewardResult {
                    applied: outcome.applied,
                    remaining_tokens: outcome.tokens_after,
                    capped_at_capacity: outcome.capped_at_capacity,
                })
            }
            Err(err) => {
                self.on_store_failure("reward", &err);
                if self.config.insurance_enabled {
                    self.insurance.reward_from(points, Source::Insurance)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Writes the block key with the store's native TTL set to
    /// `ceil(duration_ms / 1000) + 1` seconds. Block state lives only in
    /// the shared store — a documented fail-open stance; the insurance
    /// bucket's capacity limit still applies during an outage.
    pub fn block(&self, duration: Duration) -> Result<u64, ThrottlerError> {
        if duration.is_zero() {
            return Err(ThrottlerError::InvalidArgument("block duration must be positive".to_string()));
        }
        let now = now_ms();
        let block_until = now + duration.as_millis() as u64;
        let ttl_seconds = (duration.as_millis() as u64).div_ceil(1000) + 1;
        self.store.set_block(&self.block_key(), block_until, ttl_seconds)?;
        self.events.lock().publish(Event::Blocked {
            block_duration_ms: duration.as_millis() as u64,
            block_until,
            timestamp: Event::now_ms(),
        });
        Ok(block_until)
    }

    pub fn unblock(&self) -> Result<bool, ThrottlerError> {
        let now = now_ms();
        let was_blocked = self.remaining_block_ms(now)?.is_some();
        self.store.delete_block(&self.block_key())?;
        self.events.lock().publish(Event::Unblocked { was_blocked, timestamp: Event::now_ms() });
        Ok(was_blocked)
    }

    pub fn is_blocked(&self) -> Result<bool, ThrottlerError> {
        let now = now_ms();
        self.is_blocked_in_store(now)
    }

    /// Resets the primary key to `tokens` (default capacity) using the
    /// same write-shape as the atomic program's final step.
    pub fn reset(&self, tokens: Option<f64>) -> Result<(), ThrottlerError> {
        let new_tokens = tokens.unwrap_or(self.config.capacity);
        if !new_tokens.is_finite() || new_tokens < 0.0 || new_tokens > self.config.capacity {
            return Err(ThrottlerError::InvalidArgument(format!(
                "reset tokens must be within [0, {}]",
                self.config.capacity
            )));
        }
        let now = now_ms();
        let old_tokens = self
            .store
            .read_state(&self.config.key)?
            .map(|raw| raw.tokens)
            .unwrap_or(self.config.capacity);
        self.store.write_state(&self.config.key, new_tokens, now, self.config.ttl_seconds)?;
        self.insurance.reset(None)?;
        self.events.lock().publish(Event::Reset {
            old_tokens,
            new_tokens,
            capacity: self.config.capacity,
            timestamp: Event::now_ms(),
        });
        Ok(())
    }

    /// Removes the primary key and block key entirely.
    pub fn delete(&self) -> Result<(), ThrottlerError> {
        self.store.delete(&self.config.key)?;
        self.store.delete_block(&self.block_key())?;
        Ok(())
    }

    /// Liveness probe against the shared store. Never raises, and MUST NOT
    /// touch supervisor state — probes do not participate in failover.
    pub fn health_check(&self) -> bool {
        self.store.ping()
    }

    /// Whole tokens currently available, without consuming any. Reads the
    /// insurance bucket while insurance is active, otherwise projects the
    /// store's raw state forward through the refill formula. On store
    /// error, falls back to the insurance bucket's count without touching
    /// supervisor state — this is a read, not a routed operation.
    pub fn available_tokens(&self) -> i64 {
        if self.is_insurance_active() {
            return self.insurance.available_tokens();
        }
        match self.store.read_state(&self.config.key) {
            Ok(Some(raw)) => {
                let now = now_ms();
                let elapsed_ms = now.saturating_sub(raw.last_refill_at).min(3_600_000);
                let elapsed_seconds = elapsed_ms as f64 / 1000.0;
                let projected = if elapsed_seconds >= 0.001 {
                    (raw.tokens + self.config.refill_rate * elapsed_seconds).min(self.config.capacity)
                } else {
                    raw.tokens
                };
                projected.floor() as i64
            }
            Ok(None) => self.config.capacity.floor() as i64,
            Err(_) => self.insurance.available_tokens(),
        }
    }

    pub fn config(&self) -> &DistributedBucketConfig {
        &self.config
    }

    /// Configuration-only snapshot — enough to reconnect a fresh
    /// `DistributedBucket` to the already-alive store-side state.
    pub fn config_snapshot(&self) -> DistributedConfigSnapshot {
        DistributedConfigSnapshot::new(
            self.config.key.clone(),
            self.config.capacity,
            self.config.refill_rate,
            self.config.ttl_seconds,
        )
    }

    /// Full-state export: reads `K` from the store and wraps it in the
    /// same shape as a `LocalBucket` snapshot.
    pub fn export_full_snapshot(&self) -> Result<DistributedFullSnapshot, ThrottlerError> {
        let raw = self
            .store
            .read_state(&self.config.key)?
            .ok_or_else(|| ThrottlerError::RedisError(format!("no state at key {}", self.config.key)))?;

        Ok(DistributedFullSnapshot {
            kind: "distributed-full".to_string(),
            key: self.config.key.clone(),
            ttl_seconds: self.config.ttl_seconds,
            bucket: BucketSnapshot {
                version: crate::snapshot::SNAPSHOT_VERSION,
                capacity: self.config.capacity,
                tokens: raw.tokens,
                refill_rate: self.config.refill_rate,
                last_refill_at: raw.last_refill_at,
                block_until: None,
                metadata: SnapshotMetadata::now("DistributedBucket"),
            },
        })
    }

    /// Imports a full-state snapshot by writing `tokens`/`last_refill_at`
    /// into the store atomically, in one transaction covering both field
    /// writes plus the TTL.
    pub fn import_full_snapshot(&self, snapshot: &DistributedFullSnapshot) -> Result<(), ThrottlerError> {
        snapshot.validate()?;
        self.store.write_state(
            &snapshot.key,
            snapshot.bucket.tokens,
            snapshot.bucket.last_refill_at,
            snapshot.ttl_seconds,
        )
    }

    fn on_store_success(&self) {
        let recovered = self.supervisor.lock().record_success(&self.events.lock());
        if recovered {
            let _ = self.insurance.reset(None);
        }
    }

    fn on_store_failure(&self, operation: &str, err: &ThrottlerError) {
        self.events.lock().publish(Event::StoreError {
            operation: operation.to_string(),
            error: err.to_string(),
            timestamp: Event::now_ms(),
        });
        self.supervisor.lock().record_failure(&err.to_string(), &self.events.lock());
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

    fn unreachable_bucket() -> DistributedBucket {
        // Port 1 is never a live Redis server in test environments, so every
        // store call fails fast with a connection error.
        let store = Arc::new(RedisClient::new("redis://127.0.0.1:1").unwrap());
        DistributedBucket::new(
            store,
            DistributedBucketConfig {
                key: "test-key".to_string(),
                capacity: 10.0,
                refill_rate: 1.0,
                ttl_seconds: 60,
                insurance_enabled: true,
                insurance_capacity: None,
                insurance_refill_rate: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn block_check_store_error_falls_through_to_insurance() {
        let bucket = unreachable_bucket();
        let result = bucket.try_consume(1.0).unwrap();
        assert!(result.allowed);
        assert!(bucket.is_insurance_active());
    }

    #[test]
    fn store_outage_keeps_insurance_active_across_repeated_calls() {
        let bucket = unreachable_bucket();
        for _ in 0..10 {
            assert!(bucket.try_consume(0.1).is_ok());
        }
        assert!(bucket.is_insurance_active());
    }
}
