//! # Snapshot Codec
//!
//! Versioned serialize/restore for [`crate::token_bucket::LocalBucket`] and
//! [`crate::distributed::DistributedBucket`]. The wire shape is documented
//! in full in the project spec and is meant to be bit-level compatible
//! across independent implementations of this engine, so field names and
//! types here are load-bearing — do not rename without bumping `version`.
//!
//! Three shapes exist:
//!
//! - [`BucketSnapshot`] — full state of a `LocalBucket`, or of a
//!   `DistributedBucket`'s full-state export.
//! - [`DistributedConfigSnapshot`] — configuration only, enough to
//!   reconnect a fresh `DistributedBucket` to already-alive Redis-side
//!   state.
//!
//! The codec never silently migrates between versions: an unknown
//! `version` is rejected outright.

use crate::error::ThrottlerError;
use serde::{Deserialize, Serialize};

/// The only snapshot format version this codec understands.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Free-form provenance attached to every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    /// ISO-8601 timestamp of when the snapshot was taken.
    pub serialized_at: String,
    /// Name of the struct the snapshot was taken from (`"LocalBucket"` or
    /// `"DistributedBucket"`), kept for human debugging only.
    pub class_name: String,
}

impl SnapshotMetadata {
    pub fn now(class_name: &str) -> Self {
        Self {
            serialized_at: chrono::Utc::now().to_rfc3339(),
            class_name: class_name.to_string(),
        }
    }
}

/// Full state snapshot of a bucket: enough to reconstruct an equivalent
/// bucket anywhere, modulo monotonic clock advancement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BucketSnapshot {
    pub version: u32,
    pub capacity: f64,
    /// May be negative: a penalty larger than current holdings leaves debt.
    pub tokens: f64,
    pub refill_rate: f64,
    /// Epoch milliseconds.
    pub last_refill_at: u64,
    /// Epoch milliseconds, if a block is currently in effect.
    pub block_until: Option<u64>,
    pub metadata: SnapshotMetadata,
}

impl BucketSnapshot {
    /// Validates the invariants the codec promises to enforce: a known
    /// version, finite numerics, non-negative capacity/refill_rate, and
    /// `tokens <= capacity`. `tokens` itself may be negative (debt).
    pub fn validate(&self) -> Result<(), ThrottlerError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ThrottlerError::SerializationError(format!(
                "unknown snapshot version {}, expected {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(ThrottlerError::SerializationError(
                "capacity must be a finite positive number".to_string(),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(ThrottlerError::SerializationError(
                "refill_rate must be a finite positive number".to_string(),
            ));
        }
        if !self.tokens.is_finite() {
            return Err(ThrottlerError::SerializationError(
                "tokens must be a finite number".to_string(),
            ));
        }
        if self.tokens > self.capacity {
            return Err(ThrottlerError::SerializationError(format!(
                "tokens ({}) exceeds capacity ({})",
                self.tokens, self.capacity
            )));
        }
        if let Some(block_until) = self.block_until {
            if block_until == 0 {
                return Err(ThrottlerError::SerializationError(
                    "block_until must be a positive epoch-millis timestamp".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ThrottlerError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ThrottlerError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Configuration-only snapshot of a `DistributedBucket` — enough to
/// reconnect a new process to an already-alive Redis-side bucket without
/// re-reading its current token count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributedConfigSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub key: String,
    pub capacity: f64,
    pub refill_rate: f64,
    pub ttl_seconds: u64,
}

impl DistributedConfigSnapshot {
    pub fn new(key: impl Into<String>, capacity: f64, refill_rate: f64, ttl_seconds: u64) -> Self {
        Self {
            kind: "distributed".to_string(),
            version: SNAPSHOT_VERSION,
            key: key.into(),
            capacity,
            refill_rate,
            ttl_seconds,
        }
    }

    pub fn validate(&self) -> Result<(), ThrottlerError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ThrottlerError::SerializationError(format!(
                "unknown snapshot version {}, expected {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        if self.kind != "distributed" {
            return Err(ThrottlerError::SerializationError(format!(
                "expected type \"distributed\", got {:?}",
                self.kind
            )));
        }
        if self.key.is_empty() {
            return Err(ThrottlerError::SerializationError("key must not be empty".to_string()));
        }
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(ThrottlerError::SerializationError(
                "capacity must be a finite positive number".to_string(),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(ThrottlerError::SerializationError(
                "refill_rate must be a finite positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Full-state export of a `DistributedBucket`: the result of reading `K`
/// from the store, wrapped with enough metadata to `import` it elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributedFullSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
    pub ttl_seconds: u64,
    #[serde(flatten)]
    pub bucket: BucketSnapshot,
}

impl DistributedFullSnapshot {
    pub fn validate(&self) -> Result<(), ThrottlerError> {
        if self.kind != "distributed-full" {
            return Err(ThrottlerError::SerializationError(format!(
                "expected type \"distributed-full\", got {:?}",
                self.kind
            )));
        }
        if self.key.is_empty() {
            return Err(ThrottlerError::SerializationError("key must not be empty".to_string()));
        }
        self.bucket.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BucketSnapshot {
        BucketSnapshot {
            version: SNAPSHOT_VERSION,
            capacity: 100.0,
            tokens: 42.5,
            refill_rate: 10.0,
            last_refill_at: 1_700_000_000_000,
            block_until: None,
            metadata: SnapshotMetadata::now("LocalBucket"),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let snap = sample();
        let json = snap.to_json().unwrap();
        let restored = BucketSnapshot::from_json(&json).unwrap();
        assert_eq!(snap, restored);
    }

    #[test]
    fn rejects_tokens_above_capacity() {
        let mut snap = sample();
        snap.tokens = 200.0;
        assert!(snap.validate().is_err());
    }

    #[test]
    fn rejects_unknown_version() {
        let mut snap = sample();
        snap.version = 2;
        assert!(snap.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_tokens() {
        let mut snap = sample();
        snap.tokens = f64::NAN;
        assert!(snap.validate().is_err());
    }

    #[test]
    fn allows_negative_tokens_as_debt() {
        let mut snap = sample();
        snap.tokens = -30.0;
        assert!(snap.validate().is_ok());
    }

    #[test]
    fn config_snapshot_validates() {
        let snap = DistributedConfigSnapshot::new("user:123", 100.0, 10.0, 3600);
        assert!(snap.validate().is_ok());
    }
}
