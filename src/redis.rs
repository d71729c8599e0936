//! # Atomic Program — Distributed Token Bucket Storage
//!
//! This module is the shared-store half of the engine (component C2,
//! "AtomicScript" in the design). It stores bucket state as a Redis hash
//! with fields `tokens` and `last_refill_at`, and performs refill +
//! consume/penalty/reward in a single server-side Lua program so
//! concurrent clients never race between a read and a write.
//!
//! ## Why one program and not GET-then-SET
//!
//! ```text
//! Without Lua (race condition):           With Lua (atomic):
//! ┌────────────┐  ┌────────────┐          ┌────────────┐  ┌────────────┐
//! │ Instance A │  │ Instance B │          │ Instance A │  │ Instance B │
//! ├────────────┤  ├────────────┤          ├────────────┤  ├────────────┤
//! │ GET: 10    │  │ GET: 10    │          │ EVAL script│  │   wait...  │
//! │ tokens -= 1│  │ tokens -= 1│          │ (atomic)   │  │            │
//! │ SET: 9     │  │ SET: 9  ⚠️ │          │            │  │ EVAL script│
//! └────────────┘  └────────────┘          └────────────┘  └────────────┘
//!                 (Lost update!)                          (Both correct)
//! ```
//!
//! ## Key format
//!
//! Primary state lives at the caller-supplied key `K` as a Redis hash;
//! the companion block key is `K:block`. Both are owned exclusively by
//! one `DistributedBucket`.

use crate::error::ThrottlerError;
use redis::{Client, Commands, Connection};

/// The one atomic program: read state, refill, then either test-and-consume,
/// penalize, or reward, write state back, and set the key's TTL. Compiled
/// once per `redis::Script` value and invoked by SHA with fallback to full
/// text (handled internally by the `redis` crate's `Script` type).
const ATOMIC_PROGRAM: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local amount = tonumber(ARGV[3])
local now_ms = tonumber(ARGV[4])
local ttl_seconds = tonumber(ARGV[5])
local mode = ARGV[6]

local tokens
local last_refill_at

if redis.call('HEXISTS', key, 'tokens') == 1 then
    tokens = tonumber(redis.call('HGET', key, 'tokens'))
    last_refill_at = tonumber(redis.call('HGET', key, 'last_refill_at'))
else
    tokens = capacity
    last_refill_at = now_ms
end

local elapsed_ms = now_ms - last_refill_at
if elapsed_ms < 0 then elapsed_ms = 0 end
if elapsed_ms > 3600000 then elapsed_ms = 3600000 end
local elapsed_seconds = elapsed_ms / 1000.0

if elapsed_seconds >= 0.001 then
    local to_add = refill_rate * elapsed_seconds
    if to_add > 0 then
        tokens = math.min(capacity, tokens + to_add)
    end
    last_refill_at = now_ms
end

local tokens_before = tokens
local allowed = 0
local capped = 0

if mode == 'consume' then
    if tokens >= amount then
        tokens = tokens - amount
        allowed = 1
    end
elseif mode == 'penalty' then
    tokens = tokens - amount
elseif mode == 'reward' then
    local uncapped = tokens + amount
    if uncapped > capacity then
        tokens = capacity
        capped = 1
    else
        tokens = uncapped
    end
end

redis.call('HSET', key, 'tokens', tostring(tokens), 'last_refill_at', tostring(last_refill_at))
redis.call('EXPIRE', key, ttl_seconds)

return {allowed, tostring(tokens), tostring(tokens_before), capped}
"#;

/// Writes `tokens`/`last_refill_at` unconditionally and sets the TTL, used
/// by both `reset` and snapshot `import` — a plain transaction, no refill.
const WRITE_STATE_PROGRAM: &str = r#"
local key = KEYS[1]
redis.call('HSET', key, 'tokens', ARGV[1], 'last_refill_at', ARGV[2])
redis.call('EXPIRE', key, tonumber(ARGV[3]))
return 1
"#;

/// Outcome of a `consume` call against the shared store.
pub struct ConsumeOutcome {
    pub allowed: bool,
    pub tokens_after: f64,
    pub now_ms: u64,
}

/// Outcome of a `penalty`/`reward` call against the shared store.
pub struct AdjustOutcome {
    pub applied: f64,
    pub tokens_after: f64,
    pub tokens_before: f64,
    pub capped_at_capacity: bool,
}

/// Raw hash state of a key, as stored, without client-side refill applied.
pub struct RawState {
    pub tokens: f64,
    pub last_refill_at: u64,
}

/// Client for the shared token-bucket store. Holds a connection-pooled
/// `redis::Client`; every call opens (or reuses) a connection and is safe
/// to invoke concurrently from multiple tasks.
pub struct RedisClient {
    client: Client,
}

impl RedisClient {
    pub fn new(url: &str) -> Result<Self, ThrottlerError> {
        let client = Client::open(url)
            .map_err(|e| ThrottlerError::RedisError(format!("failed to create Redis client: {}", e)))?;
        Ok(Self { client })
    }

    fn get_connection(&self) -> Result<Connection, ThrottlerError> {
        self.client
            .get_connection()
            .map_err(|e| ThrottlerError::RedisError(format!("failed to get Redis connection: {}", e)))
    }

    /// Liveness probe. Never raises — returns `false` on any failure so
    /// `health_check` can stay infallible per the error handling design.
    pub fn ping(&self) -> bool {
        (|| -> Result<(), ThrottlerError> {
            let mut conn = self.get_connection()?;
            let pong: String = redis::cmd("PING")
                .query(&mut conn)
                .map_err(|e| ThrottlerError::RedisError(format!("PING failed: {}", e)))?;
            if pong == "PONG" {
                Ok(())
            } else {
                Err(ThrottlerError::RedisError(format!("unexpected PING reply: {}", pong)))
            }
        })()
        .is_ok()
    }

    /// Test-and-consume `cost` tokens at `key`, initializing the bucket to
    /// full capacity on first use.
    pub fn consume(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
        cost: f64,
        now_ms: u64,
        ttl_seconds: u64,
    ) -> Result<ConsumeOutcome, ThrottlerError> {
        let mut conn = self.get_connection()?;
        let (allowed, tokens_after, _tokens_before, _capped): (i64, String, String, i64) =
            redis::Script::new(ATOMIC_PROGRAM)
                .key(key)
                .arg(capacity)
                .arg(refill_rate)
                .arg(cost)
                .arg(now_ms)
                .arg(ttl_seconds)
                .arg("consume")
                .invoke(&mut conn)
                .map_err(|e| ThrottlerError::RedisError(format!("atomic consume failed: {}", e)))?;

        Ok(ConsumeOutcome {
            allowed: allowed == 1,
            tokens_after: parse_f64(&tokens_after)?,
            now_ms,
        })
    }

    pub fn penalty(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
        points: f64,
        now_ms: u64,
        ttl_seconds: u64,
    ) -> Result<AdjustOutcome, ThrottlerError> {
        let mut conn = self.get_connection()?;
        let (_allowed, tokens_after, tokens_before, _capped): (i64, String, String, i64) =
            redis::Script::new(ATOMIC_PROGRAM)
                .key(key)
                .arg(capacity)
                .arg(refill_rate)
                .arg(points)
                .arg(now_ms)
                .arg(ttl_seconds)
                .arg("penalty")
                .invoke(&mut conn)
                .map_err(|e| ThrottlerError::RedisError(format!("atomic penalty failed: {}", e)))?;

        Ok(AdjustOutcome {
            applied: points,
            tokens_after: parse_f64(&tokens_after)?,
            tokens_before: parse_f64(&tokens_before)?,
            capped_at_capacity: false,
        })
    }

    pub fn reward(
        &self,
        key: &str,
        capacity: f64,
        refill_rate: f64,
        points: f64,
        now_ms: u64,
        ttl_seconds: u64,
    ) -> Result<AdjustOutcome, ThrottlerError> {
        let mut conn = self.get_connection()?;
        let (_allowed, tokens_after, tokens_before, capped): (i64, String, String, i64) =
            redis::Script::new(ATOMIC_PROGRAM)
                .key(key)
                .arg(capacity)
                .arg(refill_rate)
                .arg(points)
                .arg(now_ms)
                .arg(ttl_seconds)
                .arg("reward")
                .invoke(&mut conn)
                .map_err(|e| ThrottlerError::RedisError(format!("atomic reward failed: {}", e)))?;

        Ok(AdjustOutcome {
            applied: points,
            tokens_after: parse_f64(&tokens_after)?,
            tokens_before: parse_f64(&tokens_before)?,
            capped_at_capacity: capped == 1,
        })
    }

    /// Unconditionally writes `tokens`/`last_refill_at`, used by `reset`
    /// and by snapshot `import`. No refill step — the caller supplies the
    /// final values directly.
    pub fn write_state(&self, key: &str, tokens: f64, last_refill_at: u64, ttl_seconds: u64) -> Result<(), ThrottlerError> {
        let mut conn = self.get_connection()?;
        let _: i64 = redis::Script::new(WRITE_STATE_PROGRAM)
            .key(key)
            .arg(tokens.to_string())
            .arg(last_refill_at.to_string())
            .arg(ttl_seconds)
            .invoke(&mut conn)
            .map_err(|e| ThrottlerError::RedisError(format!("write_state failed: {}", e)))?;
        Ok(())
    }

    /// Reads the raw hash fields for `key`, without applying refill. Used
    /// by full-state snapshot export.
    pub fn read_state(&self, key: &str) -> Result<Option<RawState>, ThrottlerError> {
        let mut conn = self.get_connection()?;
        let tokens: Option<String> = conn
            .hget(key, "tokens")
            .map_err(|e| ThrottlerError::RedisError(format!("HGET tokens failed: {}", e)))?;
        let last_refill_at: Option<String> = conn
            .hget(key, "last_refill_at")
            .map_err(|e| ThrottlerError::RedisError(format!("HGET last_refill_at failed: {}", e)))?;

        match (tokens, last_refill_at) {
            (Some(t), Some(l)) => Ok(Some(RawState {
                tokens: parse_f64(&t)?,
                last_refill_at: l
                    .parse()
                    .map_err(|_| ThrottlerError::SerializationError("malformed last_refill_at in store".to_string()))?,
            })),
            _ => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> Result<(), ThrottlerError> {
        let mut conn = self.get_connection()?;
        let _: () = conn
            .del(key)
            .map_err(|e| ThrottlerError::RedisError(format!("DEL failed: {}", e)))?;
        Ok(())
    }

    /// Writes the block key with the given absolute unblock time, setting
    /// the store-native TTL so expiry is automatic.
    pub fn set_block(&self, block_key: &str, block_until_ms: u64, ttl_seconds: u64) -> Result<(), ThrottlerError> {
        let mut conn = self.get_connection()?;
        let _: () = conn
            .set_ex(block_key, block_until_ms, ttl_seconds)
            .map_err(|e| ThrottlerError::RedisError(format!("SET block key failed: {}", e)))?;
        Ok(())
    }

    /// Reads the block key. Returns `None` if absent. Does not interpret
    /// expiry — the caller compares against its own clock.
    pub fn get_block(&self, block_key: &str) -> Result<Option<u64>, ThrottlerError> {
        let mut conn = self.get_connection()?;
        let value: Option<u64> = conn
            .get(block_key)
            .map_err(|e| ThrottlerError::RedisError(format!("GET block key failed: {}", e)))?;
        Ok(value)
    }

    pub fn delete_block(&self, block_key: &str) -> Result<(), ThrottlerError> {
        let mut conn = self.get_connection()?;
        let _: () = conn
            .del(block_key)
            .map_err(|e| ThrottlerError::RedisError(format!("DEL block key failed: {}", e)))?;
        Ok(())
    }

    pub fn exists(&self, key: &str) -> Result<bool, ThrottlerError> {
        let mut conn = self.get_connection()?;
        let exists: bool = conn
            .exists(key)
            .map_err(|e| ThrottlerError::RedisError(format!("EXISTS failed: {}", e)))?;
        Ok(exists)
    }
}

fn parse_f64(s: &str) -> Result<f64, ThrottlerError> {
    s.parse()
        .map_err(|_| ThrottlerError::SerializationError(format!("malformed numeric field from store: {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The program text must not change shape without a version bump
    /// elsewhere in the codec — this just guards against accidental typos
    /// in the embedded script breaking the KEYS/ARGV contract.
    #[test]
    fn atomic_program_references_expected_argv_slots() {
        for i in 1..=6 {
            assert!(ATOMIC_PROGRAM.contains(&format!("ARGV[{}]", i)));
        }
        assert!(ATOMIC_PROGRAM.contains("KEYS[1]"));
    }

    #[test]
    fn write_state_program_references_expected_argv_slots() {
        for i in 1..=3 {
            assert!(WRITE_STATE_PROGRAM.contains(&format!("ARGV[{}]", i)));
        }
    }

    #[test]
    fn parse_f64_rejects_garbage() {
        assert!(parse_f64("not-a-number").is_err());
        assert!(parse_f64("42.5").is_ok());
    }

    // Redis-touching behavior (actual EVAL round-trips) requires a live
    // server and is exercised in `tests/integration_tests.rs` behind
    // `#[ignore]`.
}
