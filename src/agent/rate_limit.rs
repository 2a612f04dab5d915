//! Per-caller token bucket
//!
//! Each caller owns a bucket of `burst` tokens refilled continuously at
//! `refill_per_sec`. One retrieval turn costs one token. Buckets are shared
//! across concurrent turns and every acquisition is atomic under one lock.
//!
//! A bucket that has refilled to `burst` is indistinguishable from a new
//! one, so such buckets are dropped every `PRUNE_EVERY` checks to keep the
//! map bounded by recently active callers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::errors::{AgentError, Result};

/// Checks between automatic prunes of idle buckets
pub const PRUNE_EVERY: u64 = 256;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Default)]
struct LimiterState {
    buckets: HashMap<String, Bucket>,
    checks: u64,
}

/// Token-bucket limiter keyed by caller identity
pub struct RateLimiter {
    burst: f64,
    refill_per_sec: f64,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            burst: f64::from(config.burst.max(1)),
            refill_per_sec: config.refill_per_sec.max(0.0),
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Take one token for `caller`, or return how long until one is available
    pub fn check(&self, caller: &str) -> std::result::Result<(), Duration> {
        self.check_at(caller, Instant::now())
    }

    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn refilled(&self, bucket: &Bucket, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        (bucket.tokens + elapsed * self.refill_per_sec).min(self.burst)
    }

    fn check_at(&self, caller: &str, now: Instant) -> std::result::Result<(), Duration> {
        let mut state = self.state();
        state.checks += 1;
        if state.checks % PRUNE_EVERY == 0 {
            self.prune_locked(&mut state, now);
        }

        let bucket = state.buckets.entry(caller.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        bucket.tokens = self.refilled(bucket, now);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - bucket.tokens;
        let wait = if self.refill_per_sec > 0.0 {
            Duration::try_from_secs_f64(missing / self.refill_per_sec).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        };
        Err(wait)
    }

    /// Acquire a permit or fail with `RateLimited`
    pub fn acquire(&self, caller: &str) -> Result<()> {
        self.check(caller).map_err(|wait| AgentError::RateLimited {
            caller: caller.to_string(),
            retry_after_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Tokens currently available to `caller` (without consuming any)
    pub fn available(&self, caller: &str) -> f64 {
        let now = Instant::now();
        match self.state().buckets.get(caller) {
            Some(bucket) => self.refilled(bucket, now),
            None => self.burst,
        }
    }

    /// Drop buckets that have refilled to `burst`. Returns how many went.
    pub fn prune_idle(&self) -> usize {
        self.prune_locked(&mut self.state(), Instant::now())
    }

    fn prune_locked(&self, state: &mut LimiterState, now: Instant) -> usize {
        let before = state.buckets.len();
        state.buckets.retain(|_, bucket| self.refilled(bucket, now) < self.burst);
        let removed = before - state.buckets.len();
        if removed > 0 {
            debug!(removed, remaining = state.buckets.len(), "idle rate-limit buckets pruned");
        }
        removed
    }

    /// Callers currently tracked
    pub fn tracked_callers(&self) -> usize {
        self.state().buckets.len()
    }

    /// Forget every bucket
    pub fn reset(&self) {
        self.state().buckets.clear();
    }
}
