//! Per-operation token-bucket admission control.
//!
//! Every operation name gets its own [`TokenBucket`], created lazily on first
//! use and kept for the life of the process. Buckets come in two tiers:
//! a generous one for read operations and a stricter one for mutations,
//! chosen by [`OperationClass::of`] on the operation name.
//!
//! Admission is strictly non-blocking: [`RateLimiter::try_admit`] either
//! consumes a token or returns [`CoreError::RateLimited`] immediately. A
//! bucket refills to full capacity once its window has elapsed since the last
//! refill; there is no fractional trickle.
//!
//! # Examples
//!
//! ```rust
//! use milegraph::limiter::{RateLimiter, RateLimiterConfig, TierConfig};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(RateLimiterConfig {
//!     read: TierConfig::new(2, Duration::from_secs(60)),
//!     write: TierConfig::new(1, Duration::from_secs(60)),
//! });
//!
//! assert!(limiter.try_admit("milestone.get_by_id").is_ok());
//! assert!(limiter.try_admit("milestone.get_by_id").is_ok());
//! assert!(limiter.try_admit("milestone.get_by_id").is_err());
//! // Different operation names have independent buckets
//! assert!(limiter.try_admit("milestone.get_by_project").is_ok());
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::errors::CoreError;
use crate::types::OperationClass;

// ============================================================================
// Clock port
// ============================================================================

/// Time source for bucket refill decisions. Swappable for deterministic
/// tests; production uses [`SystemClock`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// System clock backed by `Instant::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Capacity and refill window for one admission tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierConfig {
    /// Tokens available in a full bucket.
    pub capacity: u32,
    /// Elapsed time after which the bucket refills to capacity.
    pub window: Duration,
}

impl TierConfig {
    #[must_use]
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window }
    }
}

/// Tier configuration for both operation classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub read: TierConfig,
    pub write: TierConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            read: TierConfig::new(100, Duration::from_secs(60)),
            write: TierConfig::new(20, Duration::from_secs(60)),
        }
    }
}

impl RateLimiterConfig {
    /// Resolve the configuration from the environment, falling back to the
    /// defaults. Recognized variables:
    ///
    /// - `MILEGRAPH_READ_CAPACITY`
    /// - `MILEGRAPH_WRITE_CAPACITY`
    /// - `MILEGRAPH_LIMITER_WINDOW_SECS` (shared by both tiers)
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        // Unparseable or out-of-range values fall back to the defaults.
        let capacity = |key: &str| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
        };
        let window = std::env::var("MILEGRAPH_LIMITER_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.read.window);
        Self {
            read: TierConfig::new(
                capacity("MILEGRAPH_READ_CAPACITY").unwrap_or(defaults.read.capacity),
                window,
            ),
            write: TierConfig::new(
                capacity("MILEGRAPH_WRITE_CAPACITY").unwrap_or(defaults.write.capacity),
                window,
            ),
        }
    }

    /// The tier applied to an operation class.
    #[must_use]
    pub fn tier(&self, class: OperationClass) -> TierConfig {
        match class {
            OperationClass::Read => self.read,
            OperationClass::Write => self.write,
        }
    }
}

// ============================================================================
// Bucket
// ============================================================================

/// Token-bucket state for one operation name.
#[derive(Clone, Debug)]
pub struct TokenBucket {
    capacity: u32,
    window: Duration,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    #[must_use]
    pub fn new(tier: TierConfig, now: Instant) -> Self {
        Self {
            capacity: tier.capacity,
            window: tier.window,
            tokens: tier.capacity,
            last_refill: now,
        }
    }

    /// Consume one token if available, refilling first when the window has
    /// elapsed. Returns `false` on an empty bucket.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_refill) >= self.window {
            self.tokens = self.capacity;
            self.last_refill = now;
        }
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Tokens currently available (without refilling).
    #[must_use]
    pub fn available(&self) -> u32 {
        self.tokens
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Process-wide admission controller, one bucket per operation name.
///
/// Owned by the composition root (the service constructor) and shared by
/// reference; never a hidden global.
pub struct RateLimiter {
    buckets: DashMap<String, Mutex<TokenBucket>>,
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter with the system clock.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected clock (deterministic tests).
    #[must_use]
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
            clock,
        }
    }

    /// Attempt to admit one call of `operation`.
    ///
    /// Non-blocking: consumes a token or rejects with
    /// [`CoreError::RateLimited`]. The bucket is created on first use; the
    /// dashmap entry API guarantees exactly one bucket per name even under
    /// concurrent first access.
    pub fn try_admit(&self, operation: &str) -> Result<(), CoreError> {
        let class = OperationClass::of(operation);
        let now = self.clock.now();
        let bucket = self
            .buckets
            .entry(operation.to_string())
            .or_insert_with(|| Mutex::new(TokenBucket::new(self.config.tier(class), now)));

        let admitted = bucket.lock().unwrap().try_consume(now);
        if admitted {
            Ok(())
        } else {
            tracing::debug!(operation, %class, "admission rejected: bucket empty");
            Err(CoreError::RateLimited {
                operation: operation.to_string(),
                class,
            })
        }
    }

    /// Number of buckets created so far.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }
}
