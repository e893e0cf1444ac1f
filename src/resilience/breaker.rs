//! Per-operation circuit breaker.
//!
//! The breaker isolates a failing operation: after enough transient failures
//! inside the failure window it opens and fails every call fast, without
//! touching the underlying operation. Once the cool-down elapses it admits a
//! bounded number of trial calls (half-open); if they all succeed the circuit
//! closes, if any fails it reopens.
//!
//! State lives in atomics so concurrent callers never serialize on a lock;
//! the Open -> HalfOpen handover uses compare-exchange so exactly one caller
//! performs the transition and arms the trial budget.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; failures are counted.
    Closed = 0,
    /// Failing fast; calls are rejected until the cool-down elapses.
    Open = 1,
    /// Cool-down elapsed; a limited number of trial calls probe recovery.
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Tuning knobs for one breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Transient failures within `failure_window` before the circuit opens.
    pub failure_threshold: u32,
    /// Failures further apart than this do not accumulate.
    pub failure_window: Duration,
    /// How long an open circuit rejects calls before probing.
    pub cool_down: Duration,
    /// Trial calls admitted while half-open; all must succeed to close.
    pub half_open_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cool_down: Duration::from_secs(30),
            half_open_trials: 3,
        }
    }
}

/// Lock-free circuit breaker for a single operation name.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    /// Nanoseconds since `epoch`; 0 = never.
    last_failure_nanos: AtomicU64,
    opened_at_nanos: AtomicU64,
    trial_permits: AtomicU32,
    trial_successes: AtomicU32,
    config: CircuitBreakerConfig,
    epoch: Instant,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failures: AtomicU32::new(0),
            last_failure_nanos: AtomicU64::new(0),
            opened_at_nanos: AtomicU64::new(0),
            trial_permits: AtomicU32::new(0),
            trial_successes: AtomicU32::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Failures accumulated in the current window.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Ask permission to run one call.
    ///
    /// `Ok(())` admits the call. `Err(retry_after)` means the circuit is
    /// rejecting; `retry_after` is the remaining cool-down (zero once the
    /// half-open trial budget is exhausted and the probes are in flight).
    pub fn try_acquire(&self) -> Result<(), Duration> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = self.instant_of(self.opened_at_nanos.load(Ordering::Acquire));
                let elapsed = Instant::now().saturating_duration_since(opened_at);
                if elapsed >= self.config.cool_down {
                    // One caller wins the transition and arms the trial budget.
                    if self
                        .state
                        .compare_exchange(
                            CircuitState::Open as u8,
                            CircuitState::HalfOpen as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.trial_permits
                            .store(self.config.half_open_trials, Ordering::Release);
                        self.trial_successes.store(0, Ordering::Release);
                    }
                    self.acquire_trial_permit()
                } else {
                    Err(self.config.cool_down - elapsed)
                }
            }
            CircuitState::HalfOpen => self.acquire_trial_permit(),
        }
    }

    /// Record that an admitted call succeeded (or was rejected by a business
    /// rule, which counts as a healthy probe).
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.trial_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.half_open_trials
                    && self
                        .state
                        .compare_exchange(
                            CircuitState::HalfOpen as u8,
                            CircuitState::Closed as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.failures.store(0, Ordering::Release);
                    tracing::info!("circuit closed after successful trial calls");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a transient failure of an admitted call.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let now_nanos = self.nanos_of(now);

        // Failures outside the window start a fresh streak.
        let previous = self.last_failure_nanos.swap(now_nanos, Ordering::AcqRel);
        let within_window = previous != 0
            && now.saturating_duration_since(self.instant_of(previous)) <= self.config.failure_window;
        let failures = if within_window {
            self.failures.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.failures.store(1, Ordering::Release);
            1
        };

        match self.state() {
            CircuitState::HalfOpen => self.open(now_nanos),
            CircuitState::Closed => {
                if failures >= self.config.failure_threshold {
                    self.open(now_nanos);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, now_nanos: u64) {
        self.opened_at_nanos.store(now_nanos, Ordering::Release);
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        tracing::warn!(
            failures = self.failure_count(),
            cool_down = ?self.config.cool_down,
            "circuit opened"
        );
    }

    fn acquire_trial_permit(&self) -> Result<(), Duration> {
        let acquired = self
            .trial_permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |permits| {
                permits.checked_sub(1)
            })
            .is_ok();
        if acquired { Ok(()) } else { Err(Duration::ZERO) }
    }

    fn nanos_of(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn instant_of(&self, nanos: u64) -> Instant {
        self.epoch + Duration::from_nanos(nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn config(threshold: u32, cool_down_ms: u64, trials: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            failure_window: Duration::from_secs(60),
            cool_down: Duration::from_millis(cool_down_ms),
            half_open_trials: trials,
        }
    }

    #[test]
    fn starts_closed_and_admits() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn opens_at_threshold_and_fails_fast() {
        let cb = CircuitBreaker::new(config(3, 10_000, 1));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        let retry_after = cb.try_acquire().unwrap_err();
        assert!(retry_after > Duration::ZERO);
    }

    #[test]
    fn success_resets_failure_streak() {
        let cb = CircuitBreaker::new(config(3, 10_000, 1));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn cool_down_admits_exactly_the_trial_budget() {
        let cb = CircuitBreaker::new(config(1, 50, 2));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(70));
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_ok());
        // Budget of 2 exhausted
        assert_eq!(cb.try_acquire().unwrap_err(), Duration::ZERO);
    }

    #[test]
    fn all_trials_succeeding_closes_the_circuit() {
        let cb = CircuitBreaker::new(config(1, 50, 2));
        cb.record_failure();
        thread::sleep(Duration::from_millis(70));

        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_ok());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn trial_failure_reopens() {
        let cb = CircuitBreaker::new(config(1, 50, 3));
        cb.record_failure();
        thread::sleep(Duration::from_millis(70));

        assert!(cb.try_acquire().is_ok());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn stale_failures_do_not_accumulate() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            failure_window: Duration::from_millis(30),
            cool_down: Duration::from_secs(10),
            half_open_trials: 1,
        });
        cb.record_failure();
        thread::sleep(Duration::from_millis(50));
        // Outside the window: streak restarts at 1, circuit stays closed.
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn concurrent_trial_acquisition_respects_budget() {
        let cb = Arc::new(CircuitBreaker::new(config(1, 20, 4)));
        cb.record_failure();
        thread::sleep(Duration::from_millis(40));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cb = Arc::clone(&cb);
            handles.push(thread::spawn(move || u32::from(cb.try_acquire().is_ok())));
        }
        let admitted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 4);
    }

    #[test]
    fn concurrent_failures_do_not_panic() {
        let cb = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let cb = Arc::clone(&cb);
            handles.push(thread::spawn(move || cb.record_failure()));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.failure_count() >= CircuitBreakerConfig::default().failure_threshold);
    }
}
