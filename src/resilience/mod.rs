//! Fault isolation around workflow operations: circuit breaker + retry.
//!
//! Every operation name owns a [`CircuitBreaker`]; the wrapper consults it
//! before running the call, drives a bounded [`RetryPolicy`] for transient
//! failures, and feeds the outcome back into the breaker. Business-rule
//! rejections (structural, workflow, admission) are never retried and never
//! count against the breaker; while half-open they count as successful
//! probes, since the underlying call did execute.
//!
//! Breakers live in a registry owned by this wrapper, constructed once at the
//! composition root and shared by reference.
//!
//! # Examples
//!
//! ```rust
//! use milegraph::resilience::{ResilienceConfig, ResilienceWrapper};
//! use milegraph::errors::CoreError;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let resilience = ResilienceWrapper::new(ResilienceConfig::default());
//! let result: Result<u32, CoreError> = resilience
//!     .execute("milestone.get_by_id", || async { Ok(42) })
//!     .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

mod breaker;
mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;

use std::sync::Arc;

use dashmap::DashMap;

use crate::errors::CoreError;

/// Combined breaker and retry configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResilienceConfig {
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

/// Per-operation circuit breaking and retry, composed around async calls.
pub struct ResilienceWrapper {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: ResilienceConfig,
}

impl ResilienceWrapper {
    #[must_use]
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Run `f` under the operation's breaker and the retry policy.
    ///
    /// Flow:
    /// 1. Breaker gate. An open circuit fails fast with
    ///    [`CoreError::CircuitOpen`]; no retry is attempted.
    /// 2. `f` is invoked up to `retry.max_attempts` times, sleeping the
    ///    backoff delay between attempts; only transient errors retry.
    /// 3. Outcome accounting: success or business rejection records a breaker
    ///    success; a transient error that survived the retry budget records a
    ///    failure.
    ///
    /// While half-open, one acquired trial permit spans the whole retry
    /// budget of the probe call.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let breaker = self.breaker(operation);
        if let Err(retry_after) = breaker.try_acquire() {
            tracing::debug!(operation, ?retry_after, "failing fast: circuit open");
            return Err(CoreError::CircuitOpen {
                operation: operation.to_string(),
                retry_after,
            });
        }

        let mut attempt = 1u32;
        loop {
            match f().await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        ?delay,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        breaker.record_failure();
                    } else {
                        // Business rejection: the call executed, the
                        // infrastructure is healthy.
                        breaker.record_success();
                    }
                    return Err(err);
                }
            }
        }
    }

    /// The breaker state for an operation (creating the breaker if needed).
    #[must_use]
    pub fn circuit_state(&self, operation: &str) -> CircuitState {
        self.breaker(operation).state()
    }

    /// Number of breakers created so far.
    #[must_use]
    pub fn breaker_count(&self) -> usize {
        self.breakers.len()
    }

    fn breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.breaker)))
            .clone()
    }
}
