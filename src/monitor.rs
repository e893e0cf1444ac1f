//! Per-operation measurements: concurrency, latency, and outcomes.
//!
//! The monitor produces measurements; consuming them is someone else's job.
//! A [`MetricsSink`] receives every data point as it happens, and
//! [`OperationMonitor::snapshot`] exposes cumulative counters for pull-style
//! consumers.
//!
//! In-flight tracking uses a guard: [`OperationMonitor::enter`] increments
//! the gauge and the guard's `Drop` decrements it, so the count stays honest
//! even when the measured future panics or is cancelled.
//!
//! # Examples
//!
//! ```rust
//! use milegraph::monitor::{OperationMonitor, Outcome};
//!
//! let monitor = OperationMonitor::default();
//! let guard = monitor.enter("milestone.get_by_id");
//! // ... do the work ...
//! guard.record(Outcome::Success);
//!
//! let stats = monitor.snapshot("milestone.get_by_id").unwrap();
//! assert_eq!(stats.successes, 1);
//! assert_eq!(stats.in_flight, 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::errors::ErrorKind;

// ============================================================================
// Outcomes and sink port
// ============================================================================

/// Final outcome of one monitored call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(ErrorKind),
}

impl Outcome {
    /// Stable label for tagging metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure(ErrorKind::Structural) => "structural",
            Outcome::Failure(ErrorKind::Workflow) => "workflow",
            Outcome::Failure(ErrorKind::Admission) => "admission",
            Outcome::Failure(ErrorKind::CircuitOpen) => "circuit_open",
            Outcome::Failure(ErrorKind::Transient) => "transient",
        }
    }
}

/// Push-style consumer of measurements. External dashboards and exporters
/// implement this; the crate ships a tracing-backed sink and a null sink.
pub trait MetricsSink: Send + Sync {
    fn record_concurrency(&self, operation: &str, in_flight: u64);
    fn record_duration(&self, operation: &str, duration: Duration);
    fn record_outcome(&self, operation: &str, outcome: Outcome);
}

/// Emits every measurement as a `tracing` event at TRACE level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record_concurrency(&self, operation: &str, in_flight: u64) {
        tracing::trace!(operation, in_flight, "operation concurrency");
    }

    fn record_duration(&self, operation: &str, duration: Duration) {
        tracing::trace!(operation, ?duration, "operation duration");
    }

    fn record_outcome(&self, operation: &str, outcome: Outcome) {
        tracing::trace!(operation, outcome = outcome.label(), "operation outcome");
    }
}

/// Discards every measurement.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record_concurrency(&self, _operation: &str, _in_flight: u64) {}
    fn record_duration(&self, _operation: &str, _duration: Duration) {}
    fn record_outcome(&self, _operation: &str, _outcome: Outcome) {}
}

// ============================================================================
// Counters
// ============================================================================

#[derive(Debug, Default)]
struct OpCounters {
    in_flight: AtomicU64,
    completed: AtomicU64,
    total_duration_nanos: AtomicU64,
    successes: AtomicU64,
    structural_failures: AtomicU64,
    workflow_failures: AtomicU64,
    admission_rejections: AtomicU64,
    circuit_open_rejections: AtomicU64,
    transient_failures: AtomicU64,
}

impl OpCounters {
    fn bump_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.successes,
            Outcome::Failure(ErrorKind::Structural) => &self.structural_failures,
            Outcome::Failure(ErrorKind::Workflow) => &self.workflow_failures,
            Outcome::Failure(ErrorKind::Admission) => &self.admission_rejections,
            Outcome::Failure(ErrorKind::CircuitOpen) => &self.circuit_open_rejections,
            Outcome::Failure(ErrorKind::Transient) => &self.transient_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cumulative view of one operation's counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationStats {
    pub in_flight: u64,
    /// Calls that ran to an outcome under a guard.
    pub completed: u64,
    pub total_duration: Duration,
    pub successes: u64,
    pub structural_failures: u64,
    pub workflow_failures: u64,
    pub admission_rejections: u64,
    pub circuit_open_rejections: u64,
    pub transient_failures: u64,
}

impl OperationStats {
    /// All failure counters summed.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.structural_failures
            + self.workflow_failures
            + self.admission_rejections
            + self.circuit_open_rejections
            + self.transient_failures
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Process-wide operation measurements, keyed by operation name.
pub struct OperationMonitor {
    counters: DashMap<String, Arc<OpCounters>>,
    sink: Arc<dyn MetricsSink>,
}

impl Default for OperationMonitor {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl OperationMonitor {
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            counters: DashMap::new(),
            sink,
        }
    }

    /// Begin measuring one call. Increments the in-flight gauge immediately;
    /// the returned guard decrements it on drop.
    #[must_use]
    pub fn enter(&self, operation: &str) -> InFlightGuard<'_> {
        let counters = self.counters_for(operation);
        let in_flight = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.sink.record_concurrency(operation, in_flight);
        InFlightGuard {
            monitor: self,
            operation: operation.to_string(),
            counters,
            started: Instant::now(),
        }
    }

    /// Record an outcome for a call that was never admitted (rate-limit or
    /// circuit-open rejection). No in-flight or duration accounting.
    pub fn record_rejection(&self, operation: &str, kind: ErrorKind) {
        let counters = self.counters_for(operation);
        let outcome = Outcome::Failure(kind);
        counters.bump_outcome(outcome);
        self.sink.record_outcome(operation, outcome);
    }

    /// Cumulative counters for an operation, if it has ever been measured.
    #[must_use]
    pub fn snapshot(&self, operation: &str) -> Option<OperationStats> {
        self.counters.get(operation).map(|c| OperationStats {
            in_flight: c.in_flight.load(Ordering::Acquire),
            completed: c.completed.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(c.total_duration_nanos.load(Ordering::Relaxed)),
            successes: c.successes.load(Ordering::Relaxed),
            structural_failures: c.structural_failures.load(Ordering::Relaxed),
            workflow_failures: c.workflow_failures.load(Ordering::Relaxed),
            admission_rejections: c.admission_rejections.load(Ordering::Relaxed),
            circuit_open_rejections: c.circuit_open_rejections.load(Ordering::Relaxed),
            transient_failures: c.transient_failures.load(Ordering::Relaxed),
        })
    }

    /// Names of every operation measured so far.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.counters.iter().map(|e| e.key().clone()).collect()
    }

    fn counters_for(&self, operation: &str) -> Arc<OpCounters> {
        self.counters
            .entry(operation.to_string())
            .or_default()
            .clone()
    }
}

/// Guard for one in-flight call. Decrements the gauge on drop; call
/// [`record`](Self::record) with the outcome before letting it go.
pub struct InFlightGuard<'a> {
    monitor: &'a OperationMonitor,
    operation: String,
    counters: Arc<OpCounters>,
    started: Instant,
}

impl InFlightGuard<'_> {
    /// Record the call's duration and outcome, then release the guard.
    pub fn record(self, outcome: Outcome) {
        let elapsed = self.started.elapsed();
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_duration_nanos
            .fetch_add(elapsed.as_nanos().try_into().unwrap_or(u64::MAX), Ordering::Relaxed);
        self.counters.bump_outcome(outcome);
        self.monitor.sink.record_duration(&self.operation, elapsed);
        self.monitor.sink.record_outcome(&self.operation, outcome);
        // Drop runs next and clears the in-flight slot.
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.counters.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        self.monitor
            .sink
            .record_concurrency(&self.operation, remaining);
    }
}
