//! Error taxonomy for the milestone management core.
//!
//! All failures surface as one tagged enum, [`CoreError`], so callers can
//! pattern-match on concrete variants or coarsely on [`ErrorKind`]. The kind
//! drives the resilience layer: only [`ErrorKind::Transient`] failures are
//! retried or counted against a circuit breaker; structural, workflow, and
//! admission rejections propagate unchanged.
//!
//! # Examples
//!
//! ```rust
//! use milegraph::errors::{CoreError, ErrorKind};
//! use milegraph::types::MilestoneId;
//!
//! let err = CoreError::CyclicDependency {
//!     milestone: MilestoneId::new(),
//!     dependency: MilestoneId::new(),
//! };
//! assert_eq!(err.kind(), ErrorKind::Structural);
//! assert!(!err.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::types::{MilestoneId, OperationClass};
use crate::workflow::MilestoneStatus;

// ============================================================================
// Kinds
// ============================================================================

/// Coarse classification of a [`CoreError`], mirroring how the resilience
/// layer treats it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Graph-structural violation (cycle, due-date ordering, self-reference).
    /// Rejected, never retried.
    Structural,
    /// Workflow-rule violation (bad transition, terminal mutation, unmet
    /// completion precondition, unknown milestone). Rejected, never retried.
    Workflow,
    /// Rate-limit rejection. Rejected immediately, never retried.
    Admission,
    /// Fail-fast rejection because the operation's circuit is open. The
    /// underlying call was never attempted.
    CircuitOpen,
    /// Infrastructure failure (e.g. the persistence port). Retried up to the
    /// attempt budget and counted toward circuit-breaker thresholds.
    Transient,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Workflow => write!(f, "workflow"),
            Self::Admission => write!(f, "admission"),
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Every failure the milestone core can produce.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
pub enum CoreError {
    /// A milestone was asked to depend on itself.
    #[error("milestone {milestone} cannot depend on itself")]
    #[diagnostic(code(milegraph::graph::self_dependency))]
    SelfDependency { milestone: MilestoneId },

    /// Adding the edge would close a cycle in the project's dependency graph.
    #[error("adding dependency {dependency} to milestone {milestone} would create a cycle")]
    #[diagnostic(
        code(milegraph::graph::cyclic_dependency),
        help("The candidate dependency already reaches this milestone through existing edges.")
    )]
    CyclicDependency {
        milestone: MilestoneId,
        dependency: MilestoneId,
    },

    /// A dependency is due after the milestone that depends on it.
    #[error(
        "dependency {dependency} is due {dependency_due}, after dependent milestone {milestone} (due {milestone_due})"
    )]
    #[diagnostic(
        code(milegraph::graph::due_date_conflict),
        help("Every dependency must be due on or before the milestone that depends on it.")
    )]
    DependencyDueDateConflict {
        milestone: MilestoneId,
        dependency: MilestoneId,
        milestone_due: chrono::NaiveDate,
        dependency_due: chrono::NaiveDate,
    },

    /// The requested status transition is not in the transition table.
    #[error("invalid milestone status transition: {from} -> {to}")]
    #[diagnostic(code(milegraph::workflow::invalid_transition))]
    InvalidStatusTransition {
        from: MilestoneStatus,
        to: MilestoneStatus,
    },

    /// A mutating command reached a milestone already in a terminal status.
    #[error("milestone {id} is {status} and can no longer be modified")]
    #[diagnostic(
        code(milegraph::workflow::terminal_modification),
        help("Completed and cancelled milestones accept read operations only.")
    )]
    TerminalMilestone {
        id: MilestoneId,
        status: MilestoneStatus,
    },

    /// Completion was requested while some dependencies are not completed.
    #[error(
        "milestone {id} cannot complete: {} dependenc{} still incomplete",
        incomplete.len(),
        if incomplete.len() == 1 { "y is" } else { "ies are" }
    )]
    #[diagnostic(
        code(milegraph::workflow::completion_precondition),
        help("Complete every dependency before completing the dependent milestone.")
    )]
    CompletionPrecondition {
        id: MilestoneId,
        incomplete: Vec<MilestoneId>,
    },

    /// The referenced milestone does not exist in the store.
    #[error("milestone {id} not found")]
    #[diagnostic(code(milegraph::workflow::not_found))]
    MilestoneNotFound { id: MilestoneId },

    /// The operation's token bucket was empty.
    #[error("rate limit exceeded for {operation} ({class} tier)")]
    #[diagnostic(
        code(milegraph::limiter::rate_limited),
        help("Retry after the bucket's refill window elapses.")
    )]
    RateLimited {
        operation: String,
        class: OperationClass,
    },

    /// The operation's circuit breaker is open; the call was not attempted.
    #[error("circuit open for {operation}; retry after {retry_after:?}")]
    #[diagnostic(code(milegraph::resilience::circuit_open))]
    CircuitOpen {
        operation: String,
        retry_after: Duration,
    },

    /// Infrastructure failure unrelated to business rules.
    #[error("transient failure: {message}")]
    #[diagnostic(code(milegraph::transient))]
    Transient { message: String },
}

impl CoreError {
    /// Shorthand for a transient infrastructure failure.
    pub fn transient(message: impl Into<String>) -> Self {
        CoreError::Transient {
            message: message.into(),
        }
    }

    /// The taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::SelfDependency { .. }
            | CoreError::CyclicDependency { .. }
            | CoreError::DependencyDueDateConflict { .. } => ErrorKind::Structural,
            CoreError::InvalidStatusTransition { .. }
            | CoreError::TerminalMilestone { .. }
            | CoreError::CompletionPrecondition { .. }
            | CoreError::MilestoneNotFound { .. } => ErrorKind::Workflow,
            CoreError::RateLimited { .. } => ErrorKind::Admission,
            CoreError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            CoreError::Transient { .. } => ErrorKind::Transient,
        }
    }

    /// Whether the resilience layer may retry the underlying call.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether this error represents a business-rule rejection rather than an
    /// infrastructure fault. Business rejections never penalize the breaker.
    #[must_use]
    pub fn is_business_rejection(&self) -> bool {
        matches!(self.kind(), ErrorKind::Structural | ErrorKind::Workflow)
    }
}
