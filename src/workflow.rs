//! Milestone status workflow: the state machine and its transition rules.
//!
//! Statuses form a small finite-state machine. The *states* are fixed by
//! [`MilestoneStatus`]; which transitions between them are legal is data,
//! carried by a [`TransitionTable`] so deployments can tighten or extend the
//! default rules (e.g. forbid the in-progress rollback) without forking the
//! enum.
//!
//! # Default table
//!
//! ```text
//! Planned    -> InProgress | Cancelled
//! InProgress -> Completed | Cancelled | Planned (rollback)
//! Completed  -> (terminal)
//! Cancelled  -> (terminal)
//! ```
//!
//! # Examples
//!
//! ```rust
//! use milegraph::workflow::{MilestoneStatus, TransitionTable};
//!
//! let table = TransitionTable::default();
//! assert!(table.allows(MilestoneStatus::Planned, MilestoneStatus::InProgress));
//! assert!(!table.allows(MilestoneStatus::Planned, MilestoneStatus::Completed));
//!
//! // A stricter deployment without rollback:
//! let strict = TransitionTable::new()
//!     .allow(MilestoneStatus::Planned, MilestoneStatus::InProgress)
//!     .allow(MilestoneStatus::Planned, MilestoneStatus::Cancelled)
//!     .allow(MilestoneStatus::InProgress, MilestoneStatus::Completed)
//!     .allow(MilestoneStatus::InProgress, MilestoneStatus::Cancelled);
//! assert!(!strict.allows(MilestoneStatus::InProgress, MilestoneStatus::Planned));
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::milestone::Milestone;
use crate::types::MilestoneId;

/// Lifecycle status of a milestone.
///
/// `Completed` and `Cancelled` are terminal: once a milestone reaches either,
/// every mutating command is rejected regardless of the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl MilestoneStatus {
    /// Whether this status ends the milestone's lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned => write!(f, "PLANNED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Allowed status transitions, keyed by current status.
///
/// The table only governs transitions between *non-terminal* states; terminal
/// statuses reject mutation before the table is consulted.
#[derive(Clone, Debug)]
pub struct TransitionTable {
    allowed: FxHashMap<MilestoneStatus, Vec<MilestoneStatus>>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        use MilestoneStatus::*;
        Self::new()
            .allow(Planned, InProgress)
            .allow(Planned, Cancelled)
            .allow(InProgress, Completed)
            .allow(InProgress, Cancelled)
            .allow(InProgress, Planned)
    }
}

impl TransitionTable {
    /// Creates an empty table (every transition rejected).
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed: FxHashMap::default(),
        }
    }

    /// Permit `from -> to`. Duplicate registrations are idempotent.
    #[must_use]
    pub fn allow(mut self, from: MilestoneStatus, to: MilestoneStatus) -> Self {
        let targets = self.allowed.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        self
    }

    /// Whether `from -> to` is a legal transition.
    #[must_use]
    pub fn allows(&self, from: MilestoneStatus, to: MilestoneStatus) -> bool {
        self.allowed
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    /// The transitions legal from `from`, in registration order.
    #[must_use]
    pub fn allowed_from(&self, from: MilestoneStatus) -> &[MilestoneStatus] {
        self.allowed.get(&from).map_or(&[], Vec::as_slice)
    }

    /// Apply a status change to a milestone, enforcing the workflow rules in
    /// order: terminal guard, transition table, completion precondition.
    ///
    /// `incomplete_dependencies` is the caller-computed list of dependency ids
    /// not yet completed; it is only consulted when `to` is
    /// [`MilestoneStatus::Completed`].
    ///
    /// On success the milestone's status (and, when completing, its
    /// completion date and progress) are updated in place, and the previous
    /// status is returned.
    pub fn apply(
        &self,
        milestone: &mut Milestone,
        to: MilestoneStatus,
        incomplete_dependencies: Vec<MilestoneId>,
        now: DateTime<Utc>,
    ) -> Result<MilestoneStatus, CoreError> {
        let from = milestone.status;

        if from.is_terminal() {
            return Err(CoreError::TerminalMilestone {
                id: milestone.id,
                status: from,
            });
        }
        if !self.allows(from, to) {
            return Err(CoreError::InvalidStatusTransition { from, to });
        }
        if to == MilestoneStatus::Completed && !incomplete_dependencies.is_empty() {
            return Err(CoreError::CompletionPrecondition {
                id: milestone.id,
                incomplete: incomplete_dependencies,
            });
        }

        milestone.status = to;
        milestone.updated_at = now;
        if to == MilestoneStatus::Completed {
            milestone.completion_date = Some(now);
            milestone.progress = 100;
        }
        tracing::debug!(
            milestone = %milestone.id,
            %from,
            %to,
            "milestone status transition applied"
        );
        Ok(from)
    }
}
