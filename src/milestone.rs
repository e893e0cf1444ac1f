//! The milestone aggregate and the commands that mutate it.
//!
//! A [`Milestone`] is the unit everything else in this crate revolves around:
//! the workflow moves its status, the graph validator constrains its
//! dependency edges, and the service persists it and publishes events about
//! it. Mutations happen through small, validated methods; this module only
//! enforces the *local* invariants (terminal immutability, progress clamping)
//! while graph-structural rules live in [`crate::graph`] and transition rules
//! in [`crate::workflow`].
//!
//! # Examples
//!
//! ```rust
//! use milegraph::milestone::{CreateMilestone, Milestone};
//! use milegraph::types::ProjectId;
//! use chrono::{NaiveDate, Utc};
//!
//! let cmd = CreateMilestone::new(
//!     "beta launch",
//!     "feature-complete beta to early users",
//!     ProjectId::new(),
//!     NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
//! );
//! let m = Milestone::create(cmd, Utc::now());
//! assert_eq!(m.progress, 0);
//! assert!(m.dependencies.is_empty());
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::types::{MilestoneId, ProjectId, UserId};
use crate::workflow::MilestoneStatus;

/// A project milestone with its dependency edges.
///
/// `dependencies` holds the ids this milestone depends on (edges point from a
/// milestone to its prerequisites). The set never contains the milestone's
/// own id and never closes a cycle; both are enforced before insertion by
/// [`crate::graph::DependencyGraph`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub name: String,
    pub description: String,
    pub project_id: ProjectId,
    pub due_date: NaiveDate,
    pub status: MilestoneStatus,
    /// Completion percentage, clamped to 0..=100.
    pub progress: u8,
    pub assignee_id: Option<UserId>,
    /// Set exactly once, when the milestone enters `Completed`.
    pub completion_date: Option<DateTime<Utc>>,
    pub dependencies: FxHashSet<MilestoneId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Milestone {
    /// Materialize a milestone from a creation command.
    ///
    /// The command's dependencies are carried over as-is; the caller is
    /// responsible for validating them against the project graph first (the
    /// service does this before ever constructing the entity).
    #[must_use]
    pub fn create(cmd: CreateMilestone, now: DateTime<Utc>) -> Self {
        Self {
            id: MilestoneId::new(),
            name: cmd.name,
            description: cmd.description,
            project_id: cmd.project_id,
            due_date: cmd.due_date,
            status: MilestoneStatus::Planned,
            progress: 0,
            assignee_id: cmd.assignee_id,
            completion_date: None,
            dependencies: cmd.dependencies,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the milestone is in a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reject mutation of a terminal milestone.
    pub fn ensure_mutable(&self) -> Result<(), CoreError> {
        if self.is_terminal() {
            Err(CoreError::TerminalMilestone {
                id: self.id,
                status: self.status,
            })
        } else {
            Ok(())
        }
    }

    /// Apply an update command (name, description, due date).
    pub fn apply_update(&mut self, cmd: UpdateMilestone, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_mutable()?;
        self.name = cmd.name;
        self.description = cmd.description;
        self.due_date = cmd.due_date;
        self.updated_at = now;
        Ok(())
    }

    /// Assign the milestone to a user.
    pub fn assign(&mut self, assignee: UserId, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_mutable()?;
        self.assignee_id = Some(assignee);
        self.updated_at = now;
        Ok(())
    }

    /// Record a validated dependency edge. The graph checks must already have
    /// passed; this only guards the terminal invariant.
    pub fn insert_dependency(
        &mut self,
        dependency: MilestoneId,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.ensure_mutable()?;
        self.dependencies.insert(dependency);
        self.updated_at = now;
        Ok(())
    }

    /// Set progress, clamping into 0..=100.
    pub fn set_progress(&mut self, progress: u8, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.ensure_mutable()?;
        self.progress = progress.min(100);
        self.updated_at = now;
        Ok(())
    }

    /// Whether this milestone directly depends on `other`.
    #[must_use]
    pub fn depends_on(&self, other: MilestoneId) -> bool {
        self.dependencies.contains(&other)
    }
}

/// Command to create a milestone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateMilestone {
    pub name: String,
    pub description: String,
    pub project_id: ProjectId,
    pub due_date: NaiveDate,
    pub assignee_id: Option<UserId>,
    pub dependencies: FxHashSet<MilestoneId>,
}

impl CreateMilestone {
    /// Create a command with the required fields; use the `with_*` builders
    /// for the optional ones.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        project_id: ProjectId,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            project_id,
            due_date,
            assignee_id: None,
            dependencies: FxHashSet::default(),
        }
    }

    /// Attach an initial assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee: UserId) -> Self {
        self.assignee_id = Some(assignee);
        self
    }

    /// Attach initial dependencies; validated by the service at creation.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = MilestoneId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }
}

/// Command to update a milestone's descriptive fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateMilestone {
    pub name: String,
    pub description: String,
    pub due_date: NaiveDate,
}

impl UpdateMilestone {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            due_date,
        }
    }
}
