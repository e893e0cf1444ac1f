//! Dependency-graph validation for milestones.
//!
//! Milestones within a project form a directed graph: an edge points from a
//! milestone to each milestone it depends on. Two structural invariants must
//! hold at all times:
//!
//! 1. the graph is acyclic, and
//! 2. every dependency is due on or before the milestone depending on it.
//!
//! [`DependencyGraph`] is a throwaway snapshot rebuilt from the project's
//! current milestones for each check; the crate keeps no long-lived in-memory
//! graph. Checks are an iterative depth-first reachability search, O(V+E).
//!
//! Callers must serialize conflicting writes to one project's graph at the
//! persistence boundary; the snapshot only guarantees soundness against the
//! state it was built from.
//!
//! # Examples
//!
//! ```rust
//! use milegraph::graph::DependencyGraph;
//! use milegraph::milestone::{CreateMilestone, Milestone};
//! use milegraph::types::ProjectId;
//! use chrono::{NaiveDate, Utc};
//!
//! let project = ProjectId::new();
//! let due = |d| NaiveDate::from_ymd_opt(2026, 7, d).unwrap();
//! let a = Milestone::create(CreateMilestone::new("a", "", project, due(10)), Utc::now());
//! let b = Milestone::create(CreateMilestone::new("b", "", project, due(12)), Utc::now());
//!
//! let graph = DependencyGraph::from_milestones([&a, &b]);
//! // b (due 12) may depend on a (due 10)
//! assert!(graph.can_add_dependency(b.id, a.id).is_ok());
//! // a (due 10) may not depend on b (due 12)
//! assert!(graph.can_add_dependency(a.id, b.id).is_err());
//! ```

use chrono::NaiveDate;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::CoreError;
use crate::milestone::Milestone;
use crate::types::MilestoneId;
use crate::workflow::MilestoneStatus;

#[derive(Clone, Debug)]
struct GraphNode {
    due_date: NaiveDate,
    status: MilestoneStatus,
    dependencies: FxHashSet<MilestoneId>,
}

/// Snapshot of one project's milestone dependency structure.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: FxHashMap<MilestoneId, GraphNode>,
}

impl DependencyGraph {
    /// Build a snapshot from the project's current milestones.
    pub fn from_milestones<'a, I>(milestones: I) -> Self
    where
        I: IntoIterator<Item = &'a Milestone>,
    {
        let nodes = milestones
            .into_iter()
            .map(|m| {
                (
                    m.id,
                    GraphNode {
                        due_date: m.due_date,
                        status: m.status,
                        dependencies: m.dependencies.clone(),
                    },
                )
            })
            .collect();
        Self { nodes }
    }

    /// Number of milestones in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate that `milestone -> candidate` may be added as a dependency
    /// edge without breaking the structural invariants.
    ///
    /// Checks, in order: self-reference, existence of both endpoints,
    /// due-date ordering, cycle creation (would `candidate` reach
    /// `milestone`?). The due-date comparison runs before the reachability
    /// search so an edge that violates both reports the date conflict.
    pub fn can_add_dependency(
        &self,
        milestone: MilestoneId,
        candidate: MilestoneId,
    ) -> Result<(), CoreError> {
        if milestone == candidate {
            return Err(CoreError::SelfDependency { milestone });
        }
        let dependent = self
            .nodes
            .get(&milestone)
            .ok_or(CoreError::MilestoneNotFound { id: milestone })?;
        let dependency = self
            .nodes
            .get(&candidate)
            .ok_or(CoreError::MilestoneNotFound { id: candidate })?;

        if dependency.due_date > dependent.due_date {
            return Err(CoreError::DependencyDueDateConflict {
                milestone,
                dependency: candidate,
                milestone_due: dependent.due_date,
                dependency_due: dependency.due_date,
            });
        }
        if self.reaches(candidate, milestone) {
            return Err(CoreError::CyclicDependency {
                milestone,
                dependency: candidate,
            });
        }
        Ok(())
    }

    /// Validate the initial dependency set of a milestone being created.
    ///
    /// A fresh milestone has no incoming edges yet, so a cycle is impossible;
    /// only existence and due-date ordering need checking.
    pub fn validate_initial_dependencies(
        &self,
        milestone: MilestoneId,
        due_date: NaiveDate,
        dependencies: &FxHashSet<MilestoneId>,
    ) -> Result<(), CoreError> {
        for &dep in dependencies {
            let node = self
                .nodes
                .get(&dep)
                .ok_or(CoreError::MilestoneNotFound { id: dep })?;
            if node.due_date > due_date {
                return Err(CoreError::DependencyDueDateConflict {
                    milestone,
                    dependency: dep,
                    milestone_due: due_date,
                    dependency_due: node.due_date,
                });
            }
        }
        Ok(())
    }

    /// Direct dependencies of `id` that are not yet completed.
    ///
    /// Feeds the completion precondition: a milestone may only complete when
    /// this list is empty. Unknown dependency ids are reported as incomplete;
    /// a dangling edge must never unblock completion.
    #[must_use]
    pub fn incomplete_dependencies(&self, id: MilestoneId) -> Vec<MilestoneId> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut incomplete: Vec<MilestoneId> = node
            .dependencies
            .iter()
            .filter(|dep| {
                self.nodes
                    .get(dep)
                    .is_none_or(|n| n.status != MilestoneStatus::Completed)
            })
            .copied()
            .collect();
        incomplete.sort();
        incomplete
    }

    /// Iterative depth-first reachability over dependency edges.
    fn reaches(&self, from: MilestoneId, target: MilestoneId) -> bool {
        let mut visited: FxHashSet<MilestoneId> = FxHashSet::default();
        let mut frontier = vec![from];
        while let Some(current) = frontier.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                frontier.extend(node.dependencies.iter().copied());
            }
        }
        false
    }
}
