//! Property tests for the dependency-graph validator.

#[macro_use]
extern crate proptest;

use chrono::{NaiveDate, Utc};
use milegraph::graph::DependencyGraph;
use milegraph::milestone::{CreateMilestone, Milestone};
use milegraph::types::{MilestoneId, ProjectId};
use proptest::prelude::prop;
use rustc_hash::FxHashSet;

fn due(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, day).unwrap()
}

fn milestones(days: &[u32]) -> Vec<Milestone> {
    let project = ProjectId::new();
    days.iter()
        .map(|&d| {
            Milestone::create(
                CreateMilestone::new(format!("m{d}"), "", project, due(d)),
                Utc::now(),
            )
        })
        .collect()
}

/// True when the dependency edges contain a cycle.
fn has_cycle(milestones: &[Milestone]) -> bool {
    fn visit(
        id: MilestoneId,
        edges: &rustc_hash::FxHashMap<MilestoneId, &FxHashSet<MilestoneId>>,
        done: &mut FxHashSet<MilestoneId>,
        path: &mut FxHashSet<MilestoneId>,
    ) -> bool {
        if done.contains(&id) {
            return false;
        }
        if !path.insert(id) {
            return true;
        }
        if let Some(deps) = edges.get(&id) {
            for &dep in deps.iter() {
                if visit(dep, edges, done, path) {
                    return true;
                }
            }
        }
        path.remove(&id);
        done.insert(id);
        false
    }

    let edges: rustc_hash::FxHashMap<_, _> =
        milestones.iter().map(|m| (m.id, &m.dependencies)).collect();
    let mut done = FxHashSet::default();
    for m in milestones {
        let mut path = FxHashSet::default();
        if visit(m.id, &edges, &mut done, &mut path) {
            return true;
        }
    }
    false
}

proptest! {
    /// No sequence of admitted `can_add_dependency` edges ever produces a
    /// cycle, and every admitted edge respects due-date ordering.
    #[test]
    fn admitted_edges_never_create_cycles_or_date_conflicts(
        days in prop::collection::vec(1u32..28, 2..8),
        attempts in prop::collection::vec((0usize..8, 0usize..8), 0..40),
    ) {
        let mut nodes = milestones(&days);
        let n = nodes.len();

        for (from, to) in attempts {
            let (from, to) = (from % n, to % n);
            let (dependent, dependency) = (nodes[from].id, nodes[to].id);
            let admitted = DependencyGraph::from_milestones(&nodes)
                .can_add_dependency(dependent, dependency)
                .is_ok();
            if admitted {
                nodes[from].dependencies.insert(dependency);
            }

            prop_assert!(!has_cycle(&nodes), "cycle after admitting {from} -> {to}");
        }

        // Every surviving edge is due-date ordered.
        let by_id: rustc_hash::FxHashMap<_, _> =
            nodes.iter().map(|m| (m.id, m.due_date)).collect();
        for m in &nodes {
            for dep in &m.dependencies {
                prop_assert!(by_id[dep] <= m.due_date);
            }
        }
    }

    /// The validator is complete: an edge between distinct milestones that
    /// closes no cycle and keeps due-date ordering is always admitted.
    #[test]
    fn validator_admits_every_safe_edge(
        days in prop::collection::vec(1u32..28, 2..6),
    ) {
        let mut nodes = milestones(&days);
        // Chain each milestone onto an earlier-or-equal-due one; always safe.
        let order: Vec<usize> = {
            let mut idx: Vec<usize> = (0..nodes.len()).collect();
            idx.sort_by_key(|&i| nodes[i].due_date);
            idx
        };
        for pair in order.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            let (dependent, dependency) = (nodes[later].id, nodes[earlier].id);
            let graph = DependencyGraph::from_milestones(&nodes);
            prop_assert!(graph.can_add_dependency(dependent, dependency).is_ok());
            nodes[later].dependencies.insert(dependency);
        }
        prop_assert!(!has_cycle(&nodes));
    }

    /// Rejection leaves no trace: a rejected edge does not change what the
    /// graph admits afterwards.
    #[test]
    fn rejection_has_no_side_effects(
        days in prop::collection::vec(1u32..28, 2..6),
    ) {
        let nodes = milestones(&days);
        let graph = DependencyGraph::from_milestones(&nodes);
        let a = nodes[0].id;

        let before: Vec<bool> = nodes
            .iter()
            .map(|m| graph.can_add_dependency(a, m.id).is_ok())
            .collect();
        // Self-edge is always rejected...
        prop_assert!(graph.can_add_dependency(a, a).is_err());
        // ...and the snapshot answers identically afterwards.
        let after: Vec<bool> = nodes
            .iter()
            .map(|m| graph.can_add_dependency(a, m.id).is_ok())
            .collect();
        prop_assert_eq!(before, after);
    }
}
