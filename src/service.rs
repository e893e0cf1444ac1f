//! The milestone service: every operation, wrapped in the full pipeline.
//!
//! Each public method runs the same gauntlet:
//!
//! 1. **Admission** ([`RateLimiter`]): non-blocking token check; an empty
//!    bucket rejects the call before anything else runs.
//! 2. **Resilience** ([`ResilienceWrapper`]): per-operation circuit breaker
//!    and bounded retry for transient failures.
//! 3. **Monitoring** ([`OperationMonitor`]): innermost, so each retry attempt
//!    is measured individually. Admission and circuit-open rejections never
//!    reach the monitored section and are recorded separately as rejections.
//! 4. The core operation against the [`MilestoneStore`], validated by the
//!    dependency graph and the transition table, publishing exactly one
//!    [`DomainEvent`] per successful mutation.
//!
//! The service is the composition root: it owns the limiter, the breaker
//! registry, and the monitor, and borrows nothing global.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use milegraph::milestone::CreateMilestone;
//! use milegraph::events::MemoryPublisher;
//! use milegraph::service::MilestoneService;
//! use milegraph::store::InMemoryStore;
//! use milegraph::types::ProjectId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), milegraph::errors::CoreError> {
//! let service = MilestoneService::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(MemoryPublisher::new()),
//! );
//! let m = service
//!     .create(CreateMilestone::new(
//!         "beta",
//!         "feature-complete beta",
//!         ProjectId::new(),
//!         NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
//!     ))
//!     .await?;
//! assert_eq!(service.get_by_id(m.id).await?.name, "beta");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::errors::{CoreError, ErrorKind};
use crate::events::{DomainEvent, EventPublisher};
use crate::graph::DependencyGraph;
use crate::limiter::{RateLimiter, RateLimiterConfig};
use crate::milestone::{CreateMilestone, Milestone, UpdateMilestone};
use crate::monitor::{OperationMonitor, Outcome};
use crate::resilience::{CircuitState, ResilienceConfig, ResilienceWrapper};
use crate::store::MilestoneStore;
use crate::types::{MilestoneId, ProjectId, UserId};
use crate::workflow::{MilestoneStatus, TransitionTable};

/// Operation names, as used for admission tiers, breaker keys, and metrics.
pub mod ops {
    pub const CREATE: &str = "milestone.create";
    pub const UPDATE: &str = "milestone.update";
    pub const UPDATE_STATUS: &str = "milestone.update_status";
    pub const ASSIGN: &str = "milestone.assign";
    pub const ADD_DEPENDENCY: &str = "milestone.add_dependency";
    pub const GET_BY_ID: &str = "milestone.get_by_id";
    pub const GET_BY_PROJECT: &str = "milestone.get_by_project";
    pub const GET_BY_ASSIGNEE: &str = "milestone.get_by_assignee";
    pub const GET_UPCOMING: &str = "milestone.get_upcoming";
    pub const GET_OVERDUE: &str = "milestone.get_overdue";
}

/// Tuning for the whole pipeline.
#[derive(Clone, Debug, Default)]
pub struct ServiceConfig {
    pub limiter: RateLimiterConfig,
    pub resilience: ResilienceConfig,
    pub transitions: TransitionTable,
}

impl ServiceConfig {
    /// Resolve limiter settings from the environment; everything else stays
    /// at its default.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            limiter: RateLimiterConfig::from_env(),
            ..Self::default()
        }
    }
}

/// Milestone operations behind admission control, resilience, and monitoring.
pub struct MilestoneService<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    limiter: RateLimiter,
    resilience: ResilienceWrapper,
    monitor: OperationMonitor,
    transitions: TransitionTable,
}

impl<S, P> MilestoneService<S, P>
where
    S: MilestoneStore,
    P: EventPublisher,
{
    /// Service with default configuration.
    #[must_use]
    pub fn new(store: Arc<S>, publisher: Arc<P>) -> Self {
        Self::with_config(store, publisher, ServiceConfig::default())
    }

    #[must_use]
    pub fn with_config(store: Arc<S>, publisher: Arc<P>, config: ServiceConfig) -> Self {
        Self::with_limiter(
            store,
            publisher,
            RateLimiter::new(config.limiter),
            config.resilience,
            config.transitions,
        )
    }

    /// Full-control constructor; lets tests inject a limiter with a manual
    /// clock.
    #[must_use]
    pub fn with_limiter(
        store: Arc<S>,
        publisher: Arc<P>,
        limiter: RateLimiter,
        resilience: ResilienceConfig,
        transitions: TransitionTable,
    ) -> Self {
        Self {
            store,
            publisher,
            limiter,
            resilience: ResilienceWrapper::new(resilience),
            monitor: OperationMonitor::default(),
            transitions,
        }
    }

    /// The operation monitor, for stats snapshots.
    #[must_use]
    pub fn monitor(&self) -> &OperationMonitor {
        &self.monitor
    }

    /// Breaker state for one operation name.
    #[must_use]
    pub fn circuit_state(&self, operation: &str) -> CircuitState {
        self.resilience.circuit_state(operation)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a milestone. Initial dependencies are validated against the
    /// project's graph (existence and due-date ordering; a fresh node cannot
    /// close a cycle).
    pub async fn create(&self, cmd: CreateMilestone) -> Result<Milestone, CoreError> {
        self.run(ops::CREATE, || self.create_inner(&cmd)).await
    }

    /// Update name, description, and due date. A due-date change must keep
    /// the graph ordering intact on both sides of the milestone's edges.
    pub async fn update(
        &self,
        id: MilestoneId,
        cmd: UpdateMilestone,
    ) -> Result<Milestone, CoreError> {
        self.run(ops::UPDATE, || self.update_inner(id, &cmd)).await
    }

    /// Move a milestone through the status workflow.
    pub async fn update_status(
        &self,
        id: MilestoneId,
        to: MilestoneStatus,
    ) -> Result<Milestone, CoreError> {
        self.run(ops::UPDATE_STATUS, || self.update_status_inner(id, to))
            .await
    }

    /// Assign the milestone to a user.
    pub async fn assign(&self, id: MilestoneId, assignee: UserId) -> Result<Milestone, CoreError> {
        self.run(ops::ASSIGN, || self.assign_inner(id, assignee))
            .await
    }

    /// Add a dependency edge after full graph validation (self-reference,
    /// existence, cycle, due-date ordering).
    pub async fn add_dependency(
        &self,
        id: MilestoneId,
        dependency: MilestoneId,
    ) -> Result<Milestone, CoreError> {
        self.run(ops::ADD_DEPENDENCY, || {
            self.add_dependency_inner(id, dependency)
        })
        .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_by_id(&self, id: MilestoneId) -> Result<Milestone, CoreError> {
        self.run(ops::GET_BY_ID, || async move {
            self.store
                .find_by_id(id)
                .await?
                .ok_or(CoreError::MilestoneNotFound { id })
        })
        .await
    }

    /// Every milestone of a project, ordered by due date.
    pub async fn get_by_project(&self, project_id: ProjectId) -> Result<Vec<Milestone>, CoreError> {
        self.run(ops::GET_BY_PROJECT, || async move {
            let mut milestones = self.store.find_by_project(project_id).await?;
            sort_by_due(&mut milestones);
            Ok(milestones)
        })
        .await
    }

    /// Every milestone assigned to a user, across projects, ordered by due
    /// date.
    pub async fn get_by_assignee(&self, assignee_id: UserId) -> Result<Vec<Milestone>, CoreError> {
        self.run(ops::GET_BY_ASSIGNEE, || async move {
            let mut milestones = self.store.find_by_assignee(assignee_id).await?;
            sort_by_due(&mut milestones);
            Ok(milestones)
        })
        .await
    }

    /// Non-terminal milestones of a project due on or after `as_of`,
    /// ordered by due date.
    pub async fn get_upcoming(
        &self,
        project_id: ProjectId,
        as_of: NaiveDate,
    ) -> Result<Vec<Milestone>, CoreError> {
        self.run(ops::GET_UPCOMING, || async move {
            let mut milestones = self.store.find_by_project(project_id).await?;
            milestones.retain(|m| !m.is_terminal() && m.due_date >= as_of);
            sort_by_due(&mut milestones);
            Ok(milestones)
        })
        .await
    }

    /// Non-terminal milestones of a project due strictly before `as_of`,
    /// ordered by due date.
    pub async fn get_overdue(
        &self,
        project_id: ProjectId,
        as_of: NaiveDate,
    ) -> Result<Vec<Milestone>, CoreError> {
        self.run(ops::GET_OVERDUE, || async move {
            let mut milestones = self.store.find_by_project(project_id).await?;
            milestones.retain(|m| !m.is_terminal() && m.due_date < as_of);
            sort_by_due(&mut milestones);
            Ok(milestones)
        })
        .await
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Admission, then resilience, then the monitored call itself.
    async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        if let Err(err) = self.limiter.try_admit(operation) {
            self.monitor.record_rejection(operation, ErrorKind::Admission);
            return Err(err);
        }

        let result = self
            .resilience
            .execute(operation, || {
                let guard = self.monitor.enter(operation);
                let fut = f();
                async move {
                    let result = fut.await;
                    match &result {
                        Ok(_) => guard.record(Outcome::Success),
                        Err(err) => guard.record(Outcome::Failure(err.kind())),
                    }
                    result
                }
            })
            .await;

        if matches!(result, Err(CoreError::CircuitOpen { .. })) {
            self.monitor
                .record_rejection(operation, ErrorKind::CircuitOpen);
        }
        result
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    async fn create_inner(&self, cmd: &CreateMilestone) -> Result<Milestone, CoreError> {
        let now = Utc::now();
        let milestone = Milestone::create(cmd.clone(), now);

        if !milestone.dependencies.is_empty() {
            let siblings = self.store.find_by_project(milestone.project_id).await?;
            let graph = DependencyGraph::from_milestones(&siblings);
            graph.validate_initial_dependencies(
                milestone.id,
                milestone.due_date,
                &milestone.dependencies,
            )?;
        }

        self.store.save(milestone.clone()).await?;
        self.publisher.publish(DomainEvent::created(&milestone, now))?;
        tracing::info!(milestone = %milestone.id, project = %milestone.project_id, "milestone created");
        Ok(milestone)
    }

    async fn update_inner(
        &self,
        id: MilestoneId,
        cmd: &UpdateMilestone,
    ) -> Result<Milestone, CoreError> {
        let now = Utc::now();
        let mut milestone = self.fetch(id).await?;

        if cmd.due_date != milestone.due_date {
            let siblings = self.store.find_by_project(milestone.project_id).await?;
            self.check_due_date_change(&milestone, cmd.due_date, &siblings)?;
        }

        milestone.apply_update(cmd.clone(), now)?;
        self.store.save(milestone.clone()).await?;
        self.publisher.publish(DomainEvent::updated(&milestone, now))?;
        Ok(milestone)
    }

    async fn update_status_inner(
        &self,
        id: MilestoneId,
        to: MilestoneStatus,
    ) -> Result<Milestone, CoreError> {
        let now = Utc::now();
        let mut milestone = self.fetch(id).await?;

        let incomplete = if to == MilestoneStatus::Completed {
            let siblings = self.store.find_by_project(milestone.project_id).await?;
            DependencyGraph::from_milestones(&siblings).incomplete_dependencies(id)
        } else {
            Vec::new()
        };

        let from = self.transitions.apply(&mut milestone, to, incomplete, now)?;
        self.store.save(milestone.clone()).await?;
        self.publisher
            .publish(DomainEvent::status_changed(&milestone, from, now))?;
        Ok(milestone)
    }

    async fn assign_inner(&self, id: MilestoneId, assignee: UserId) -> Result<Milestone, CoreError> {
        let now = Utc::now();
        let mut milestone = self.fetch(id).await?;
        milestone.assign(assignee, now)?;
        self.store.save(milestone.clone()).await?;
        self.publisher
            .publish(DomainEvent::assigned(&milestone, assignee, now))?;
        Ok(milestone)
    }

    async fn add_dependency_inner(
        &self,
        id: MilestoneId,
        dependency: MilestoneId,
    ) -> Result<Milestone, CoreError> {
        let now = Utc::now();
        let mut milestone = self.fetch(id).await?;
        milestone.ensure_mutable()?;

        let siblings = self.store.find_by_project(milestone.project_id).await?;
        DependencyGraph::from_milestones(&siblings).can_add_dependency(id, dependency)?;

        milestone.insert_dependency(dependency, now)?;
        self.store.save(milestone.clone()).await?;
        self.publisher.publish(DomainEvent::updated(&milestone, now))?;
        Ok(milestone)
    }

    async fn fetch(&self, id: MilestoneId) -> Result<Milestone, CoreError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(CoreError::MilestoneNotFound { id })
    }

    /// A due-date change must keep ordering on both sides: dependencies still
    /// due on or before the milestone, dependents still due on or after it.
    fn check_due_date_change(
        &self,
        milestone: &Milestone,
        new_due: NaiveDate,
        siblings: &[Milestone],
    ) -> Result<(), CoreError> {
        for sibling in siblings {
            if milestone.depends_on(sibling.id) && sibling.due_date > new_due {
                return Err(CoreError::DependencyDueDateConflict {
                    milestone: milestone.id,
                    dependency: sibling.id,
                    milestone_due: new_due,
                    dependency_due: sibling.due_date,
                });
            }
            if sibling.depends_on(milestone.id) && new_due > sibling.due_date {
                return Err(CoreError::DependencyDueDateConflict {
                    milestone: sibling.id,
                    dependency: milestone.id,
                    milestone_due: sibling.due_date,
                    dependency_due: new_due,
                });
            }
        }
        Ok(())
    }
}

fn sort_by_due(milestones: &mut [Milestone]) {
    milestones.sort_by_key(|m| (m.due_date, m.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, MemoryPublisher};
    use crate::limiter::{ManualClock, TierConfig};
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn service() -> MilestoneService<InMemoryStore, MemoryPublisher> {
        MilestoneService::new(Arc::new(InMemoryStore::new()), Arc::new(MemoryPublisher::new()))
    }

    fn due(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, day).unwrap()
    }

    #[tokio::test]
    async fn create_persists_publishes_and_is_monitored() {
        let svc = service();
        let m = svc
            .create(CreateMilestone::new("alpha", "", ProjectId::new(), due(10)))
            .await
            .unwrap();

        assert_eq!(svc.get_by_id(m.id).await.unwrap().id, m.id);
        assert_eq!(svc.publisher.snapshot()[0].kind, EventKind::Created);

        let stats = svc.monitor().snapshot(ops::CREATE).unwrap();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn admission_rejections_are_recorded_without_running_the_op() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_clock(
            RateLimiterConfig {
                read: TierConfig::new(1, Duration::from_secs(60)),
                write: TierConfig::new(1, Duration::from_secs(60)),
            },
            Arc::new(clock),
        );
        let svc = MilestoneService::with_limiter(
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryPublisher::new()),
            limiter,
            ResilienceConfig::default(),
            TransitionTable::default(),
        );

        let id = MilestoneId::new();
        // First call consumes the only token and fails on lookup.
        assert!(matches!(
            svc.get_by_id(id).await,
            Err(CoreError::MilestoneNotFound { .. })
        ));
        // Second is rejected before the store is consulted.
        assert!(matches!(
            svc.get_by_id(id).await,
            Err(CoreError::RateLimited { .. })
        ));

        let stats = svc.monitor().snapshot(ops::GET_BY_ID).unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.workflow_failures, 1);
        assert_eq!(stats.admission_rejections, 1);
    }

    #[tokio::test]
    async fn due_date_change_cannot_break_graph_ordering() {
        let svc = service();
        let project = ProjectId::new();
        let dep = svc
            .create(CreateMilestone::new("dep", "", project, due(5)))
            .await
            .unwrap();
        let m = svc
            .create(
                CreateMilestone::new("m", "", project, due(10)).with_dependencies([dep.id]),
            )
            .await
            .unwrap();

        // Pulling m before its dependency's due date is rejected.
        let err = svc
            .update(m.id, UpdateMilestone::new("m", "", due(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DependencyDueDateConflict { .. }));

        // Pushing the dependency past m is rejected from the other side.
        let err = svc
            .update(dep.id, UpdateMilestone::new("dep", "", due(11)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DependencyDueDateConflict { .. }));

        // A consistent change passes.
        svc.update(m.id, UpdateMilestone::new("m", "", due(20)))
            .await
            .unwrap();
    }
}
