//! Persistence port for milestones, plus the in-memory reference store.
//!
//! The service only ever talks to [`MilestoneStore`]; swapping the in-memory
//! implementation for a database-backed one is an adapter concern. Store
//! failures are infrastructure failures: adapters report [`StoreError`] and
//! the service maps it to a transient [`CoreError`], which the resilience
//! layer may retry.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::errors::CoreError;
use crate::milestone::Milestone;
use crate::types::{MilestoneId, ProjectId, UserId};

/// Failure inside a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation.
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::transient(err.to_string())
    }
}

/// Async persistence port. `save` is an upsert keyed by milestone id.
#[async_trait]
pub trait MilestoneStore: Send + Sync {
    async fn save(&self, milestone: Milestone) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: MilestoneId) -> Result<Option<Milestone>, StoreError>;

    /// All milestones of a project, in unspecified order.
    async fn find_by_project(&self, project_id: ProjectId) -> Result<Vec<Milestone>, StoreError>;

    /// All milestones assigned to a user, across projects.
    async fn find_by_assignee(&self, assignee_id: UserId) -> Result<Vec<Milestone>, StoreError>;
}

/// In-memory store backed by a map under an async mutex.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    milestones: Mutex<FxHashMap<MilestoneId, Milestone>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored milestones.
    pub async fn len(&self) -> usize {
        self.milestones.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MilestoneStore for InMemoryStore {
    async fn save(&self, milestone: Milestone) -> Result<(), StoreError> {
        self.milestones.lock().await.insert(milestone.id, milestone);
        Ok(())
    }

    async fn find_by_id(&self, id: MilestoneId) -> Result<Option<Milestone>, StoreError> {
        Ok(self.milestones.lock().await.get(&id).cloned())
    }

    async fn find_by_project(&self, project_id: ProjectId) -> Result<Vec<Milestone>, StoreError> {
        Ok(self
            .milestones
            .lock()
            .await
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn find_by_assignee(&self, assignee_id: UserId) -> Result<Vec<Milestone>, StoreError> {
        Ok(self
            .milestones
            .lock()
            .await
            .values()
            .filter(|m| m.assignee_id == Some(assignee_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milestone::CreateMilestone;
    use chrono::{NaiveDate, Utc};

    fn milestone(project: ProjectId, assignee: Option<UserId>) -> Milestone {
        let mut cmd = CreateMilestone::new(
            "m",
            "d",
            project,
            NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        );
        cmd.assignee_id = assignee;
        Milestone::create(cmd, Utc::now())
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = InMemoryStore::new();
        let mut m = milestone(ProjectId::new(), None);
        store.save(m.clone()).await.unwrap();

        m.name = "renamed".into();
        store.save(m.clone()).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.find_by_id(m.id).await.unwrap().unwrap();
        assert_eq!(found.name, "renamed");
    }

    #[tokio::test]
    async fn queries_filter_by_project_and_assignee() {
        let store = InMemoryStore::new();
        let project = ProjectId::new();
        let user = UserId::new();

        store.save(milestone(project, Some(user))).await.unwrap();
        store.save(milestone(project, None)).await.unwrap();
        store.save(milestone(ProjectId::new(), Some(user))).await.unwrap();

        assert_eq!(store.find_by_project(project).await.unwrap().len(), 2);
        assert_eq!(store.find_by_assignee(user).await.unwrap().len(), 2);
        assert!(store.find_by_id(MilestoneId::new()).await.unwrap().is_none());
    }

    #[test]
    fn store_errors_map_to_transient_core_errors() {
        let err: CoreError = StoreError::Backend("connection reset".into()).into();
        assert!(err.is_retryable());
    }
}
