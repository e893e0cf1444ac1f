//! Domain events published after successful mutations.
//!
//! The service emits exactly one [`DomainEvent`] per successful mutating
//! operation, after the new state is persisted. Events are delivered through
//! the [`EventPublisher`] port; the crate ships three implementations:
//!
//! - [`ChannelPublisher`] pushes onto a bounded flume channel for an external
//!   consumer loop,
//! - [`MemoryPublisher`] collects into a vector (tests and diagnostics),
//! - [`TracingPublisher`] logs each event as structured tracing output.
//!
//! Publishing is not transactional with persistence: a publish failure
//! surfaces as a transient error but the state change has already happened.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::milestone::Milestone;
use crate::types::{MilestoneId, ProjectId, UserId};
use crate::workflow::MilestoneStatus;

// ============================================================================
// Events
// ============================================================================

/// What happened to a milestone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    StatusChanged {
        from: MilestoneStatus,
        to: MilestoneStatus,
        completion_date: Option<DateTime<Utc>>,
    },
    Assigned {
        assignee_id: UserId,
    },
}

/// One milestone lifecycle event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub milestone_id: MilestoneId,
    pub project_id: ProjectId,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl DomainEvent {
    fn from_milestone(milestone: &Milestone, occurred_at: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            milestone_id: milestone.id,
            project_id: milestone.project_id,
            occurred_at,
            kind,
        }
    }

    #[must_use]
    pub fn created(milestone: &Milestone, occurred_at: DateTime<Utc>) -> Self {
        Self::from_milestone(milestone, occurred_at, EventKind::Created)
    }

    #[must_use]
    pub fn updated(milestone: &Milestone, occurred_at: DateTime<Utc>) -> Self {
        Self::from_milestone(milestone, occurred_at, EventKind::Updated)
    }

    #[must_use]
    pub fn status_changed(
        milestone: &Milestone,
        from: MilestoneStatus,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::from_milestone(
            milestone,
            occurred_at,
            EventKind::StatusChanged {
                from,
                to: milestone.status,
                completion_date: milestone.completion_date,
            },
        )
    }

    #[must_use]
    pub fn assigned(milestone: &Milestone, assignee_id: UserId, occurred_at: DateTime<Utc>) -> Self {
        Self::from_milestone(milestone, occurred_at, EventKind::Assigned { assignee_id })
    }

    /// JSON rendering for consumers that want a wire shape.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Null)
    }
}

// ============================================================================
// Publisher port and implementations
// ============================================================================

/// Delivery port for domain events.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), CoreError>;
}

/// Publishes onto a flume channel. Dropping the receiver makes every
/// subsequent publish fail transiently.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: flume::Sender<DomainEvent>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end of its channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<DomainEvent>) {
        let (sender, receiver) = flume::bounded(capacity);
        (Self { sender }, receiver)
    }

    #[must_use]
    pub fn unbounded() -> (Self, flume::Receiver<DomainEvent>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), CoreError> {
        self.sender
            .send(event)
            .map_err(|_| CoreError::transient("event channel closed"))
    }
}

/// Collects events in memory. Intended for tests and in-process diagnostics.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventPublisher for MemoryPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), CoreError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Logs each event through `tracing` at INFO level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: DomainEvent) -> Result<(), CoreError> {
        tracing::info!(
            milestone_id = %event.milestone_id,
            project_id = %event.project_id,
            event = %event.to_json_value(),
            "milestone event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milestone::CreateMilestone;
    use chrono::NaiveDate;

    fn sample() -> Milestone {
        Milestone::create(
            CreateMilestone::new(
                "m",
                "d",
                ProjectId::new(),
                NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            ),
            Utc::now(),
        )
    }

    #[test]
    fn status_change_carries_transition_and_completion() {
        let mut m = sample();
        let from = m.status;
        m.status = MilestoneStatus::InProgress;
        let event = DomainEvent::status_changed(&m, from, Utc::now());
        assert_eq!(
            event.kind,
            EventKind::StatusChanged {
                from: MilestoneStatus::Planned,
                to: MilestoneStatus::InProgress,
                completion_date: None,
            }
        );
        assert_eq!(event.milestone_id, m.id);
    }

    #[test]
    fn json_shape_is_flattened() {
        let m = sample();
        let value = DomainEvent::created(&m, Utc::now()).to_json_value();
        assert_eq!(value["kind"], "created");
        assert_eq!(value["milestone_id"], m.id.to_string());
    }

    #[test]
    fn memory_publisher_collects_in_order() {
        let publisher = MemoryPublisher::new();
        let m = sample();
        publisher.publish(DomainEvent::created(&m, Utc::now())).unwrap();
        publisher
            .publish(DomainEvent::assigned(&m, UserId::new(), Utc::now()))
            .unwrap();

        let events = publisher.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Created);
        publisher.clear();
        assert!(publisher.is_empty());
    }

    #[test]
    fn channel_publisher_delivers_and_fails_when_closed() {
        let (publisher, receiver) = ChannelPublisher::bounded(4);
        let m = sample();
        publisher.publish(DomainEvent::updated(&m, Utc::now())).unwrap();
        assert_eq!(receiver.recv().unwrap().kind, EventKind::Updated);

        drop(receiver);
        let err = publisher
            .publish(DomainEvent::updated(&m, Utc::now()))
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
