//! # Milegraph: Milestone Management Core
//!
//! Milegraph models project milestones as nodes in a per-project dependency
//! graph and pushes every operation through a uniform reliability pipeline:
//! rate limiting, circuit breaking with bounded retry, and per-operation
//! monitoring.
//!
//! ## Core Concepts
//!
//! - **Milestone**: The aggregate — name, due date, progress, assignee, and
//!   the set of milestones it depends on
//! - **Workflow**: A four-state machine (`PLANNED`, `IN_PROGRESS`,
//!   `COMPLETED`, `CANCELLED`) whose legal transitions are data, not code
//! - **Dependency graph**: Acyclic by construction, with every dependency due
//!   on or before the milestone that depends on it
//! - **Pipeline**: Token-bucket admission, per-operation circuit breakers,
//!   retry for transient faults only, and an in-flight/outcome monitor
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use milegraph::events::MemoryPublisher;
//! use milegraph::milestone::CreateMilestone;
//! use milegraph::service::MilestoneService;
//! use milegraph::store::InMemoryStore;
//! use milegraph::types::ProjectId;
//! use milegraph::workflow::MilestoneStatus;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), milegraph::errors::CoreError> {
//! let service = MilestoneService::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(MemoryPublisher::new()),
//! );
//!
//! let project = ProjectId::new();
//! let due = |d| NaiveDate::from_ymd_opt(2026, 10, d).unwrap();
//!
//! // Design must land before the beta that depends on it.
//! let design = service
//!     .create(CreateMilestone::new("design", "design sign-off", project, due(5)))
//!     .await?;
//! let beta = service
//!     .create(
//!         CreateMilestone::new("beta", "beta to early users", project, due(20))
//!             .with_dependencies([design.id]),
//!     )
//!     .await?;
//!
//! // Beta cannot complete while its dependency is open.
//! service.update_status(beta.id, MilestoneStatus::InProgress).await?;
//! assert!(service
//!     .update_status(beta.id, MilestoneStatus::Completed)
//!     .await
//!     .is_err());
//!
//! service.update_status(design.id, MilestoneStatus::InProgress).await?;
//! service.update_status(design.id, MilestoneStatus::Completed).await?;
//! let done = service.update_status(beta.id, MilestoneStatus::Completed).await?;
//! assert_eq!(done.progress, 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is a [`errors::CoreError`] carrying a
//! [`errors::ErrorKind`]. The kind is what the pipeline acts on: only
//! transient faults are retried or counted against a circuit breaker;
//! structural and workflow rejections pass through untouched, and admission
//! or circuit-open rejections never reach the operation at all.
//!
//! ## Observability
//!
//! Successful mutations publish a [`events::DomainEvent`] through the
//! [`events::EventPublisher`] port, and every call is measured by
//! [`monitor::OperationMonitor`] (in-flight gauge, latency, outcome counters
//! per operation).

pub mod errors;
pub mod events;
pub mod graph;
pub mod limiter;
pub mod milestone;
pub mod monitor;
pub mod resilience;
pub mod service;
pub mod store;
pub mod types;
pub mod workflow;
