//! Core identity types for the milestone management core.
//!
//! This module defines the fundamental identifier types used throughout the
//! crate, plus the operation-name classification used by the admission layer.
//! These are the domain concepts that every other module speaks in terms of.
//!
//! # Key Types
//!
//! - [`MilestoneId`] / [`ProjectId`] / [`UserId`]: uuid-backed newtypes so the
//!   compiler keeps the three id spaces apart
//! - [`OperationClass`]: read/write tier classification of operation names
//!
//! # Examples
//!
//! ```rust
//! use milegraph::types::{MilestoneId, OperationClass};
//!
//! let id = MilestoneId::new();
//! assert_ne!(id, MilestoneId::new());
//!
//! assert_eq!(OperationClass::of("milestone.get_by_id"), OperationClass::Read);
//! assert_eq!(OperationClass::of("milestone.create"), OperationClass::Write);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing uuid (e.g. one loaded from persistence).
            #[must_use]
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying uuid.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype! {
    /// Identifies a single milestone.
    MilestoneId
}

id_newtype! {
    /// Identifies the project that owns a set of milestones.
    ///
    /// Dependency edges never cross project boundaries; every graph check is
    /// scoped to one `ProjectId`.
    ProjectId
}

id_newtype! {
    /// Identifies a user (milestone assignee).
    UserId
}

/// Admission tier of an operation, derived from its name.
///
/// Read operations get the generous token-bucket tier; mutating operations
/// get the stricter one. Classification looks at the final dot-separated
/// segment of the operation name: segments starting with `get`, `list`, or
/// `find` are reads, everything else is a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Query operations (`get_*`, `list_*`, `find_*`).
    Read,
    /// Mutating operations (create/update/assign/add-dependency/...).
    Write,
}

impl OperationClass {
    /// Classify an operation name into its admission tier.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use milegraph::types::OperationClass;
    ///
    /// assert_eq!(OperationClass::of("milestone.get_by_project"), OperationClass::Read);
    /// assert_eq!(OperationClass::of("milestone.find_overdue"), OperationClass::Read);
    /// assert_eq!(OperationClass::of("milestone.add_dependency"), OperationClass::Write);
    /// // Unqualified names classify on the whole name
    /// assert_eq!(OperationClass::of("list_all"), OperationClass::Read);
    /// ```
    #[must_use]
    pub fn of(operation: &str) -> Self {
        let segment = operation.rsplit('.').next().unwrap_or(operation);
        if segment.starts_with("get") || segment.starts_with("list") || segment.starts_with("find")
        {
            OperationClass::Read
        } else {
            OperationClass::Write
        }
    }

    /// Returns `true` for the read tier.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_across_generation() {
        let a = MilestoneId::new();
        let b = MilestoneId::new();
        assert_ne!(a, b);
        assert_eq!(a, MilestoneId::from_uuid(*a.as_uuid()));
    }

    #[test]
    fn display_matches_uuid() {
        let raw = Uuid::new_v4();
        let id = ProjectId::from(raw);
        assert_eq!(id.to_string(), raw.to_string());
    }

    #[test]
    fn classification_by_final_segment() {
        assert_eq!(
            OperationClass::of("milestone.get_by_id"),
            OperationClass::Read
        );
        assert_eq!(
            OperationClass::of("milestone.get_upcoming"),
            OperationClass::Read
        );
        assert_eq!(OperationClass::of("milestone.create"), OperationClass::Write);
        assert_eq!(
            OperationClass::of("milestone.update_status"),
            OperationClass::Write
        );
        assert_eq!(OperationClass::of("milestone.assign"), OperationClass::Write);
    }

    #[test]
    fn classification_without_namespace() {
        assert_eq!(OperationClass::of("get"), OperationClass::Read);
        assert_eq!(OperationClass::of("update"), OperationClass::Write);
        assert_eq!(OperationClass::of(""), OperationClass::Write);
    }

    #[test]
    fn serde_round_trip() {
        let id = MilestoneId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: MilestoneId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
