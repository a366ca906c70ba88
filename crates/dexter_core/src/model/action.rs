//! Action log and checkpoint records.
//!
//! # Invariants
//! - Status moves `pending -> in_progress -> {completed | failed}`; a
//!   rollback moves `completed | failed -> cancelled`. Nothing else.
//! - Checkpoints belong to exactly one action; the newest one wins.

use super::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub type ActionId = i64;
pub type CheckpointId = i64;

/// Lifecycle state of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ActionStatus {
    pub const ALL: [ActionStatus; 5] = [
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    /// Returns whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::Completed, Self::Cancelled)
                | (Self::Failed, Self::Cancelled)
        )
    }
}

impl Display for ActionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the `action_log` audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: ActionId,
    pub workspace_id: Option<WorkspaceId>,
    pub action_type: String,
    pub target: Option<String>,
    pub description: Option<String>,
    pub status: ActionStatus,
    pub rollback_info: Option<String>,
    pub timestamp: i64,
}

/// Input for appending an action log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAction {
    pub workspace_id: Option<WorkspaceId>,
    pub action_type: String,
    pub target: Option<String>,
    pub description: Option<String>,
    pub status: ActionStatus,
}

impl NewAction {
    /// A `pending` action with no target or description.
    pub fn pending(workspace_id: Option<WorkspaceId>, action_type: impl Into<String>) -> Self {
        Self {
            workspace_id,
            action_type: action_type.into(),
            target: None,
            description: None,
            status: ActionStatus::Pending,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Pre-action state snapshot used for rollback bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub action_id: ActionId,
    pub checkpoint_type: String,
    /// Opaque serialized state, usually JSON.
    pub state_snapshot: String,
    pub verified: bool,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::ActionStatus;

    #[test]
    fn status_round_trips_through_db_text() {
        for status in ActionStatus::ALL {
            assert_eq!(ActionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ActionStatus::parse("done"), None);
    }

    #[test]
    fn lifecycle_never_skips_in_progress() {
        assert!(ActionStatus::Pending.can_transition_to(ActionStatus::InProgress));
        assert!(!ActionStatus::Pending.can_transition_to(ActionStatus::Completed));
        assert!(!ActionStatus::Pending.can_transition_to(ActionStatus::Failed));
        assert!(ActionStatus::InProgress.can_transition_to(ActionStatus::Completed));
        assert!(ActionStatus::Completed.can_transition_to(ActionStatus::Cancelled));
        assert!(!ActionStatus::Cancelled.can_transition_to(ActionStatus::Completed));
        assert!(!ActionStatus::InProgress.can_transition_to(ActionStatus::Cancelled));
    }
}
