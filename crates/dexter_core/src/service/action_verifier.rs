//! Action audit trail and checkpoint bookkeeping.
//!
//! # Responsibility
//! - Append action rows and drive them through
//!   `pending -> in_progress -> completed | failed -> cancelled`.
//! - Store pre-action snapshots and mark actions rolled back.
//!
//! # Invariants
//! - Every transition is compare-and-set against the expected status.
//! - Rollback needs a checkpoint and a `completed` or `failed` action;
//!   otherwise it returns `false` and writes nothing.
//! - Rollback only records `cancelled` plus `rollback_info`. Replaying the
//!   snapshot onto live rows is left to the caller via `latest_checkpoint`.

use crate::db::Store;
use crate::model::action::{
    ActionId, ActionLogEntry, ActionStatus, Checkpoint, CheckpointId, NewAction,
};
use crate::repo::action_repo::{
    ActionQuery, ActionRepository, SqliteActionRepository, TransitionNote,
};
use crate::repo::{RepoError, RepoResult};
use crate::validation::{require_non_empty, validate_id, ValidationError};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ActionVerifier {
    store: Store,
}

impl ActionVerifier {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn log_action(&self, action: &NewAction) -> RepoResult<ActionId> {
        require_non_empty("action_type", &action.action_type)?;
        let id = self
            .store
            .with_write_connection(|tx| SqliteActionRepository::new(tx).log_action(action))?;
        info!(
            "event=action_log module=audit status={} action_id={} action_type={}",
            action.status, id, action.action_type
        );
        Ok(id)
    }

    pub fn get_action(&self, id: ActionId) -> RepoResult<Option<ActionLogEntry>> {
        validate_id("action_id", id)?;
        self.store
            .with_connection(|tx| SqliteActionRepository::new(tx).get_action(id))
    }

    pub fn list_actions(&self, query: &ActionQuery) -> RepoResult<Vec<ActionLogEntry>> {
        self.store
            .with_connection(|tx| SqliteActionRepository::new(tx).list_actions(query))
    }

    pub fn status_counts(&self) -> RepoResult<BTreeMap<ActionStatus, u64>> {
        self.store
            .with_connection(|tx| SqliteActionRepository::new(tx).status_counts())
    }

    /// Compare-and-set transition; `Ok(false)` when the row was not in `from`.
    pub fn transition(
        &self,
        id: ActionId,
        from: ActionStatus,
        to: ActionStatus,
        note: TransitionNote<'_>,
    ) -> RepoResult<bool> {
        let moved = self.store.with_write_connection(|tx| {
            SqliteActionRepository::new(tx).transition_status(id, from, to, note)
        })?;
        if moved {
            info!("event=action_transition module=audit status=ok action_id={id} from={from} to={to}");
        } else {
            warn!(
                "event=action_transition module=audit status=rejected action_id={id} from={from} to={to}"
            );
        }
        Ok(moved)
    }

    pub fn mark_in_progress(&self, id: ActionId) -> RepoResult<bool> {
        self.transition(
            id,
            ActionStatus::Pending,
            ActionStatus::InProgress,
            TransitionNote::default(),
        )
    }

    pub fn mark_completed(&self, id: ActionId) -> RepoResult<bool> {
        self.transition(
            id,
            ActionStatus::InProgress,
            ActionStatus::Completed,
            TransitionNote::default(),
        )
    }

    /// Marks an in-progress action failed, attaching `description`.
    pub fn mark_failed(&self, id: ActionId, description: &str) -> RepoResult<bool> {
        self.transition(
            id,
            ActionStatus::InProgress,
            ActionStatus::Failed,
            TransitionNote {
                description: Some(description),
                rollback_info: None,
            },
        )
    }

    /// Stores an opaque snapshot taken before `action_id` runs.
    pub fn create_checkpoint(
        &self,
        action_id: ActionId,
        checkpoint_type: &str,
        state_snapshot: &str,
    ) -> RepoResult<CheckpointId> {
        validate_id("action_id", action_id)?;
        require_non_empty("checkpoint_type", checkpoint_type)?;
        let id = self.store.with_write_connection(|tx| {
            SqliteActionRepository::new(tx).create_checkpoint(
                action_id,
                checkpoint_type,
                state_snapshot,
            )
        })?;
        info!(
            "event=checkpoint_create module=audit status=ok action_id={action_id} checkpoint_id={id}"
        );
        Ok(id)
    }

    /// Serializes `state` to JSON and stores it as a checkpoint.
    pub fn create_json_checkpoint<T: Serialize>(
        &self,
        action_id: ActionId,
        checkpoint_type: &str,
        state: &T,
    ) -> RepoResult<CheckpointId> {
        let snapshot = serde_json::to_string(state)
            .map_err(|err| RepoError::Validation(ValidationError::InvalidJson(err.to_string())))?;
        self.create_checkpoint(action_id, checkpoint_type, &snapshot)
    }

    /// Marks a checkpoint verified; `false` when it does not exist.
    pub fn verify_checkpoint(&self, id: CheckpointId) -> RepoResult<bool> {
        let updated = self
            .store
            .with_write_connection(|tx| SqliteActionRepository::new(tx).verify_checkpoint(id))?;
        if !updated {
            warn!("event=checkpoint_verify module=audit status=error reason=not_found checkpoint_id={id}");
        }
        Ok(updated)
    }

    pub fn latest_checkpoint(&self, action_id: ActionId) -> RepoResult<Option<Checkpoint>> {
        self.store
            .with_connection(|tx| SqliteActionRepository::new(tx).latest_checkpoint(action_id))
    }

    /// `true` only when the action exists and is exactly `completed`.
    pub fn verify_action_completion(&self, action_id: ActionId) -> RepoResult<bool> {
        match self.get_action(action_id)? {
            Some(action) if action.status == ActionStatus::Completed => Ok(true),
            Some(action) => {
                warn!(
                    "event=action_verify module=audit status=error action_id={} actual={}",
                    action_id, action.status
                );
                Ok(false)
            }
            None => {
                error!("event=action_verify module=audit status=error reason=not_found action_id={action_id}");
                Ok(false)
            }
        }
    }

    /// Marks a finished action `cancelled` using its latest checkpoint.
    pub fn rollback_action(&self, action_id: ActionId, rollback_info: &str) -> RepoResult<bool> {
        self.store.with_write_connection(|tx| -> RepoResult<bool> {
            let repo = SqliteActionRepository::new(tx);
            let Some(checkpoint) = repo.latest_checkpoint(action_id)? else {
                error!(
                    "event=action_rollback module=audit status=error reason=no_checkpoint action_id={action_id}"
                );
                return Ok(false);
            };
            let Some(action) = repo.get_action(action_id)? else {
                error!("event=action_rollback module=audit status=error reason=not_found action_id={action_id}");
                return Ok(false);
            };
            if !action.status.can_transition_to(ActionStatus::Cancelled) {
                warn!(
                    "event=action_rollback module=audit status=rejected action_id={} actual={}",
                    action_id, action.status
                );
                return Ok(false);
            }

            let moved = repo.transition_status(
                action_id,
                action.status,
                ActionStatus::Cancelled,
                TransitionNote {
                    description: None,
                    rollback_info: Some(rollback_info),
                },
            )?;
            if moved {
                info!(
                    "event=action_rollback module=audit status=ok action_id={} checkpoint_id={}",
                    action_id, checkpoint.id
                );
            }
            Ok(moved)
        })
    }
}
