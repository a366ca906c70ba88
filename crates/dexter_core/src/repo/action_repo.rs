//! Action log and checkpoint repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append audit rows and move them through the action lifecycle.
//! - Store and read pre-action checkpoints.
//!
//! # Invariants
//! - Status writes are compare-and-set: a row only moves when its stored
//!   status equals the expected one, and only along a legal edge.
//! - Checkpoint ordering is by id, so "latest" is the last inserted.
//! - Only `completed` rows are eligible for age-based cleanup.

use super::error::{RepoError, RepoResult};
use super::row::flag;
use crate::model::action::{
    ActionId, ActionLogEntry, ActionStatus, Checkpoint, CheckpointId, NewAction,
};
use crate::model::workspace::WorkspaceId;
use crate::validation::ValidationError;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::BTreeMap;

const ACTION_SELECT_SQL: &str = "SELECT
    id,
    workspace_id,
    action_type,
    target,
    description,
    status,
    rollback_info,
    timestamp
FROM action_log";

const CHECKPOINT_SELECT_SQL: &str = "SELECT
    id,
    action_id,
    checkpoint_type,
    state_snapshot,
    verified,
    created_at
FROM checkpoints";

/// Filter for [`ActionRepository::list_actions`].
///
/// Unlike record scopes, `workspace_id = None` here means "every workspace".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionQuery {
    pub workspace_id: Option<WorkspaceId>,
    pub status: Option<ActionStatus>,
    pub limit: u32,
}

impl Default for ActionQuery {
    fn default() -> Self {
        Self {
            workspace_id: None,
            status: None,
            limit: 100,
        }
    }
}

/// Extra columns written alongside a status transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionNote<'a> {
    pub description: Option<&'a str>,
    pub rollback_info: Option<&'a str>,
}

pub trait ActionRepository {
    fn log_action(&self, action: &NewAction) -> RepoResult<ActionId>;
    fn get_action(&self, id: ActionId) -> RepoResult<Option<ActionLogEntry>>;
    /// Newest first.
    fn list_actions(&self, query: &ActionQuery) -> RepoResult<Vec<ActionLogEntry>>;
    /// Moves `id` from `from` to `to`.
    ///
    /// Returns `Ok(false)` when the row is missing or not in `from`; an
    /// illegal edge fails validation before touching the store.
    fn transition_status(
        &self,
        id: ActionId,
        from: ActionStatus,
        to: ActionStatus,
        note: TransitionNote<'_>,
    ) -> RepoResult<bool>;
    /// Row count per status; statuses with no rows are reported as zero.
    fn status_counts(&self) -> RepoResult<BTreeMap<ActionStatus, u64>>;
    /// Deletes `completed` rows stamped before `cutoff_ms`.
    fn cleanup_completed_before(&self, cutoff_ms: i64) -> RepoResult<usize>;

    fn create_checkpoint(
        &self,
        action_id: ActionId,
        checkpoint_type: &str,
        state_snapshot: &str,
    ) -> RepoResult<CheckpointId>;
    /// Returns whether a row was updated.
    fn verify_checkpoint(&self, id: CheckpointId) -> RepoResult<bool>;
    fn latest_checkpoint(&self, action_id: ActionId) -> RepoResult<Option<Checkpoint>>;
    fn list_checkpoints(&self, action_id: ActionId) -> RepoResult<Vec<Checkpoint>>;
}

pub struct SqliteActionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ActionRepository for SqliteActionRepository<'_> {
    fn log_action(&self, action: &NewAction) -> RepoResult<ActionId> {
        self.conn
            .execute(
                "INSERT INTO action_log (
                    workspace_id,
                    action_type,
                    target,
                    description,
                    status
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    action.workspace_id,
                    action.action_type.as_str(),
                    action.target.as_deref(),
                    action.description.as_deref(),
                    action.status.as_str(),
                ],
            )
            .map_err(RepoError::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_action(&self, id: ActionId) -> RepoResult<Option<ActionLogEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACTION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_action_row(row)?));
        }
        Ok(None)
    }

    fn list_actions(&self, query: &ActionQuery) -> RepoResult<Vec<ActionLogEntry>> {
        let mut sql = format!("{ACTION_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(workspace_id) = query.workspace_id {
            sql.push_str(" AND workspace_id = ?");
            bind_values.push(Value::Integer(workspace_id));
        }
        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?;");
        bind_values.push(Value::Integer(i64::from(query.limit)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut actions = Vec::new();
        while let Some(row) = rows.next()? {
            actions.push(parse_action_row(row)?);
        }
        Ok(actions)
    }

    fn transition_status(
        &self,
        id: ActionId,
        from: ActionStatus,
        to: ActionStatus,
        note: TransitionNote<'_>,
    ) -> RepoResult<bool> {
        if !from.can_transition_to(to) {
            return Err(ValidationError::Rejected(format!(
                "illegal action transition {from} -> {to}"
            ))
            .into());
        }

        let changed = self.conn.execute(
            "UPDATE action_log
             SET
                status = ?3,
                description = COALESCE(?4, description),
                rollback_info = COALESCE(?5, rollback_info)
             WHERE id = ?1
               AND status = ?2;",
            params![
                id,
                from.as_str(),
                to.as_str(),
                note.description,
                note.rollback_info,
            ],
        )?;
        Ok(changed == 1)
    }

    fn status_counts(&self) -> RepoResult<BTreeMap<ActionStatus, u64>> {
        let mut counts: BTreeMap<ActionStatus, u64> =
            ActionStatus::ALL.into_iter().map(|status| (status, 0)).collect();

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM action_log GROUP BY status;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let status = parse_status(&raw)?;
            counts.insert(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }

    fn cleanup_completed_before(&self, cutoff_ms: i64) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM action_log
             WHERE status = 'completed'
               AND timestamp < ?1;",
            [cutoff_ms],
        )?;
        Ok(deleted)
    }

    fn create_checkpoint(
        &self,
        action_id: ActionId,
        checkpoint_type: &str,
        state_snapshot: &str,
    ) -> RepoResult<CheckpointId> {
        self.conn
            .execute(
                "INSERT INTO checkpoints (action_id, checkpoint_type, state_snapshot)
                 VALUES (?1, ?2, ?3);",
                params![action_id, checkpoint_type, state_snapshot],
            )
            .map_err(RepoError::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn verify_checkpoint(&self, id: CheckpointId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("UPDATE checkpoints SET verified = 1 WHERE id = ?1;", [id])?;
        Ok(changed == 1)
    }

    fn latest_checkpoint(&self, action_id: ActionId) -> RepoResult<Option<Checkpoint>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CHECKPOINT_SELECT_SQL}
             WHERE action_id = ?1
             ORDER BY id DESC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([action_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_checkpoint_row(row)?));
        }
        Ok(None)
    }

    fn list_checkpoints(&self, action_id: ActionId) -> RepoResult<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CHECKPOINT_SELECT_SQL}
             WHERE action_id = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([action_id])?;
        let mut checkpoints = Vec::new();
        while let Some(row) = rows.next()? {
            checkpoints.push(parse_checkpoint_row(row)?);
        }
        Ok(checkpoints)
    }
}

fn parse_status(raw: &str) -> RepoResult<ActionStatus> {
    ActionStatus::parse(raw).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status value `{raw}` in action_log.status"))
    })
}

fn parse_action_row(row: &Row<'_>) -> RepoResult<ActionLogEntry> {
    let raw_status: String = row.get("status")?;
    Ok(ActionLogEntry {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        action_type: row.get("action_type")?,
        target: row.get("target")?,
        description: row.get("description")?,
        status: parse_status(&raw_status)?,
        rollback_info: row.get("rollback_info")?,
        timestamp: row.get("timestamp")?,
    })
}

fn parse_checkpoint_row(row: &Row<'_>) -> RepoResult<Checkpoint> {
    Ok(Checkpoint {
        id: row.get("id")?,
        action_id: row.get("action_id")?,
        checkpoint_type: row.get("checkpoint_type")?,
        state_snapshot: row.get("state_snapshot")?,
        verified: flag(row, "verified", "checkpoints")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{ActionRepository, SqliteActionRepository, TransitionNote};
    use crate::db::{open_db_in_memory, BUNDLED_SCHEMA};
    use crate::model::action::{ActionStatus, NewAction};
    use crate::repo::RepoError;

    #[test]
    fn transition_is_compare_and_set() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch(BUNDLED_SCHEMA).unwrap();
        let repo = SqliteActionRepository::new(&conn);
        let id = repo.log_action(&NewAction::pending(None, "edit")).unwrap();

        let note = TransitionNote::default();
        assert!(repo
            .transition_status(id, ActionStatus::Pending, ActionStatus::InProgress, note)
            .unwrap());
        assert!(!repo
            .transition_status(id, ActionStatus::Pending, ActionStatus::InProgress, note)
            .unwrap());

        let illegal =
            repo.transition_status(id, ActionStatus::Pending, ActionStatus::Completed, note);
        assert!(matches!(illegal, Err(RepoError::Validation(_))));
        assert_eq!(
            repo.get_action(id).unwrap().unwrap().status,
            ActionStatus::InProgress
        );
    }

    #[test]
    fn latest_checkpoint_is_last_inserted() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch(BUNDLED_SCHEMA).unwrap();
        let repo = SqliteActionRepository::new(&conn);
        let action = repo.log_action(&NewAction::pending(None, "edit")).unwrap();

        repo.create_checkpoint(action, "before", "{\"v\":1}").unwrap();
        let second = repo.create_checkpoint(action, "before", "{\"v\":2}").unwrap();

        let latest = repo.latest_checkpoint(action).unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.state_snapshot, "{\"v\":2}");
        assert!(!latest.verified);
        assert!(repo.verify_checkpoint(second).unwrap());
        assert!(!repo.verify_checkpoint(second + 100).unwrap());
    }
}
