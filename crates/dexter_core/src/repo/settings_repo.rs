//! Preference and context repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Global key/value preferences with insert-or-update on key.
//! - Workspace-scoped context entries with optional expiry.
//!
//! # Invariants
//! - `set_*` never produces a second row for the same natural key.
//! - Context reads filter `expires_at <= now`; expired rows stay on disk
//!   until `cleanup_expired_contexts` runs.
//! - `now_ms` is supplied by the caller so expiry is checked against one
//!   clock for the whole scope.

use super::error::{RepoError, RepoResult};
use crate::model::workspace::{ContextEntry, ContextStats, Preference, WorkspaceId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PREFERENCE_SELECT_SQL: &str = "SELECT
    key,
    value,
    description,
    updated_at
FROM preferences";

const CONTEXT_SELECT_SQL: &str = "SELECT
    workspace_id,
    key,
    value,
    expires_at,
    updated_at
FROM context";

pub trait SettingsRepository {
    fn get_preference(&self, key: &str) -> RepoResult<Option<Preference>>;
    fn list_preferences(&self) -> RepoResult<Vec<Preference>>;
    /// Inserts or updates `key`. A `None` description keeps the stored one.
    fn set_preference(&self, key: &str, value: &str, description: Option<&str>)
        -> RepoResult<()>;

    fn set_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
        value: &str,
        expires_at: Option<i64>,
    ) -> RepoResult<()>;
    /// Unexpired entry for `(workspace_id, key)`.
    fn get_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
        now_ms: i64,
    ) -> RepoResult<Option<ContextEntry>>;
    /// All unexpired entries in one scope, ordered by key.
    fn list_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        now_ms: i64,
    ) -> RepoResult<Vec<ContextEntry>>;
    /// Deletes expired entries across every scope; returns the row count.
    fn cleanup_expired_contexts(&self, now_ms: i64) -> RepoResult<usize>;
    /// Counts across the whole table.
    fn context_stats(&self, now_ms: i64) -> RepoResult<ContextStats>;
    /// Counts for one scope only.
    fn context_stats_for(
        &self,
        workspace_id: Option<WorkspaceId>,
        now_ms: i64,
    ) -> RepoResult<ContextStats>;
}

pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get_preference(&self, key: &str) -> RepoResult<Option<Preference>> {
        let preference = self
            .conn
            .query_row(
                &format!("{PREFERENCE_SELECT_SQL} WHERE key = ?1;"),
                [key],
                parse_preference_row,
            )
            .optional()?;
        Ok(preference)
    }

    fn list_preferences(&self) -> RepoResult<Vec<Preference>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PREFERENCE_SELECT_SQL} ORDER BY key ASC;"))?;
        let rows = stmt.query_map([], parse_preference_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn set_preference(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> RepoResult<()> {
        self.conn
            .execute(
                "INSERT INTO preferences (key, value, description)
                 VALUES (?1, ?2, COALESCE(?3, ''))
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    description = COALESCE(?3, preferences.description),
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![key, value, description],
            )
            .map_err(RepoError::from_write)?;
        Ok(())
    }

    fn set_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
        value: &str,
        expires_at: Option<i64>,
    ) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE context
                 SET
                    value = ?3,
                    expires_at = ?4,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE workspace_id IS ?1
                   AND key = ?2;",
                params![workspace_id, key, value, expires_at],
            )
            .map_err(RepoError::from_write)?;

        if changed == 0 {
            self.conn
                .execute(
                    "INSERT INTO context (workspace_id, key, value, expires_at)
                     VALUES (?1, ?2, ?3, ?4);",
                    params![workspace_id, key, value, expires_at],
                )
                .map_err(RepoError::from_write)?;
        }
        Ok(())
    }

    fn get_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
        now_ms: i64,
    ) -> RepoResult<Option<ContextEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "{CONTEXT_SELECT_SQL}
                     WHERE workspace_id IS ?1
                       AND key = ?2
                       AND (expires_at IS NULL OR expires_at > ?3);"
                ),
                params![workspace_id, key, now_ms],
                parse_context_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn list_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        now_ms: i64,
    ) -> RepoResult<Vec<ContextEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTEXT_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY key ASC;"
        ))?;
        let rows = stmt.query_map(params![workspace_id, now_ms], parse_context_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn cleanup_expired_contexts(&self, now_ms: i64) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM context
             WHERE expires_at IS NOT NULL
               AND expires_at <= ?1;",
            [now_ms],
        )?;
        Ok(deleted)
    }

    fn context_stats(&self, now_ms: i64) -> RepoResult<ContextStats> {
        let stats = self.conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN expires_at IS NOT NULL AND expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN expires_at IS NULL THEN 1 ELSE 0 END), 0)
             FROM context;",
            [now_ms],
            parse_stats_row,
        )?;
        Ok(stats)
    }

    fn context_stats_for(
        &self,
        workspace_id: Option<WorkspaceId>,
        now_ms: i64,
    ) -> RepoResult<ContextStats> {
        let stats = self.conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN expires_at IS NOT NULL AND expires_at <= ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN expires_at IS NULL THEN 1 ELSE 0 END), 0)
             FROM context
             WHERE workspace_id IS ?1;",
            params![workspace_id, now_ms],
            parse_stats_row,
        )?;
        Ok(stats)
    }
}

fn parse_preference_row(row: &Row<'_>) -> rusqlite::Result<Preference> {
    Ok(Preference {
        key: row.get("key")?,
        value: row.get("value")?,
        description: row.get("description")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_context_row(row: &Row<'_>) -> rusqlite::Result<ContextEntry> {
    Ok(ContextEntry {
        workspace_id: row.get("workspace_id")?,
        key: row.get("key")?,
        value: row.get("value")?,
        expires_at: row.get("expires_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_stats_row(row: &Row<'_>) -> rusqlite::Result<ContextStats> {
    let total = count(row.get::<_, i64>(0)?);
    let expired = count(row.get::<_, i64>(1)?);
    let permanent = count(row.get::<_, i64>(2)?);
    Ok(ContextStats {
        total,
        expired,
        permanent,
        active: total.saturating_sub(expired),
    })
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
