//! Preference, context and retention use-cases.
//!
//! # Responsibility
//! - Upsert preferences and context entries.
//! - Turn TTLs into absolute expiry stamps.
//! - Run the explicit cleanup passes for expired context and old actions.
//!
//! # Invariants
//! - Every read in one call is checked against a single `now` sample.
//! - Keys are cleaned the same way on write and on lookup.
//! - Cleanup is the only path that physically deletes context or action rows.

use crate::db::Store;
use crate::model::now_epoch_ms;
use crate::model::workspace::{ContextEntry, ContextStats, Preference, WorkspaceId};
use crate::repo::action_repo::{ActionRepository, SqliteActionRepository};
use crate::repo::settings_repo::{SettingsRepository, SqliteSettingsRepository};
use crate::repo::RepoResult;
use crate::validation::{require_non_empty, sanitize_string, validate_scope};
use log::info;
use std::time::Duration;

const MAX_KEY_CHARS: usize = 255;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct ContextService {
    store: Store,
}

impl ContextService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Looks `key` up after the same cleaning `set_preference` applies.
    pub fn get_preference(&self, key: &str) -> RepoResult<Option<String>> {
        let key = checked_key(key)?;
        Ok(self
            .store
            .with_connection(|tx| SqliteSettingsRepository::new(tx).get_preference(&key))?
            .map(|preference| preference.value))
    }

    pub fn list_preferences(&self) -> RepoResult<Vec<Preference>> {
        self.store
            .with_connection(|tx| SqliteSettingsRepository::new(tx).list_preferences())
    }

    /// Inserts or overwrites `key`. `description` is kept when `None`.
    pub fn set_preference(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> RepoResult<()> {
        let key = checked_key(key)?;
        self.store.with_write_connection(|tx| {
            SqliteSettingsRepository::new(tx).set_preference(&key, value, description)
        })
    }

    /// Upserts a context entry; `expires_at` is epoch milliseconds.
    pub fn set_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
        value: &str,
        expires_at: Option<i64>,
    ) -> RepoResult<()> {
        validate_scope(workspace_id)?;
        let key = checked_key(key)?;
        self.store.with_write_connection(|tx| {
            SqliteSettingsRepository::new(tx).set_context(workspace_id, &key, value, expires_at)
        })
    }

    /// Upserts a context entry that expires `ttl` from now.
    pub fn set_context_with_ttl(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> RepoResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_epoch_ms().saturating_add(ttl_ms);
        self.set_context(workspace_id, key, value, Some(expires_at))
    }

    /// Value of an unexpired entry.
    pub fn get_context(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
    ) -> RepoResult<Option<String>> {
        Ok(self
            .get_context_entry(workspace_id, key)?
            .map(|entry| entry.value))
    }

    pub fn get_context_entry(
        &self,
        workspace_id: Option<WorkspaceId>,
        key: &str,
    ) -> RepoResult<Option<ContextEntry>> {
        validate_scope(workspace_id)?;
        let key = checked_key(key)?;
        let now = now_epoch_ms();
        self.store.with_connection(|tx| {
            SqliteSettingsRepository::new(tx).get_context(workspace_id, &key, now)
        })
    }

    pub fn list_context(&self, workspace_id: Option<WorkspaceId>) -> RepoResult<Vec<ContextEntry>> {
        validate_scope(workspace_id)?;
        let now = now_epoch_ms();
        self.store
            .with_connection(|tx| SqliteSettingsRepository::new(tx).list_context(workspace_id, now))
    }

    /// Deletes expired context rows in every scope.
    pub fn cleanup_expired_contexts(&self) -> RepoResult<usize> {
        let now = now_epoch_ms();
        let deleted = self.store.with_write_connection(|tx| {
            SqliteSettingsRepository::new(tx).cleanup_expired_contexts(now)
        })?;
        info!("event=context_cleanup module=service status=ok deleted={deleted}");
        Ok(deleted)
    }

    /// Deletes `completed` action rows older than `days`.
    pub fn cleanup_old_actions(&self, days: u32) -> RepoResult<usize> {
        let cutoff = now_epoch_ms().saturating_sub(i64::from(days).saturating_mul(DAY_MS));
        let deleted = self.store.with_write_connection(|tx| {
            SqliteActionRepository::new(tx).cleanup_completed_before(cutoff)
        })?;
        info!("event=action_cleanup module=service status=ok days={days} deleted={deleted}");
        Ok(deleted)
    }

    /// Counts across every scope.
    pub fn context_stats(&self) -> RepoResult<ContextStats> {
        let now = now_epoch_ms();
        self.store
            .with_connection(|tx| SqliteSettingsRepository::new(tx).context_stats(now))
    }

    pub fn context_stats_for(&self, workspace_id: Option<WorkspaceId>) -> RepoResult<ContextStats> {
        validate_scope(workspace_id)?;
        let now = now_epoch_ms();
        self.store.with_connection(|tx| {
            SqliteSettingsRepository::new(tx).context_stats_for(workspace_id, now)
        })
    }
}

fn checked_key(key: &str) -> RepoResult<String> {
    let key = sanitize_string(key, Some(MAX_KEY_CHARS), false)?;
    require_non_empty("key", &key)?;
    Ok(key)
}
