//! Integration repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Only the env-var *name* of a secret is ever written.
//! - Reads through `get_integrations` hide deactivated rows.

use super::error::{RepoError, RepoResult};
use super::row::flag;
use crate::model::workspace::{Integration, IntegrationId, NewIntegration, WorkspaceId};
use rusqlite::{params, Connection, Row};

const INTEGRATION_SELECT_SQL: &str = "SELECT
    id,
    workspace_id,
    integration_type,
    name,
    config_json,
    api_key_env_var,
    is_active,
    created_at
FROM integrations";

pub trait IntegrationRepository {
    fn add_integration(&self, integration: &NewIntegration) -> RepoResult<IntegrationId>;
    /// Loads one active integration.
    fn get_integration(&self, id: IntegrationId) -> RepoResult<Option<Integration>>;
    /// Active integrations for one scope, optionally of a single type.
    fn get_integrations(
        &self,
        workspace_id: Option<WorkspaceId>,
        integration_type: Option<&str>,
    ) -> RepoResult<Vec<Integration>>;
    fn deactivate_integration(&self, id: IntegrationId) -> RepoResult<()>;
}

pub struct SqliteIntegrationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIntegrationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl IntegrationRepository for SqliteIntegrationRepository<'_> {
    fn add_integration(&self, integration: &NewIntegration) -> RepoResult<IntegrationId> {
        self.conn
            .execute(
                "INSERT INTO integrations (
                    workspace_id,
                    integration_type,
                    name,
                    config_json,
                    api_key_env_var
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    integration.workspace_id,
                    integration.integration_type.as_str(),
                    integration.name.as_str(),
                    integration.config_json.as_str(),
                    integration.api_key_env_var.as_str(),
                ],
            )
            .map_err(RepoError::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_integration(&self, id: IntegrationId) -> RepoResult<Option<Integration>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INTEGRATION_SELECT_SQL} WHERE id = ?1 AND is_active = 1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_integration_row(row)?));
        }
        Ok(None)
    }

    fn get_integrations(
        &self,
        workspace_id: Option<WorkspaceId>,
        integration_type: Option<&str>,
    ) -> RepoResult<Vec<Integration>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INTEGRATION_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND is_active = 1
               AND (?2 IS NULL OR integration_type = ?2)
             ORDER BY integration_type ASC, name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![workspace_id, integration_type])?;
        let mut integrations = Vec::new();
        while let Some(row) = rows.next()? {
            integrations.push(parse_integration_row(row)?);
        }
        Ok(integrations)
    }

    fn deactivate_integration(&self, id: IntegrationId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE integrations
             SET
                is_active = 0,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "integration",
                id,
            });
        }
        Ok(())
    }
}

fn parse_integration_row(row: &Row<'_>) -> RepoResult<Integration> {
    Ok(Integration {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        integration_type: row.get("integration_type")?,
        name: row.get("name")?,
        config_json: row.get("config_json")?,
        api_key_env_var: row.get("api_key_env_var")?,
        is_active: flag(row, "is_active", "integrations")?,
        created_at: row.get("created_at")?,
    })
}
