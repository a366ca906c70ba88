//! Workspace and template repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Create/read/update workspaces (the tenant root).
//! - Read-only access to workspace templates.
//!
//! # Invariants
//! - A name collision fails with `RepoError::DuplicateName`; workspaces are
//!   the one natural-key entity that never upserts.
//! - Workspaces are never deleted by this layer.

use super::error::{RepoError, RepoResult};
use crate::model::workspace::{Template, Workspace, WorkspaceId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const WORKSPACE_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    project_type,
    created_at,
    updated_at
FROM workspaces";

const TEMPLATE_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    project_type,
    template_json
FROM templates";

/// Repository interface for workspaces and templates.
pub trait WorkspaceRepository {
    fn create_workspace(
        &self,
        name: &str,
        description: &str,
        project_type: &str,
    ) -> RepoResult<WorkspaceId>;
    fn get_workspace(&self, id: WorkspaceId) -> RepoResult<Option<Workspace>>;
    fn get_workspace_by_name(&self, name: &str) -> RepoResult<Option<Workspace>>;
    /// All workspaces ordered by name.
    fn list_workspaces(&self) -> RepoResult<Vec<Workspace>>;
    fn update_workspace(
        &self,
        id: WorkspaceId,
        description: &str,
        project_type: &str,
    ) -> RepoResult<()>;
    fn get_template(&self, name: &str) -> RepoResult<Option<Template>>;
    fn list_templates(&self) -> RepoResult<Vec<Template>>;
}

/// SQLite-backed workspace repository.
pub struct SqliteWorkspaceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWorkspaceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl WorkspaceRepository for SqliteWorkspaceRepository<'_> {
    fn create_workspace(
        &self,
        name: &str,
        description: &str,
        project_type: &str,
    ) -> RepoResult<WorkspaceId> {
        let result = self.conn.execute(
            "INSERT INTO workspaces (name, description, project_type)
             VALUES (?1, ?2, ?3);",
            params![name, description, project_type],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(err) => match RepoError::from_write(err) {
                RepoError::Integrity(_) => Err(RepoError::DuplicateName(name.to_string())),
                other => Err(other),
            },
        }
    }

    fn get_workspace(&self, id: WorkspaceId) -> RepoResult<Option<Workspace>> {
        let workspace = self
            .conn
            .query_row(
                &format!("{WORKSPACE_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_workspace_row,
            )
            .optional()?;
        Ok(workspace)
    }

    fn get_workspace_by_name(&self, name: &str) -> RepoResult<Option<Workspace>> {
        let workspace = self
            .conn
            .query_row(
                &format!("{WORKSPACE_SELECT_SQL} WHERE name = ?1;"),
                [name],
                parse_workspace_row,
            )
            .optional()?;
        Ok(workspace)
    }

    fn list_workspaces(&self) -> RepoResult<Vec<Workspace>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{WORKSPACE_SELECT_SQL} ORDER BY name ASC;"))?;
        let rows = stmt.query_map([], parse_workspace_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn update_workspace(
        &self,
        id: WorkspaceId,
        description: &str,
        project_type: &str,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE workspaces
             SET
                description = ?2,
                project_type = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, description, project_type],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "workspace",
                id,
            });
        }
        Ok(())
    }

    fn get_template(&self, name: &str) -> RepoResult<Option<Template>> {
        let template = self
            .conn
            .query_row(
                &format!("{TEMPLATE_SELECT_SQL} WHERE name = ?1;"),
                [name],
                parse_template_row,
            )
            .optional()?;
        Ok(template)
    }

    fn list_templates(&self) -> RepoResult<Vec<Template>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TEMPLATE_SELECT_SQL} ORDER BY name ASC;"))?;
        let rows = stmt.query_map([], parse_template_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn parse_workspace_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        project_type: row.get("project_type")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_template_row(row: &Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        project_type: row.get("project_type")?,
        template_json: row.get("template_json")?,
    })
}
