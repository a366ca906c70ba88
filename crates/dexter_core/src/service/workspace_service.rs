//! Workspace, template and integration use-cases.
//!
//! # Responsibility
//! - Validate and sanitize input, then run one scoped transaction per call.
//!
//! # Invariants
//! - Validation runs before a scope is opened; a rejected call never
//!   touches the store.
//! - Integration config must be a JSON object; secrets are referenced by
//!   env-var name only.

use crate::db::Store;
use crate::model::workspace::{
    Integration, IntegrationId, NewIntegration, Template, Workspace, WorkspaceId,
};
use crate::repo::integration_repo::{IntegrationRepository, SqliteIntegrationRepository};
use crate::repo::workspace_repo::{SqliteWorkspaceRepository, WorkspaceRepository};
use crate::repo::RepoResult;
use crate::validation::{
    require_non_empty, sanitize_string, validate_id, validate_integration_type, validate_json,
    validate_scope, validate_workspace_id,
};
use log::info;

const MAX_NAME_CHARS: usize = 255;
const MAX_DESCRIPTION_CHARS: usize = 1_000;

/// Workspace-level facade over [`Store`].
#[derive(Debug, Clone)]
pub struct WorkspaceService {
    store: Store,
}

impl WorkspaceService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates a workspace; a taken name fails with `DuplicateName`.
    pub fn create_workspace(
        &self,
        name: &str,
        description: &str,
        project_type: &str,
    ) -> RepoResult<WorkspaceId> {
        let name = sanitize_string(name, Some(MAX_NAME_CHARS), false)?;
        require_non_empty("workspace name", &name)?;
        let description = sanitize_string(description, Some(MAX_DESCRIPTION_CHARS), true)?;
        let project_type = match sanitize_string(project_type, Some(MAX_NAME_CHARS), false)? {
            value if value.is_empty() => "general".to_string(),
            value => value,
        };

        let id = self.store.with_write_connection(|tx| {
            SqliteWorkspaceRepository::new(tx).create_workspace(&name, &description, &project_type)
        })?;
        info!("event=workspace_create module=service status=ok workspace_id={id}");
        Ok(id)
    }

    pub fn get_workspace(&self, id: WorkspaceId) -> RepoResult<Option<Workspace>> {
        validate_workspace_id(id)?;
        self.store
            .with_connection(|tx| SqliteWorkspaceRepository::new(tx).get_workspace(id))
    }

    pub fn get_workspace_by_name(&self, name: &str) -> RepoResult<Option<Workspace>> {
        self.store
            .with_connection(|tx| SqliteWorkspaceRepository::new(tx).get_workspace_by_name(name))
    }

    pub fn list_workspaces(&self) -> RepoResult<Vec<Workspace>> {
        self.store
            .with_connection(|tx| SqliteWorkspaceRepository::new(tx).list_workspaces())
    }

    pub fn update_workspace(
        &self,
        id: WorkspaceId,
        description: &str,
        project_type: &str,
    ) -> RepoResult<()> {
        validate_workspace_id(id)?;
        let description = sanitize_string(description, Some(MAX_DESCRIPTION_CHARS), true)?;
        let project_type = sanitize_string(project_type, Some(MAX_NAME_CHARS), false)?;
        require_non_empty("project_type", &project_type)?;

        self.store.with_write_connection(|tx| {
            SqliteWorkspaceRepository::new(tx).update_workspace(id, &description, &project_type)
        })
    }

    pub fn get_template(&self, name: &str) -> RepoResult<Option<Template>> {
        self.store
            .with_connection(|tx| SqliteWorkspaceRepository::new(tx).get_template(name))
    }

    pub fn list_templates(&self) -> RepoResult<Vec<Template>> {
        self.store
            .with_connection(|tx| SqliteWorkspaceRepository::new(tx).list_templates())
    }

    /// Adds an integration after checking its type and JSON config.
    pub fn add_integration(&self, integration: &NewIntegration) -> RepoResult<IntegrationId> {
        validate_scope(integration.workspace_id)?;
        validate_integration_type(&integration.integration_type)?;
        validate_json(&integration.config_json)?;
        let name = sanitize_string(&integration.name, Some(MAX_NAME_CHARS), false)?;
        require_non_empty("integration name", &name)?;

        let sanitized = NewIntegration {
            name,
            ..integration.clone()
        };
        let id = self.store.with_write_connection(|tx| {
            SqliteIntegrationRepository::new(tx).add_integration(&sanitized)
        })?;
        info!(
            "event=integration_add module=service status=ok integration_id={} integration_type={}",
            id, sanitized.integration_type
        );
        Ok(id)
    }

    pub fn get_integration(&self, id: IntegrationId) -> RepoResult<Option<Integration>> {
        validate_id("integration_id", id)?;
        self.store
            .with_connection(|tx| SqliteIntegrationRepository::new(tx).get_integration(id))
    }

    /// Active integrations in one scope, optionally of one type.
    pub fn get_integrations(
        &self,
        workspace_id: Option<WorkspaceId>,
        integration_type: Option<&str>,
    ) -> RepoResult<Vec<Integration>> {
        validate_scope(workspace_id)?;
        if let Some(integration_type) = integration_type {
            validate_integration_type(integration_type)?;
        }
        self.store.with_connection(|tx| {
            SqliteIntegrationRepository::new(tx).get_integrations(workspace_id, integration_type)
        })
    }

    pub fn deactivate_integration(&self, id: IntegrationId) -> RepoResult<()> {
        validate_id("integration_id", id)?;
        self.store.with_write_connection(|tx| {
            SqliteIntegrationRepository::new(tx).deactivate_integration(id)
        })?;
        info!("event=integration_deactivate module=service status=ok integration_id={id}");
        Ok(())
    }
}
