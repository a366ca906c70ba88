//! Workspace-scoped configuration records.
//!
//! # Invariants
//! - `Workspace.name` is unique; collisions are errors, not upserts.
//! - Rules and integrations are retired through `is_active = false`, never
//!   physically deleted.
//! - Integration secrets are referenced by env-var name only.

use serde::{Deserialize, Serialize};

pub type WorkspaceId = i64;
pub type RuleId = i64;
pub type RuleDocumentId = i64;
pub type IntegrationId = i64;
pub type TemplateId = i64;

/// Tenant root most other rows hang off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub description: String,
    pub project_type: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Editor rule fragment attached to a workspace (`cursor_rules`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub workspace_id: Option<WorkspaceId>,
    pub rule_name: String,
    pub description: String,
    /// Comma-separated glob patterns.
    pub globs: String,
    pub rule_type: String,
    pub content: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating or replacing a rule's mutable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRule {
    pub workspace_id: Option<WorkspaceId>,
    pub rule_name: String,
    pub content: String,
    pub description: String,
    pub globs: String,
    pub rule_type: String,
}

impl NewRule {
    /// Rule of type `always` with empty description and globs.
    pub fn new(
        workspace_id: Option<WorkspaceId>,
        rule_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id,
            rule_name: rule_name.into(),
            content: content.into(),
            description: String::new(),
            globs: String::new(),
            rule_type: "always".to_string(),
        }
    }
}

/// File-backed rule document mirrored into `.cursor/rules/`.
///
/// Keyed by `(workspace_id, rule_file)`; carries no active flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub id: RuleDocumentId,
    pub workspace_id: Option<WorkspaceId>,
    pub rule_file: String,
    pub title: String,
    pub description: String,
    pub globs: String,
    pub rule_type: String,
    pub content: String,
    pub updated_at: i64,
}

/// Input for [`RuleDocument`] upserts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewRuleDocument {
    pub workspace_id: Option<WorkspaceId>,
    pub rule_file: String,
    pub title: String,
    pub description: String,
    pub globs: String,
    pub rule_type: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    pub workspace_id: Option<WorkspaceId>,
    pub integration_type: String,
    pub name: String,
    /// Non-secret JSON configuration object.
    pub config_json: String,
    /// Name of the env var holding the secret; the secret is never stored.
    pub api_key_env_var: String,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIntegration {
    pub workspace_id: Option<WorkspaceId>,
    pub integration_type: String,
    pub name: String,
    pub config_json: String,
    pub api_key_env_var: String,
}

impl NewIntegration {
    pub fn new(
        workspace_id: Option<WorkspaceId>,
        integration_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id,
            integration_type: integration_type.into(),
            name: name.into(),
            config_json: "{}".to_string(),
            api_key_env_var: String::new(),
        }
    }
}

/// Global key/value preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub key: String,
    pub value: String,
    pub description: String,
    pub updated_at: i64,
}

/// Named workspace scaffold. Read-only to this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub description: String,
    pub project_type: String,
    pub template_json: String,
}

/// `(workspace, key) -> value` with optional expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub workspace_id: Option<WorkspaceId>,
    pub key: String,
    pub value: String,
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

impl ContextEntry {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now_ms)
    }
}

/// Counts returned by context statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextStats {
    pub total: u64,
    pub expired: u64,
    pub permanent: u64,
    pub active: u64,
}
