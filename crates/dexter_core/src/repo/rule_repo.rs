//! Rule and rule-document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - CRUD for workspace rules (`cursor_rules`) with soft-delete semantics.
//! - Upsert/read for file-backed rule documents (`rule_documents`).
//!
//! # Invariants
//! - `get_rule` and `get_rules` only ever return `is_active = 1` rows.
//! - Rule documents have no active flag and are keyed by
//!   `(workspace_id, rule_file)` where a NULL workspace is the global scope.

use super::error::{RepoError, RepoResult};
use super::row::flag;
use crate::model::workspace::{
    NewRule, NewRuleDocument, Rule, RuleDocument, RuleDocumentId, RuleId, WorkspaceId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const RULE_SELECT_SQL: &str = "SELECT
    id,
    workspace_id,
    rule_name,
    description,
    globs,
    rule_type,
    content,
    is_active,
    created_at,
    updated_at
FROM cursor_rules";

const RULE_DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    workspace_id,
    rule_file,
    title,
    description,
    globs,
    rule_type,
    content,
    updated_at
FROM rule_documents";

pub trait RuleRepository {
    fn add_rule(&self, rule: &NewRule) -> RepoResult<RuleId>;
    /// Loads one active rule.
    fn get_rule(&self, id: RuleId) -> RepoResult<Option<Rule>>;
    /// Active rules for `workspace_id` (NULL = global), ordered by name.
    fn get_rules(&self, workspace_id: Option<WorkspaceId>) -> RepoResult<Vec<Rule>>;
    /// Replaces the mutable fields of an active rule.
    fn update_rule(&self, id: RuleId, rule: &NewRule) -> RepoResult<()>;
    /// Soft-deletes a rule. Idempotent.
    fn deactivate_rule(&self, id: RuleId) -> RepoResult<()>;
    fn upsert_rule_document(&self, doc: &NewRuleDocument) -> RepoResult<RuleDocumentId>;
    /// Rule documents for one scope, optionally narrowed to one file.
    fn get_rule_documents(
        &self,
        workspace_id: Option<WorkspaceId>,
        rule_file: Option<&str>,
    ) -> RepoResult<Vec<RuleDocument>>;
}

pub struct SqliteRuleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRuleRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RuleRepository for SqliteRuleRepository<'_> {
    fn add_rule(&self, rule: &NewRule) -> RepoResult<RuleId> {
        self.conn
            .execute(
                "INSERT INTO cursor_rules (
                    workspace_id,
                    rule_name,
                    description,
                    globs,
                    rule_type,
                    content
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    rule.workspace_id,
                    rule.rule_name.as_str(),
                    rule.description.as_str(),
                    rule.globs.as_str(),
                    rule.rule_type.as_str(),
                    rule.content.as_str(),
                ],
            )
            .map_err(RepoError::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_rule(&self, id: RuleId) -> RepoResult<Option<Rule>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RULE_SELECT_SQL} WHERE id = ?1 AND is_active = 1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_rule_row(row)?));
        }
        Ok(None)
    }

    fn get_rules(&self, workspace_id: Option<WorkspaceId>) -> RepoResult<Vec<Rule>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RULE_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND is_active = 1
             ORDER BY rule_name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([workspace_id])?;
        let mut rules = Vec::new();
        while let Some(row) = rows.next()? {
            rules.push(parse_rule_row(row)?);
        }
        Ok(rules)
    }

    fn update_rule(&self, id: RuleId, rule: &NewRule) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE cursor_rules
                 SET
                    rule_name = ?2,
                    description = ?3,
                    globs = ?4,
                    rule_type = ?5,
                    content = ?6,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND is_active = 1;",
                params![
                    id,
                    rule.rule_name.as_str(),
                    rule.description.as_str(),
                    rule.globs.as_str(),
                    rule.rule_type.as_str(),
                    rule.content.as_str(),
                ],
            )
            .map_err(RepoError::from_write)?;

        if changed == 0 {
            return Err(RepoError::NotFound { entity: "rule", id });
        }
        Ok(())
    }

    fn deactivate_rule(&self, id: RuleId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cursor_rules
             SET
                is_active = 0,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound { entity: "rule", id });
        }
        Ok(())
    }

    fn upsert_rule_document(&self, doc: &NewRuleDocument) -> RepoResult<RuleDocumentId> {
        let existing: Option<RuleDocumentId> = self
            .conn
            .query_row(
                "SELECT id FROM rule_documents
                 WHERE workspace_id IS ?1 AND rule_file = ?2;",
                params![doc.workspace_id, doc.rule_file.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                self.conn
                    .execute(
                        "UPDATE rule_documents
                         SET
                            title = ?2,
                            description = ?3,
                            globs = ?4,
                            rule_type = ?5,
                            content = ?6,
                            updated_at = (strftime('%s', 'now') * 1000)
                         WHERE id = ?1;",
                        params![
                            id,
                            doc.title.as_str(),
                            doc.description.as_str(),
                            doc.globs.as_str(),
                            doc.rule_type.as_str(),
                            doc.content.as_str(),
                        ],
                    )
                    .map_err(RepoError::from_write)?;
                Ok(id)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO rule_documents (
                            workspace_id,
                            rule_file,
                            title,
                            description,
                            globs,
                            rule_type,
                            content
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                        params![
                            doc.workspace_id,
                            doc.rule_file.as_str(),
                            doc.title.as_str(),
                            doc.description.as_str(),
                            doc.globs.as_str(),
                            doc.rule_type.as_str(),
                            doc.content.as_str(),
                        ],
                    )
                    .map_err(RepoError::from_write)?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    fn get_rule_documents(
        &self,
        workspace_id: Option<WorkspaceId>,
        rule_file: Option<&str>,
    ) -> RepoResult<Vec<RuleDocument>> {
        let mut sql = format!("{RULE_DOCUMENT_SELECT_SQL} WHERE workspace_id IS ?");
        let mut bind_values: Vec<Value> = vec![workspace_id.map_or(Value::Null, Value::Integer)];

        if let Some(rule_file) = rule_file {
            sql.push_str(" AND rule_file = ?");
            bind_values.push(Value::Text(rule_file.to_string()));
        }
        sql.push_str(" ORDER BY rule_file ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind_values), parse_rule_document_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn parse_rule_row(row: &Row<'_>) -> RepoResult<Rule> {
    Ok(Rule {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        rule_name: row.get("rule_name")?,
        description: row.get("description")?,
        globs: row.get("globs")?,
        rule_type: row.get("rule_type")?,
        content: row.get("content")?,
        is_active: flag(row, "is_active", "cursor_rules")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_rule_document_row(row: &Row<'_>) -> rusqlite::Result<RuleDocument> {
    Ok(RuleDocument {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        rule_file: row.get("rule_file")?,
        title: row.get("title")?,
        description: row.get("description")?,
        globs: row.get("globs")?,
        rule_type: row.get("rule_type")?,
        content: row.get("content")?,
        updated_at: row.get("updated_at")?,
    })
}
