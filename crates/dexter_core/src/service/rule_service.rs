//! Rule use-cases and rule-file sync.
//!
//! # Responsibility
//! - Validate and persist workspace rules and rule documents.
//! - Render rule documents to `.mdc` files and import them back.
//! - Build the markdown rules digest handed to the assistant.
//!
//! # Invariants
//! - Rule file names are bare file names; anything with a path separator
//!   or traversal is rejected before touching disk or store.
//! - Rendering never doubles frontmatter: content that already starts with
//!   `---` is written verbatim.
//! - An import upserts every file in one write scope, so a failing file
//!   leaves the store unchanged.

use crate::db::Store;
use crate::model::workspace::{
    NewRule, NewRuleDocument, Rule, RuleDocument, RuleDocumentId, RuleId, WorkspaceId,
};
use crate::repo::rule_repo::{RuleRepository, SqliteRuleRepository};
use crate::repo::{RepoError, RepoResult};
use crate::validation::{
    require_non_empty, sanitize_string, validate_file_path, validate_id, validate_scope,
    ValidationError,
};
use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Extensions recognized as rule files, in import order.
pub const RULE_FILE_EXTENSIONS: &[&str] = &[".mdc", ".md"];

const FRONTMATTER_DELIMITER: &str = "---";
const MAX_RULE_NAME_CHARS: usize = 255;
const DEFAULT_RULE_TYPE: &str = "always";

#[derive(Debug)]
pub enum RuleServiceError {
    Repo(RepoError),
    Io { path: PathBuf, source: std::io::Error },
}

impl Display for RuleServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Io { path, source } => write!(f, "rule file io `{}`: {source}", path.display()),
        }
    }
}

impl Error for RuleServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<RepoError> for RuleServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ValidationError> for RuleServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Repo(RepoError::Validation(value))
    }
}

/// Frontmatter fields plus the remaining markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedRuleFile {
    pub fields: BTreeMap<String, String>,
    pub body: String,
}

impl ParsedRuleFile {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Outcome of one [`RuleService::sync_rules_to_dir`] run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSyncReport {
    /// Files written, or that would be written on a dry run.
    pub files: Vec<String>,
    pub dry_run: bool,
}

/// Splits leading `---` frontmatter into `key: value` fields.
///
/// Text without a closed frontmatter block is returned whole as the body.
pub fn parse_frontmatter(text: &str) -> ParsedRuleFile {
    if !text.starts_with(FRONTMATTER_DELIMITER) {
        return ParsedRuleFile {
            fields: BTreeMap::new(),
            body: text.to_string(),
        };
    }

    let mut parts = text.splitn(3, FRONTMATTER_DELIMITER);
    let (_, Some(header), Some(body)) = (parts.next(), parts.next(), parts.next()) else {
        return ParsedRuleFile {
            fields: BTreeMap::new(),
            body: text.to_string(),
        };
    };

    let fields = header
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect();

    ParsedRuleFile {
        fields,
        body: body.trim().to_string(),
    }
}

/// File text for `doc`, prefixing frontmatter unless the content has its own.
pub fn render_rule_file(doc: &RuleDocument) -> String {
    if doc.content.trim_start().starts_with(FRONTMATTER_DELIMITER) {
        return doc.content.clone();
    }

    let mut header = vec![FRONTMATTER_DELIMITER.to_string()];
    if !doc.description.is_empty() {
        header.push(format!("description: {}", doc.description));
    }
    if !doc.globs.is_empty() {
        header.push(format!("globs: {}", doc.globs));
    }
    if !doc.rule_type.is_empty() {
        header.push(format!("ruleType: {}", doc.rule_type));
    }
    header.push(FRONTMATTER_DELIMITER.to_string());

    format!("{}\n\n{}", header.join("\n"), doc.content)
}

/// Markdown digest of rule documents for assistant context.
pub fn render_rules_digest(docs: &[RuleDocument]) -> String {
    if docs.is_empty() {
        return "# No rules found in database\n".to_string();
    }

    let mut output = String::from("# Dexter Workspace Rules\n\nLoaded from rule_documents\n\n");
    for doc in docs {
        output.push_str(&format!("## {} ({})\n", doc.title, doc.rule_file));
        if !doc.description.is_empty() {
            output.push_str(&format!("*{}*\n", doc.description));
        }
        if !doc.globs.is_empty() {
            output.push_str(&format!("**Applies to:** {}\n", doc.globs));
        }
        output.push('\n');
        output.push_str(&doc.content);
        output.push_str("\n\n---\n\n");
    }
    output
}

#[derive(Debug, Clone)]
pub struct RuleService {
    store: Store,
}

impl RuleService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn add_rule(&self, rule: &NewRule) -> RepoResult<RuleId> {
        let rule = checked_rule(rule)?;
        let id = self
            .store
            .with_write_connection(|tx| SqliteRuleRepository::new(tx).add_rule(&rule))?;
        info!("event=rule_add module=service status=ok rule_id={id}");
        Ok(id)
    }

    pub fn get_rule(&self, id: RuleId) -> RepoResult<Option<Rule>> {
        validate_id("rule_id", id)?;
        self.store
            .with_connection(|tx| SqliteRuleRepository::new(tx).get_rule(id))
    }

    /// Active rules in one scope.
    pub fn get_rules(&self, workspace_id: Option<WorkspaceId>) -> RepoResult<Vec<Rule>> {
        validate_scope(workspace_id)?;
        self.store
            .with_connection(|tx| SqliteRuleRepository::new(tx).get_rules(workspace_id))
    }

    pub fn update_rule(&self, id: RuleId, rule: &NewRule) -> RepoResult<()> {
        validate_id("rule_id", id)?;
        let rule = checked_rule(rule)?;
        self.store
            .with_write_connection(|tx| SqliteRuleRepository::new(tx).update_rule(id, &rule))
    }

    pub fn deactivate_rule(&self, id: RuleId) -> RepoResult<()> {
        validate_id("rule_id", id)?;
        self.store
            .with_write_connection(|tx| SqliteRuleRepository::new(tx).deactivate_rule(id))?;
        info!("event=rule_deactivate module=service status=ok rule_id={id}");
        Ok(())
    }

    pub fn upsert_rule_document(&self, doc: &NewRuleDocument) -> RepoResult<RuleDocumentId> {
        validate_scope(doc.workspace_id)?;
        let doc = checked_document(doc)?;
        self.store
            .with_write_connection(|tx| SqliteRuleRepository::new(tx).upsert_rule_document(&doc))
    }

    pub fn get_rule_documents(
        &self,
        workspace_id: Option<WorkspaceId>,
        rule_file: Option<&str>,
    ) -> RepoResult<Vec<RuleDocument>> {
        validate_scope(workspace_id)?;
        self.store.with_connection(|tx| {
            SqliteRuleRepository::new(tx).get_rule_documents(workspace_id, rule_file)
        })
    }

    pub fn get_rule_document(
        &self,
        workspace_id: Option<WorkspaceId>,
        rule_file: &str,
    ) -> RepoResult<Option<RuleDocument>> {
        Ok(self
            .get_rule_documents(workspace_id, Some(rule_file))?
            .into_iter()
            .next())
    }

    pub fn load_rules_for_context(&self, workspace_id: Option<WorkspaceId>) -> RepoResult<String> {
        let docs = self.get_rule_documents(workspace_id, None)?;
        Ok(render_rules_digest(&docs))
    }

    /// Writes every rule document in scope into `dir`.
    ///
    /// With `dry_run` nothing is created on disk; the report still lists the
    /// files that would be written.
    pub fn sync_rules_to_dir(
        &self,
        workspace_id: Option<WorkspaceId>,
        dir: &Path,
        dry_run: bool,
    ) -> Result<RuleSyncReport, RuleServiceError> {
        let docs = self.get_rule_documents(workspace_id, None)?;
        let mut report = RuleSyncReport {
            files: Vec::with_capacity(docs.len()),
            dry_run,
        };

        if !dry_run {
            std::fs::create_dir_all(dir).map_err(|source| RuleServiceError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        for doc in &docs {
            let file_name = checked_rule_file(&doc.rule_file)?;
            if !dry_run {
                let path = dir.join(&file_name);
                std::fs::write(&path, render_rule_file(doc))
                    .map_err(|source| RuleServiceError::Io { path, source })?;
            }
            report.files.push(file_name);
        }

        info!(
            "event=rule_sync module=service status=ok direction=to_files dry_run={} files={}",
            dry_run,
            report.files.len()
        );
        Ok(report)
    }

    /// Upserts every `*.mdc` / `*.md` file in `dir` as a rule document.
    ///
    /// A missing directory imports nothing.
    pub fn import_rules_from_dir(
        &self,
        workspace_id: Option<WorkspaceId>,
        dir: &Path,
    ) -> Result<usize, RuleServiceError> {
        validate_scope(workspace_id)?;
        if !dir.is_dir() {
            warn!(
                "event=rule_sync module=service status=error direction=to_db reason=missing_dir dir={}",
                dir.display()
            );
            return Ok(0);
        }

        let mut docs = Vec::new();
        for path in rule_files_in(dir)? {
            let text = std::fs::read_to_string(&path).map_err(|source| RuleServiceError::Io {
                path: path.clone(),
                source,
            })?;
            docs.push(document_from_file(workspace_id, &path, &text)?);
        }

        let imported = docs.len();
        self.store.with_write_connection(|tx| {
            let repo = SqliteRuleRepository::new(tx);
            for doc in &docs {
                repo.upsert_rule_document(doc)?;
            }
            Ok::<_, RepoError>(())
        })?;

        info!(
            "event=rule_sync module=service status=ok direction=to_db files={imported}"
        );
        Ok(imported)
    }
}

fn rule_files_in(dir: &Path) -> Result<Vec<PathBuf>, RuleServiceError> {
    let io_err = |source| RuleServiceError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                RULE_FILE_EXTENSIONS
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.') == ext)
            });
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn document_from_file(
    workspace_id: Option<WorkspaceId>,
    path: &Path,
    text: &str,
) -> Result<NewRuleDocument, RuleServiceError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ValidationError::UnsafePath(format!("non UTF-8 file name: {}", path.display()))
        })?;
    let rule_file = checked_rule_file(file_name)?;
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);

    let parsed = parse_frontmatter(text);
    let title = parsed
        .field("title")
        .or_else(|| parsed.field("description"))
        .unwrap_or(stem)
        .to_string();

    Ok(NewRuleDocument {
        workspace_id,
        rule_file,
        description: parsed.field("description").unwrap_or_default().to_string(),
        globs: parsed.field("globs").unwrap_or_default().to_string(),
        rule_type: parsed
            .field("ruleType")
            .or_else(|| parsed.field("rule_type"))
            .unwrap_or(DEFAULT_RULE_TYPE)
            .to_string(),
        content: parsed.body.clone(),
        title,
    })
}

/// Bare rule file name with a known extension.
fn checked_rule_file(rule_file: &str) -> Result<String, ValidationError> {
    let path = validate_file_path(rule_file, false, RULE_FILE_EXTENSIONS)?;
    if path.components().count() != 1 || path.file_name().is_none() {
        return Err(ValidationError::UnsafePath(format!(
            "rule file must be a bare file name, got `{rule_file}`"
        )));
    }
    Ok(rule_file.to_string())
}

fn checked_rule(rule: &NewRule) -> Result<NewRule, ValidationError> {
    validate_scope(rule.workspace_id)?;
    let rule_name = sanitize_string(&rule.rule_name, Some(MAX_RULE_NAME_CHARS), false)?;
    require_non_empty("rule_name", &rule_name)?;
    require_non_empty("rule content", &rule.content)?;
    let rule_type = match sanitize_string(&rule.rule_type, Some(MAX_RULE_NAME_CHARS), false)? {
        value if value.is_empty() => DEFAULT_RULE_TYPE.to_string(),
        value => value,
    };

    Ok(NewRule {
        rule_name,
        rule_type,
        ..rule.clone()
    })
}

fn checked_document(doc: &NewRuleDocument) -> Result<NewRuleDocument, ValidationError> {
    let rule_file = checked_rule_file(&doc.rule_file)?;
    let title = sanitize_string(&doc.title, Some(MAX_RULE_NAME_CHARS), false)?;
    require_non_empty("title", &title)?;
    let rule_type = if doc.rule_type.trim().is_empty() {
        DEFAULT_RULE_TYPE.to_string()
    } else {
        doc.rule_type.clone()
    };

    Ok(NewRuleDocument {
        rule_file,
        title,
        rule_type,
        ..doc.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::{checked_rule_file, parse_frontmatter, render_rule_file, render_rules_digest};
    use crate::model::workspace::RuleDocument;

    fn doc(content: &str) -> RuleDocument {
        RuleDocument {
            id: 1,
            workspace_id: None,
            rule_file: "core.mdc".to_string(),
            title: "Core".to_string(),
            description: "Core conventions".to_string(),
            globs: "*.rs".to_string(),
            rule_type: "always".to_string(),
            content: content.to_string(),
            updated_at: 0,
        }
    }

    #[test]
    fn frontmatter_fields_are_split_from_body() {
        let parsed = parse_frontmatter(
            "---\ndescription: \"Core conventions\"\nglobs: *.rs\nruleType: always\n---\n\n# Body\n",
        );
        assert_eq!(parsed.field("description"), Some("Core conventions"));
        assert_eq!(parsed.field("globs"), Some("*.rs"));
        assert_eq!(parsed.field("ruleType"), Some("always"));
        assert_eq!(parsed.body, "# Body");
    }

    #[test]
    fn text_without_frontmatter_is_all_body() {
        let parsed = parse_frontmatter("# Just markdown");
        assert!(parsed.fields.is_empty());
        assert_eq!(parsed.body, "# Just markdown");
    }

    #[test]
    fn render_adds_frontmatter_once() {
        let rendered = render_rule_file(&doc("# Body"));
        assert!(rendered.starts_with("---\ndescription: Core conventions\nglobs: *.rs\n"));
        assert!(rendered.ends_with("# Body"));

        let reparsed = parse_frontmatter(&rendered);
        assert_eq!(reparsed.body, "# Body");

        let verbatim = "---\ntitle: x\n---\nbody";
        assert_eq!(render_rule_file(&doc(verbatim)), verbatim);
    }

    #[test]
    fn digest_lists_every_document() {
        assert_eq!(render_rules_digest(&[]), "# No rules found in database\n");
        let digest = render_rules_digest(&[doc("Use rustfmt.")]);
        assert!(digest.contains("## Core (core.mdc)"));
        assert!(digest.contains("**Applies to:** *.rs"));
        assert!(digest.contains("Use rustfmt."));
    }

    #[test]
    fn rule_file_must_be_a_bare_name() {
        assert!(checked_rule_file("core.mdc").is_ok());
        assert!(checked_rule_file("nested/core.mdc").is_err());
        assert!(checked_rule_file("../core.mdc").is_err());
        assert!(checked_rule_file("/etc/core.mdc").is_err());
        assert!(checked_rule_file("core.txt").is_err());
    }
}
