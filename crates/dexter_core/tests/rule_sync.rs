use dexter_core::model::workspace::NewRuleDocument;
use dexter_core::service::rule_service::RuleServiceError;
use dexter_core::{init_database, RepoError, RuleService, Store, WorkspaceService, BUNDLED_SCHEMA};
use tempfile::TempDir;

fn fresh_store(dir: &TempDir) -> Store {
    let schema = dir.path().join("schema.sql");
    std::fs::write(&schema, BUNDLED_SCHEMA).unwrap();
    let store = Store::at(dir.path().join("dexter.db"));
    init_database(store.config(), &schema).unwrap();
    store
}

fn core_document(workspace_id: Option<i64>) -> NewRuleDocument {
    NewRuleDocument {
        workspace_id,
        rule_file: "core.mdc".to_string(),
        title: "Core".to_string(),
        description: "Core conventions".to_string(),
        globs: "*.rs".to_string(),
        rule_type: "always".to_string(),
        content: "# Core\nUse rustfmt.".to_string(),
    }
}

#[test]
fn rule_documents_upsert_by_scope_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleService::new(fresh_store(&dir));

    let first = rules.upsert_rule_document(&core_document(None)).unwrap();
    let mut edited = core_document(None);
    edited.content = "# Core\nUse rustfmt and clippy.".to_string();
    let second = rules.upsert_rule_document(&edited).unwrap();
    assert_eq!(first, second);

    let stored = rules.get_rule_document(None, "core.mdc").unwrap().unwrap();
    assert_eq!(stored.content, "# Core\nUse rustfmt and clippy.");
    assert_eq!(rules.get_rule_documents(None, None).unwrap().len(), 1);
    assert_eq!(rules.get_rule_document(None, "other.mdc").unwrap(), None);
}

#[test]
fn unsafe_rule_file_names_never_reach_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleService::new(fresh_store(&dir));

    let mut traversal = core_document(None);
    traversal.rule_file = "../escape.mdc".to_string();
    assert!(matches!(
        rules.upsert_rule_document(&traversal),
        Err(RepoError::Validation(_))
    ));
    assert!(rules.get_rule_documents(None, None).unwrap().is_empty());
}

#[test]
fn sync_to_dir_writes_frontmatter_files() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleService::new(fresh_store(&dir));
    rules.upsert_rule_document(&core_document(None)).unwrap();

    let out = dir.path().join("rules");
    let report = rules.sync_rules_to_dir(None, &out, false).unwrap();
    assert_eq!(report.files, vec!["core.mdc"]);
    assert!(!report.dry_run);

    let written = std::fs::read_to_string(out.join("core.mdc")).unwrap();
    assert!(written.starts_with("---\ndescription: Core conventions\n"));
    assert!(written.contains("globs: *.rs"));
    assert!(written.ends_with("Use rustfmt."));
}

#[test]
fn dry_run_reports_without_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleService::new(fresh_store(&dir));
    rules.upsert_rule_document(&core_document(None)).unwrap();

    let out = dir.path().join("rules");
    let report = rules.sync_rules_to_dir(None, &out, true).unwrap();
    assert_eq!(report.files, vec!["core.mdc"]);
    assert!(report.dry_run);
    assert!(!out.exists());
}

#[test]
fn import_reads_rule_files_back_into_a_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let store = fresh_store(&dir);
    let rules = RuleService::new(store.clone());
    let ws = WorkspaceService::new(store)
        .create_workspace("Acme", "", "")
        .unwrap();

    let source = dir.path().join("incoming");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(
        source.join("style.mdc"),
        "---\ndescription: Style guide\nglobs: **/*.rs\nruleType: auto\n---\n\n# Style\n",
    )
    .unwrap();
    std::fs::write(source.join("api.md"), "Version every endpoint.").unwrap();
    std::fs::write(source.join("notes.txt"), "not a rule").unwrap();

    assert_eq!(rules.import_rules_from_dir(Some(ws), &source).unwrap(), 2);
    assert_eq!(rules.import_rules_from_dir(Some(ws), &source).unwrap(), 2);

    let docs = rules.get_rule_documents(Some(ws), None).unwrap();
    let files: Vec<_> = docs.iter().map(|doc| doc.rule_file.as_str()).collect();
    assert_eq!(files, vec!["api.md", "style.mdc"]);

    assert_eq!(docs[0].title, "api");
    assert_eq!(docs[0].rule_type, "always");
    assert_eq!(docs[0].content, "Version every endpoint.");

    assert_eq!(docs[1].title, "Style guide");
    assert_eq!(docs[1].globs, "**/*.rs");
    assert_eq!(docs[1].rule_type, "auto");
    assert_eq!(docs[1].content, "# Style");

    assert!(rules.get_rule_documents(None, None).unwrap().is_empty());
}

#[test]
fn exported_files_import_into_another_scope() {
    let dir = tempfile::tempdir().unwrap();
    let store = fresh_store(&dir);
    let rules = RuleService::new(store.clone());
    let ws = WorkspaceService::new(store)
        .create_workspace("Acme", "", "")
        .unwrap();
    rules.upsert_rule_document(&core_document(None)).unwrap();

    let out = dir.path().join("rules");
    rules.sync_rules_to_dir(None, &out, false).unwrap();
    assert_eq!(rules.import_rules_from_dir(Some(ws), &out).unwrap(), 1);

    let imported = rules.get_rule_document(Some(ws), "core.mdc").unwrap().unwrap();
    assert_eq!(imported.description, "Core conventions");
    assert_eq!(imported.globs, "*.rs");
    assert_eq!(imported.content, "# Core\nUse rustfmt.");
}

#[test]
fn missing_import_dir_imports_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleService::new(fresh_store(&dir));

    assert_eq!(
        rules
            .import_rules_from_dir(None, &dir.path().join("absent"))
            .unwrap(),
        0
    );
}

#[test]
fn export_into_a_file_path_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleService::new(fresh_store(&dir));
    rules.upsert_rule_document(&core_document(None)).unwrap();

    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "file, not a dir").unwrap();
    assert!(matches!(
        rules.sync_rules_to_dir(None, &blocker, false),
        Err(RuleServiceError::Io { .. })
    ));
}

#[test]
fn context_digest_covers_scope_documents() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RuleService::new(fresh_store(&dir));

    assert_eq!(
        rules.load_rules_for_context(None).unwrap(),
        "# No rules found in database\n"
    );

    rules.upsert_rule_document(&core_document(None)).unwrap();
    let digest = rules.load_rules_for_context(None).unwrap();
    assert!(digest.starts_with("# Dexter Workspace Rules"));
    assert!(digest.contains("## Core (core.mdc)"));
    assert!(digest.contains("*Core conventions*"));
    assert!(digest.contains("Use rustfmt."));
}
