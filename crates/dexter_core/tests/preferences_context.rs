use dexter_core::db::DbError;
use dexter_core::model::action::{ActionStatus, NewAction};
use dexter_core::model::now_epoch_ms;
use dexter_core::{
    init_database, ActionVerifier, ContextService, Store, WorkspaceService, BUNDLED_SCHEMA,
};
use rusqlite::params;
use std::time::Duration;
use tempfile::TempDir;

fn fresh_store(dir: &TempDir) -> Store {
    let schema = dir.path().join("schema.sql");
    std::fs::write(&schema, BUNDLED_SCHEMA).unwrap();
    let store = Store::at(dir.path().join("dexter.db"));
    init_database(store.config(), &schema).unwrap();
    store
}

#[test]
fn preference_upsert_keeps_one_row_and_latest_value() {
    let dir = tempfile::tempdir().unwrap();
    let context = ContextService::new(fresh_store(&dir));

    context
        .set_preference("update_key", "value1", Some("Theme choice"))
        .unwrap();
    context.set_preference("update_key", "value2", None).unwrap();

    assert_eq!(
        context.get_preference("update_key").unwrap().as_deref(),
        Some("value2")
    );
    let all = context.list_preferences().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].description, "Theme choice");
    assert_eq!(context.get_preference("missing").unwrap(), None);
}

#[test]
fn context_is_scoped_and_upserted() {
    let dir = tempfile::tempdir().unwrap();
    let store = fresh_store(&dir);
    let ws = WorkspaceService::new(store.clone())
        .create_workspace("Acme", "", "")
        .unwrap();
    let context = ContextService::new(store);

    context.set_context(None, "mode", "global", None).unwrap();
    context.set_context(Some(ws), "mode", "first", None).unwrap();
    context.set_context(Some(ws), "mode", "second", None).unwrap();

    assert_eq!(
        context.get_context(Some(ws), "mode").unwrap().as_deref(),
        Some("second")
    );
    assert_eq!(
        context.get_context(None, "mode").unwrap().as_deref(),
        Some("global")
    );
    assert_eq!(context.list_context(Some(ws)).unwrap().len(), 1);
}

#[test]
fn expired_context_is_invisible_and_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let context = ContextService::new(fresh_store(&dir));
    let past = now_epoch_ms() - 1_000;

    context.set_context(None, "stale", "old", Some(past)).unwrap();
    context
        .set_context_with_ttl(None, "fresh", "new", Duration::from_secs(3_600))
        .unwrap();
    context.set_context(None, "forever", "yes", None).unwrap();

    assert_eq!(context.get_context(None, "stale").unwrap(), None);
    assert_eq!(
        context.get_context(None, "fresh").unwrap().as_deref(),
        Some("new")
    );
    let listed = context.list_context(None).unwrap();
    assert!(listed.iter().all(|entry| !entry.is_expired_at(now_epoch_ms())));
    let visible: Vec<_> = listed.into_iter().map(|entry| entry.key).collect();
    assert_eq!(visible.len(), 2);
    assert!(!visible.contains(&"stale".to_string()));

    let stats = context.context_stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.permanent, 1);
    assert_eq!(stats.active, 2);

    assert_eq!(context.cleanup_expired_contexts().unwrap(), 1);
    assert_eq!(context.cleanup_expired_contexts().unwrap(), 0);
    assert_eq!(context.context_stats().unwrap().total, 2);
}

#[test]
fn old_action_cleanup_only_removes_completed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = fresh_store(&dir);
    let verifier = ActionVerifier::new(store.clone());
    let context = ContextService::new(store.clone());

    let done = verifier
        .log_action(&NewAction::pending(None, "export"))
        .unwrap();
    verifier.mark_in_progress(done).unwrap();
    verifier.mark_completed(done).unwrap();

    let failed = verifier
        .log_action(&NewAction::pending(None, "import"))
        .unwrap();
    verifier.mark_in_progress(failed).unwrap();
    verifier.mark_failed(failed, "disk full").unwrap();

    let recent = verifier
        .log_action(&NewAction::pending(None, "sync"))
        .unwrap();
    verifier.mark_in_progress(recent).unwrap();
    verifier.mark_completed(recent).unwrap();

    let forty_days_ago = now_epoch_ms() - 40 * 24 * 60 * 60 * 1_000;
    store
        .with_write_connection(|tx| {
            tx.execute(
                "UPDATE action_log SET timestamp = ?1 WHERE id IN (?2, ?3);",
                params![forty_days_ago, done, failed],
            )?;
            Ok::<_, DbError>(())
        })
        .unwrap();

    assert_eq!(context.cleanup_old_actions(30).unwrap(), 1);
    assert!(verifier.get_action(done).unwrap().is_none());
    assert_eq!(
        verifier.get_action(failed).unwrap().unwrap().status,
        ActionStatus::Failed
    );
    assert!(verifier.get_action(recent).unwrap().is_some());
}

#[test]
fn keys_round_trip_through_the_same_cleaning_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let context = ContextService::new(fresh_store(&dir));

    context.set_preference(" theme ", "dark", None).unwrap();
    assert_eq!(
        context.get_preference(" theme ").unwrap().as_deref(),
        Some("dark")
    );
    assert_eq!(
        context.get_preference("theme").unwrap().as_deref(),
        Some("dark")
    );
    assert_eq!(context.list_preferences().unwrap().len(), 1);

    context.set_context(None, "k\t", "v", None).unwrap();
    assert_eq!(
        context.get_context(None, "k\t").unwrap().as_deref(),
        Some("v")
    );
    assert_eq!(
        context.get_context_entry(None, "k").unwrap().unwrap().key,
        "k"
    );
}
