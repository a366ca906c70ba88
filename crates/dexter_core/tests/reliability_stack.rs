use dexter_core::model::action::ActionStatus;
use dexter_core::reliability::{
    command_fn, RateLimiter, RecoveryStrategy, RetryPolicy, SafetyCheck,
};
use dexter_core::repo::action_repo::ActionQuery;
use dexter_core::{
    init_database, ActionVerifier, CallContext, Command, CommandExt, ContextService, Guards,
    ReliabilityError, Store, ValidationError, BUNDLED_SCHEMA,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fresh_store(dir: &TempDir) -> Store {
    let schema = dir.path().join("schema.sql");
    std::fs::write(&schema, BUNDLED_SCHEMA).unwrap();
    let store = Store::at(dir.path().join("dexter.db"));
    init_database(store.config(), &schema).unwrap();
    store
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(1), 2.0)
}

fn statuses(verifier: &ActionVerifier) -> Vec<ActionStatus> {
    let mut actions = verifier.list_actions(&ActionQuery::default()).unwrap();
    actions.sort_by_key(|action| action.id);
    actions.into_iter().map(|action| action.status).collect()
}

#[test]
fn guarded_write_runs_store_operation_and_audits_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = fresh_store(&dir);
    let verifier = ActionVerifier::new(store.clone());
    let context = ContextService::new(store);
    let guards = Guards::new()
        .with_retry(fast_retry(2))
        .with_safety(SafetyCheck::RequireConfirm)
        .with_rate_limit(Arc::new(RateLimiter::db_writes()), "db_write")
        .with_verification(verifier.clone());

    guards
        .run(
            &CallContext::new("set_context").with_target("theme"),
            command_fn(|_ctx: &CallContext| {
                context.set_context(None, "theme", "dark", None)?;
                Ok(())
            }),
        )
        .unwrap();

    assert_eq!(
        context.get_context(None, "theme").unwrap().as_deref(),
        Some("dark")
    );
    assert_eq!(statuses(&verifier), vec![ActionStatus::Completed]);
}

#[test]
fn audit_sees_final_outcome_after_retries() {
    let dir = tempfile::tempdir().unwrap();
    let verifier = ActionVerifier::new(fresh_store(&dir));
    let guards = Guards::new()
        .with_retry(fast_retry(2))
        .with_verification(verifier.clone());

    let mut attempts = 0;
    let result = guards.run(
        &CallContext::new("flaky_sync"),
        command_fn(|_ctx: &CallContext| {
            attempts += 1;
            if attempts < 3 {
                Err(ReliabilityError::operation("transient"))
            } else {
                Ok(attempts)
            }
        }),
    );

    assert_eq!(result.unwrap(), 3);
    assert_eq!(statuses(&verifier), vec![ActionStatus::Completed]);
}

#[test]
fn exhausted_retries_leave_one_failed_row() {
    let dir = tempfile::tempdir().unwrap();
    let verifier = ActionVerifier::new(fresh_store(&dir));
    let guards = Guards::new()
        .with_retry(fast_retry(1))
        .with_verification(verifier.clone());

    let mut attempts = 0;
    let err = guards
        .run(
            &CallContext::new("always_broken"),
            command_fn(|_ctx: &CallContext| -> Result<(), _> {
                attempts += 1;
                Err(ReliabilityError::operation(format!("attempt {attempts}")))
            }),
        )
        .unwrap_err();

    assert!(matches!(&err, ReliabilityError::Operation(message) if message == "attempt 2"));
    let actions = verifier.list_actions(&ActionQuery::default()).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].status, ActionStatus::Failed);
    assert_eq!(actions[0].description.as_deref(), Some("attempt 2"));
}

#[test]
fn policy_rejections_are_audited_as_failures() {
    let dir = tempfile::tempdir().unwrap();
    let verifier = ActionVerifier::new(fresh_store(&dir));
    // Rate limiting wraps the safety gate, so the rejected call still uses a slot.
    let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(60)));
    let guards = Guards::new()
        .with_safety(SafetyCheck::RequireConfirm)
        .with_rate_limit(Arc::clone(&limiter), "writes")
        .with_verification(verifier.clone());

    let mut runs = 0;
    let unconfirmed = guards.run(
        &CallContext::new("delete_rule"),
        command_fn(|_ctx: &CallContext| {
            runs += 1;
            Ok(())
        }),
    );
    assert!(matches!(unconfirmed, Err(ReliabilityError::SafetyCheckFailed(_))));

    guards
        .run(
            &CallContext::new("delete_rule").confirmed(),
            command_fn(|_ctx: &CallContext| {
                runs += 1;
                Ok(())
            }),
        )
        .unwrap();

    let limited = guards.run(
        &CallContext::new("delete_rule").confirmed(),
        command_fn(|_ctx: &CallContext| {
            runs += 1;
            Ok(())
        }),
    );
    assert!(matches!(limited, Err(ReliabilityError::RateLimitExceeded { .. })));

    assert_eq!(runs, 1);
    assert_eq!(
        statuses(&verifier),
        vec![
            ActionStatus::Failed,
            ActionStatus::Completed,
            ActionStatus::Failed
        ]
    );
}

#[test]
fn validator_failure_is_audited_and_command_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let verifier = ActionVerifier::new(fresh_store(&dir));
    let guards = Guards::new()
        .with_validator(|ctx: &CallContext| match ctx.workspace_id {
            Some(_) => Ok(()),
            None => Err(ValidationError::Rejected("workspace required".to_string())),
        })
        .with_verification(verifier.clone());

    let result = guards.run(
        &CallContext::new("set_context"),
        command_fn(|_ctx: &CallContext| -> Result<(), ReliabilityError> {
            panic!("must not run")
        }),
    );
    assert!(matches!(result, Err(ReliabilityError::Validation(_))));
    assert_eq!(statuses(&verifier), vec![ActionStatus::Failed]);
}

#[test]
fn rollback_recovery_reraises_and_leaves_checkpoint_for_later_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let verifier = ActionVerifier::new(fresh_store(&dir));
    let checkpoint_writer = verifier.clone();

    let err = command_fn(|ctx: &CallContext| -> Result<(), ReliabilityError> {
        let action_id = ctx.action_id.expect("verified call carries an action id");
        checkpoint_writer.create_checkpoint(action_id, "rules", "[]")?;
        Err(ReliabilityError::operation("write failed"))
    })
    .recover(RecoveryStrategy::Rollback(verifier.clone()))
    .verified(verifier.clone())
    .execute(&CallContext::new("replace_rules"))
    .unwrap_err();
    assert!(matches!(err, ReliabilityError::Operation(_)));

    let action = verifier
        .list_actions(&ActionQuery::default())
        .unwrap()
        .remove(0);
    assert_eq!(action.status, ActionStatus::Failed);

    assert!(verifier
        .rollback_action(action.id, "manual rollback")
        .unwrap());
    assert_eq!(
        verifier.get_action(action.id).unwrap().unwrap().status,
        ActionStatus::Cancelled
    );
}

#[test]
fn skip_recovery_converts_failure_into_none() {
    let output = command_fn(|_ctx: &CallContext| -> Result<u32, _> {
        Err(ReliabilityError::operation("optional step failed"))
    })
    .timed()
    .recover(RecoveryStrategy::Skip)
    .execute(&CallContext::new("optional_step"))
    .unwrap();

    assert_eq!(output, None);
}
