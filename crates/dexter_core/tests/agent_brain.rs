use dexter_core::model::agent::{NewDecision, NewKnowledge, NewPattern, PatternType, StateType};
use dexter_core::model::now_epoch_ms;
use dexter_core::{init_database, AgentBrain, RepoError, Store, WorkspaceService, BUNDLED_SCHEMA};
use tempfile::TempDir;

fn fresh_store(dir: &TempDir) -> Store {
    let schema = dir.path().join("schema.sql");
    std::fs::write(&schema, BUNDLED_SCHEMA).unwrap();
    let store = Store::at(dir.path().join("dexter.db"));
    init_database(store.config(), &schema).unwrap();
    store
}

fn brain_with_workspace(dir: &TempDir) -> (AgentBrain, i64) {
    let store = fresh_store(dir);
    let ws = WorkspaceService::new(store.clone())
        .create_workspace("Acme", "", "")
        .unwrap();
    (AgentBrain::new(store), ws)
}

fn pattern(ws: i64, name: &str) -> NewPattern {
    NewPattern {
        workspace_id: Some(ws),
        pattern_name: name.to_string(),
        pattern_type: PatternType::Optimization,
        trigger_conditions: "{\"files\": 10}".to_string(),
        action_taken: "batch edits".to_string(),
    }
}

fn decision(ws: i64, decision_type: &str, reasoning: &str) -> NewDecision {
    NewDecision {
        workspace_id: Some(ws),
        decision_type: decision_type.to_string(),
        decision: "proceed".to_string(),
        reasoning: Some(reasoning.to_string()),
        ..NewDecision::default()
    }
}

#[test]
fn pattern_success_rate_is_a_streaming_mean() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);
    let id = brain.record_pattern(&pattern(ws, "batching")).unwrap();

    for outcome in [true, false, true] {
        brain.update_pattern_success(id, outcome).unwrap();
    }

    let stored = brain.get_pattern(id).unwrap().unwrap();
    assert!((stored.success_rate - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(stored.usage_count, 3);
    assert!(stored.last_used.is_some());

    assert_eq!(
        brain
            .recall_patterns(Some(ws), Some(PatternType::Optimization), 0.6)
            .unwrap()
            .len(),
        1
    );
    assert!(brain
        .recall_patterns(Some(ws), Some(PatternType::Optimization), 0.7)
        .unwrap()
        .is_empty());
}

#[test]
fn knowledge_recall_orders_by_confidence_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);

    brain
        .store_knowledge(&NewKnowledge::new(Some(ws), "rust", "low").with_confidence(0.4))
        .unwrap();
    let high = brain
        .store_knowledge(&NewKnowledge::new(Some(ws), "rust", "high").with_confidence(0.9))
        .unwrap();
    brain
        .store_knowledge(&NewKnowledge::new(Some(ws), "rust", "mid").with_confidence(0.7))
        .unwrap();
    brain
        .store_knowledge(&NewKnowledge::new(Some(ws), "python", "other"))
        .unwrap();

    let facts: Vec<_> = brain
        .recall_knowledge(Some(ws), Some("rust"), 0.5)
        .unwrap()
        .into_iter()
        .map(|knowledge| knowledge.fact)
        .collect();
    assert_eq!(facts, vec!["high", "mid"]);

    brain.update_knowledge_usage(high).unwrap();
    brain.update_knowledge_usage(high).unwrap();
    let top = brain.recall_knowledge(Some(ws), Some("rust"), 0.0).unwrap();
    assert_eq!(top[0].id, high);
    assert_eq!(top[0].usage_count, 2);
    assert!(top[0].last_used.is_some());

    assert!(matches!(
        brain.store_knowledge(&NewKnowledge::new(Some(ws), "rust", "bad").with_confidence(1.5)),
        Err(RepoError::Validation(_))
    ));
}

#[test]
fn similar_decisions_prefer_successes() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);

    let failed = brain
        .record_decision(&decision(ws, "refactor", "rename everything"))
        .unwrap();
    brain
        .update_decision_outcome(failed, "broke callers", false)
        .unwrap();
    let worked = brain
        .record_decision(&decision(ws, "refactor", "small steps"))
        .unwrap();
    brain.update_decision_outcome(worked, "green", true).unwrap();
    brain
        .record_decision(&decision(ws, "deploy", "friday"))
        .unwrap();

    let refactors = brain
        .recall_similar_decisions(Some(ws), Some("refactor"))
        .unwrap();
    let ids: Vec<_> = refactors.iter().map(|decision| decision.id).collect();
    assert_eq!(ids, vec![worked, failed]);

    assert_eq!(
        brain
            .recall_similar_decisions(Some(ws), Some("any"))
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn learning_turns_outcomes_into_knowledge() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);

    let id = brain
        .record_decision(&decision(ws, "file_edit", "small diffs"))
        .unwrap();
    brain.update_decision_outcome(id, "merged", true).unwrap();
    let knowledge_id = brain.learn_from_decision(id).unwrap().unwrap();

    let learned = brain
        .recall_knowledge(Some(ws), Some("file_edit"), 0.0)
        .unwrap();
    assert_eq!(learned.len(), 1);
    assert_eq!(learned[0].id, knowledge_id);
    assert_eq!(learned[0].fact, "Successful approach: small diffs");
    assert_eq!(learned[0].source, Some(format!("decision_{id}")));
    assert!((learned[0].confidence - 0.8).abs() < 1e-9);

    assert_eq!(brain.learn_from_decision(id + 100).unwrap(), None);
}

#[test]
fn undecided_and_failed_decisions_become_cautions() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);

    let undecided = brain
        .record_decision(&decision(ws, "deploy", "friday evening"))
        .unwrap();
    brain.learn_from_decision(undecided).unwrap().unwrap();

    let failed = brain
        .record_decision(&decision(ws, "deploy", "skip canary"))
        .unwrap();
    brain
        .update_decision_outcome(failed, "outage", false)
        .unwrap();
    brain.learn_from_decision(failed).unwrap().unwrap();

    let mut facts: Vec<_> = brain
        .recall_knowledge(Some(ws), Some("deploy"), 0.0)
        .unwrap()
        .into_iter()
        .map(|knowledge| (knowledge.fact, knowledge.confidence))
        .collect();
    facts.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        facts,
        vec![
            ("Avoid: friday evening — led to failure".to_string(), 0.6),
            ("Avoid: skip canary — led to failure".to_string(), 0.6),
        ]
    );
}

#[test]
fn disabled_learning_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);
    let brain = brain.with_learning(false);
    assert!(!brain.learning_enabled());

    let id = brain
        .record_decision(&decision(ws, "file_edit", "huge diff"))
        .unwrap();
    brain.update_decision_outcome(id, "reverted", false).unwrap();

    assert_eq!(brain.learn_from_decision(id).unwrap(), None);
    assert!(brain
        .recall_knowledge(Some(ws), None, 0.0)
        .unwrap()
        .is_empty());
}

#[test]
fn agent_state_upserts_and_expires() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);

    brain
        .set_agent_state(Some(ws), "goal", "ship v1", StateType::Goal, None)
        .unwrap();
    brain
        .set_agent_state(Some(ws), "goal", "ship v2", StateType::Goal, None)
        .unwrap();
    brain
        .set_agent_state(
            Some(ws),
            "scratch",
            "tmp",
            StateType::Memory,
            Some(now_epoch_ms() - 1_000),
        )
        .unwrap();

    assert_eq!(
        brain.get_agent_state(Some(ws), "goal").unwrap().as_deref(),
        Some("ship v2")
    );
    assert_eq!(brain.get_agent_state(Some(ws), "scratch").unwrap(), None);
    assert_eq!(brain.get_agent_state(None, "goal").unwrap(), None);

    let all = brain.get_all_agent_state(Some(ws)).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state_type, StateType::Goal);

    assert_eq!(brain.cleanup_expired_agent_state().unwrap(), 1);
}

#[test]
fn intelligence_summarizes_the_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);

    let strong = brain.record_pattern(&pattern(ws, "strong")).unwrap();
    brain.update_pattern_success(strong, true).unwrap();
    let weak = brain.record_pattern(&pattern(ws, "weak")).unwrap();
    brain.update_pattern_success(weak, false).unwrap();
    brain
        .record_decision(&decision(ws, "deploy", "canary first"))
        .unwrap();
    brain
        .store_knowledge(&NewKnowledge::new(Some(ws), "deploy", "use canaries"))
        .unwrap();
    brain
        .set_agent_state(Some(ws), "focus", "deploys", StateType::Preference, None)
        .unwrap();

    let summary = brain.get_agent_intelligence(Some(ws)).unwrap();
    assert_eq!(summary.knowledge_count, 1);
    assert_eq!(summary.decision_count, 1);
    assert_eq!(summary.pattern_count, 2);
    assert_eq!(summary.state_count, 1);
    assert_eq!(summary.top_patterns.len(), 1);
    assert_eq!(summary.top_patterns[0].id, strong);
    assert_eq!(summary.recent_decisions.len(), 1);

    let global = brain.get_agent_intelligence(None).unwrap();
    assert_eq!(global.pattern_count, 0);
}

#[test]
fn intelligence_counts_confident_knowledge_and_recallable_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let (brain, ws) = brain_with_workspace(&dir);

    brain
        .store_knowledge(&NewKnowledge::new(Some(ws), "rust", "solid").with_confidence(0.5))
        .unwrap();
    brain
        .store_knowledge(&NewKnowledge::new(Some(ws), "rust", "hunch").with_confidence(0.2))
        .unwrap();
    for step in 0..12 {
        brain
            .record_decision(&decision(ws, "refactor", &format!("step {step}")))
            .unwrap();
    }

    let summary = brain.get_agent_intelligence(Some(ws)).unwrap();
    assert_eq!(summary.knowledge_count, 1);
    assert_eq!(summary.decision_count, 10);
    assert_eq!(summary.recent_decisions.len(), 5);
}
