//! Agent brain: persistent knowledge, decisions, patterns and state.
//!
//! # Responsibility
//! - Front the agent tables with validated, scoped calls.
//! - Turn decision outcomes into knowledge (`learn_from_decision`).
//! - Summarize one scope (`get_agent_intelligence`).
//!
//! # Invariants
//! - Learning is the only cross-entity write and can be switched off.
//! - A decision without a recorded outcome or reasoning teaches nothing.
//! - `get_agent_intelligence` reads only.

use crate::db::Store;
use crate::model::agent::{
    AgentIntelligence, AgentState, Decision, DecisionId, Knowledge, KnowledgeId, NewDecision,
    NewKnowledge, NewPattern, Pattern, PatternId, PatternType, StateType,
};
use crate::model::now_epoch_ms;
use crate::model::workspace::WorkspaceId;
use crate::repo::agent_repo::{AgentRepository, SqliteAgentRepository};
use crate::repo::RepoResult;
use crate::validation::{require_non_empty, validate_id, validate_scope};
use log::{debug, info};

/// Default floor for knowledge recall.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
/// Floor for the "top patterns" slice of the intelligence summary.
pub const TOP_PATTERN_MIN_SUCCESS_RATE: f64 = 0.7;
const SUMMARY_SLICE_LEN: usize = 5;

const SUCCESS_LESSON_CONFIDENCE: f64 = 0.8;
const FAILURE_LESSON_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone)]
pub struct AgentBrain {
    store: Store,
    learning_enabled: bool,
}

impl AgentBrain {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            learning_enabled: true,
        }
    }

    /// Turns `learn_from_decision` into a no-op when `false`.
    pub fn with_learning(mut self, enabled: bool) -> Self {
        self.learning_enabled = enabled;
        self
    }

    pub fn learning_enabled(&self) -> bool {
        self.learning_enabled
    }

    pub fn store_knowledge(&self, knowledge: &NewKnowledge) -> RepoResult<KnowledgeId> {
        validate_scope(knowledge.workspace_id)?;
        require_non_empty("topic", &knowledge.topic)?;
        require_non_empty("fact", &knowledge.fact)?;
        let id = self
            .store
            .with_write_connection(|tx| SqliteAgentRepository::new(tx).store_knowledge(knowledge))?;
        debug!("event=knowledge_store module=brain status=ok knowledge_id={id}");
        Ok(id)
    }

    pub fn recall_knowledge(
        &self,
        workspace_id: Option<WorkspaceId>,
        topic: Option<&str>,
        min_confidence: f64,
    ) -> RepoResult<Vec<Knowledge>> {
        validate_scope(workspace_id)?;
        self.store.with_connection(|tx| {
            SqliteAgentRepository::new(tx).recall_knowledge(workspace_id, topic, min_confidence)
        })
    }

    pub fn update_knowledge_usage(&self, id: KnowledgeId) -> RepoResult<()> {
        validate_id("knowledge_id", id)?;
        let now = now_epoch_ms();
        self.store
            .with_write_connection(|tx| SqliteAgentRepository::new(tx).update_knowledge_usage(id, now))
    }

    pub fn record_decision(&self, decision: &NewDecision) -> RepoResult<DecisionId> {
        validate_scope(decision.workspace_id)?;
        require_non_empty("decision_type", &decision.decision_type)?;
        require_non_empty("decision", &decision.decision)?;
        let id = self
            .store
            .with_write_connection(|tx| SqliteAgentRepository::new(tx).record_decision(decision))?;
        debug!(
            "event=decision_record module=brain status=ok decision_id={} decision_type={}",
            id, decision.decision_type
        );
        Ok(id)
    }

    pub fn get_decision(&self, id: DecisionId) -> RepoResult<Option<Decision>> {
        validate_id("decision_id", id)?;
        self.store
            .with_connection(|tx| SqliteAgentRepository::new(tx).get_decision(id))
    }

    pub fn update_decision_outcome(
        &self,
        id: DecisionId,
        outcome: &str,
        success: bool,
    ) -> RepoResult<()> {
        validate_id("decision_id", id)?;
        self.store.with_write_connection(|tx| {
            SqliteAgentRepository::new(tx).update_decision_outcome(id, outcome, success)
        })
    }

    /// Up to ten decisions, successful and recent first. `"any"` or `None`
    /// matches every decision type.
    pub fn recall_similar_decisions(
        &self,
        workspace_id: Option<WorkspaceId>,
        decision_type: Option<&str>,
    ) -> RepoResult<Vec<Decision>> {
        validate_scope(workspace_id)?;
        self.store.with_connection(|tx| {
            SqliteAgentRepository::new(tx).recall_similar_decisions(workspace_id, decision_type)
        })
    }

    pub fn record_pattern(&self, pattern: &NewPattern) -> RepoResult<PatternId> {
        validate_scope(pattern.workspace_id)?;
        require_non_empty("pattern_name", &pattern.pattern_name)?;
        self.store
            .with_write_connection(|tx| SqliteAgentRepository::new(tx).record_pattern(pattern))
    }

    pub fn get_pattern(&self, id: PatternId) -> RepoResult<Option<Pattern>> {
        validate_id("pattern_id", id)?;
        self.store
            .with_connection(|tx| SqliteAgentRepository::new(tx).get_pattern(id))
    }

    /// Folds one outcome into the pattern's success rate atomically.
    pub fn update_pattern_success(&self, id: PatternId, success: bool) -> RepoResult<()> {
        validate_id("pattern_id", id)?;
        let now = now_epoch_ms();
        self.store.with_write_connection(|tx| {
            SqliteAgentRepository::new(tx).update_pattern_success(id, success, now)
        })
    }

    pub fn recall_patterns(
        &self,
        workspace_id: Option<WorkspaceId>,
        pattern_type: Option<PatternType>,
        min_success_rate: f64,
    ) -> RepoResult<Vec<Pattern>> {
        validate_scope(workspace_id)?;
        self.store.with_connection(|tx| {
            SqliteAgentRepository::new(tx).recall_patterns(
                workspace_id,
                pattern_type,
                min_success_rate,
            )
        })
    }

    pub fn set_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        state_key: &str,
        state_value: &str,
        state_type: StateType,
        expires_at: Option<i64>,
    ) -> RepoResult<()> {
        validate_scope(workspace_id)?;
        require_non_empty("state_key", state_key)?;
        self.store.with_write_connection(|tx| {
            SqliteAgentRepository::new(tx).set_agent_state(
                workspace_id,
                state_key,
                state_value,
                state_type,
                expires_at,
            )
        })
    }

    /// Value of an unexpired state entry.
    pub fn get_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        state_key: &str,
    ) -> RepoResult<Option<String>> {
        validate_scope(workspace_id)?;
        let now = now_epoch_ms();
        let state = self.store.with_connection(|tx| {
            SqliteAgentRepository::new(tx).get_agent_state(workspace_id, state_key, now)
        })?;
        Ok(state.map(|state| state.state_value))
    }

    pub fn get_all_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
    ) -> RepoResult<Vec<AgentState>> {
        validate_scope(workspace_id)?;
        let now = now_epoch_ms();
        self.store.with_connection(|tx| {
            SqliteAgentRepository::new(tx).get_all_agent_state(workspace_id, now)
        })
    }

    pub fn cleanup_expired_agent_state(&self) -> RepoResult<usize> {
        let now = now_epoch_ms();
        let deleted = self.store.with_write_connection(|tx| {
            SqliteAgentRepository::new(tx).cleanup_expired_agent_state(now)
        })?;
        info!("event=agent_state_cleanup module=brain status=ok deleted={deleted}");
        Ok(deleted)
    }

    /// Stores the lesson of a finished decision as knowledge.
    ///
    /// Returns the new knowledge id, or `None` when learning is disabled,
    /// the decision does not exist, or it has no reasoning. A decision
    /// without a recorded outcome is learned from as a failure.
    pub fn learn_from_decision(&self, id: DecisionId) -> RepoResult<Option<KnowledgeId>> {
        if !self.learning_enabled {
            debug!("event=decision_learn module=brain status=skipped reason=disabled decision_id={id}");
            return Ok(None);
        }
        validate_id("decision_id", id)?;

        self.store.with_write_connection(|tx| -> RepoResult<Option<KnowledgeId>> {
            let repo = SqliteAgentRepository::new(tx);
            let Some(decision) = repo.get_decision(id)? else {
                debug!("event=decision_learn module=brain status=skipped reason=missing decision_id={id}");
                return Ok(None);
            };
            let Some(lesson) = lesson_from(&decision) else {
                return Ok(None);
            };

            let knowledge_id = repo.store_knowledge(&lesson)?;
            info!(
                "event=decision_learn module=brain status=ok decision_id={id} knowledge_id={knowledge_id}"
            );
            Ok(Some(knowledge_id))
        })
    }

    /// Counts plus the top patterns and most relevant recent decisions.
    pub fn get_agent_intelligence(
        &self,
        workspace_id: Option<WorkspaceId>,
    ) -> RepoResult<AgentIntelligence> {
        validate_scope(workspace_id)?;
        let now = now_epoch_ms();
        self.store.with_connection(|tx| -> RepoResult<AgentIntelligence> {
            let repo = SqliteAgentRepository::new(tx);
            let counts = repo.counts(workspace_id, DEFAULT_MIN_CONFIDENCE, now)?;
            let mut top_patterns =
                repo.recall_patterns(workspace_id, None, TOP_PATTERN_MIN_SUCCESS_RATE)?;
            top_patterns.truncate(SUMMARY_SLICE_LEN);
            let mut recent_decisions = repo.recall_similar_decisions(workspace_id, None)?;
            recent_decisions.truncate(SUMMARY_SLICE_LEN);

            Ok(AgentIntelligence {
                knowledge_count: counts.knowledge,
                decision_count: counts.decisions,
                pattern_count: counts.patterns,
                state_count: counts.states,
                top_patterns,
                recent_decisions,
            })
        })
    }
}

fn lesson_from(decision: &Decision) -> Option<NewKnowledge> {
    let reasoning = decision
        .reasoning
        .as_deref()
        .map(str::trim)
        .filter(|reasoning| !reasoning.is_empty())?;

    let (fact, confidence) = match decision.success.unwrap_or(false) {
        true => (
            format!("Successful approach: {reasoning}"),
            SUCCESS_LESSON_CONFIDENCE,
        ),
        false => (
            format!("Avoid: {reasoning} — led to failure"),
            FAILURE_LESSON_CONFIDENCE,
        ),
    };

    Some(
        NewKnowledge::new(decision.workspace_id, decision.decision_type.clone(), fact)
            .with_source(format!("decision_{}", decision.id))
            .with_confidence(confidence),
    )
}

#[cfg(test)]
mod tests {
    use super::lesson_from;
    use crate::model::agent::Decision;

    fn decision(reasoning: Option<&str>, success: Option<bool>) -> Decision {
        Decision {
            id: 7,
            workspace_id: Some(1),
            decision_type: "file_edit".to_string(),
            input_context: None,
            reasoning: reasoning.map(str::to_string),
            decision: "edit".to_string(),
            outcome: None,
            success,
            learned_from: None,
            created_at: 0,
        }
    }

    #[test]
    fn success_and_failure_produce_weighted_lessons() {
        let win = lesson_from(&decision(Some("small diffs"), Some(true))).unwrap();
        assert_eq!(win.fact, "Successful approach: small diffs");
        assert_eq!(win.confidence, 0.8);
        assert_eq!(win.source.as_deref(), Some("decision_7"));
        assert_eq!(win.topic, "file_edit");

        let loss = lesson_from(&decision(Some("big bang rewrite"), Some(false))).unwrap();
        assert_eq!(loss.fact, "Avoid: big bang rewrite — led to failure");
        assert_eq!(loss.confidence, 0.6);
    }

    #[test]
    fn missing_outcome_is_learned_as_failure() {
        let pending = lesson_from(&decision(Some("guesswork"), None)).unwrap();
        assert_eq!(pending.fact, "Avoid: guesswork — led to failure");
        assert_eq!(pending.confidence, 0.6);
    }

    #[test]
    fn missing_reasoning_teaches_nothing() {
        assert!(lesson_from(&decision(None, Some(true))).is_none());
        assert!(lesson_from(&decision(None, None)).is_none());
        assert!(lesson_from(&decision(Some("   "), Some(false))).is_none());
    }
}
