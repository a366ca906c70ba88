//! Agent brain repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist knowledge facts, decisions, patterns and agent state.
//! - Provide the ordered recall queries the brain reasons over.
//!
//! # Invariants
//! - Every query is pinned to one scope with `workspace_id IS ?`; global
//!   rows (NULL) and workspace rows never mix in one result.
//! - `update_pattern_success` reads and writes the streaming mean with the
//!   borrowed connection, so a caller's transaction makes it atomic.
//! - Agent state reads filter expired rows like context reads.

use super::error::{RepoError, RepoResult};
use super::row::{bool_to_int, optional_flag};
use crate::model::agent::{
    AgentState, Decision, DecisionId, Knowledge, KnowledgeId, NewDecision, NewKnowledge,
    NewPattern, Pattern, PatternId, PatternType, StateType,
};
use crate::model::workspace::WorkspaceId;
use crate::validation::ValidationError;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Decision recall never returns more rows than this.
pub const DECISION_RECALL_LIMIT: u32 = 10;

/// `decision_type` value that disables the type filter in decision recall.
pub const ANY_DECISION_TYPE: &str = "any";

const KNOWLEDGE_SELECT_SQL: &str = "SELECT
    id,
    workspace_id,
    topic,
    fact,
    source,
    confidence,
    usage_count,
    last_used,
    created_at
FROM agent_knowledge";

const DECISION_SELECT_SQL: &str = "SELECT
    id,
    workspace_id,
    decision_type,
    input_context,
    reasoning,
    decision,
    outcome,
    success,
    learned_from,
    created_at
FROM agent_decisions";

const PATTERN_SELECT_SQL: &str = "SELECT
    id,
    workspace_id,
    pattern_name,
    pattern_type,
    trigger_conditions,
    action_taken,
    success_rate,
    usage_count,
    last_used
FROM agent_patterns";

const STATE_SELECT_SQL: &str = "SELECT
    workspace_id,
    state_key,
    state_value,
    state_type,
    expires_at,
    updated_at
FROM agent_state";

/// Per-table row counts for one scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrainCounts {
    pub knowledge: usize,
    pub decisions: usize,
    pub patterns: usize,
    pub states: usize,
}

pub trait AgentRepository {
    fn store_knowledge(&self, knowledge: &NewKnowledge) -> RepoResult<KnowledgeId>;
    fn get_knowledge(&self, id: KnowledgeId) -> RepoResult<Option<Knowledge>>;
    /// Ordered by confidence, then usage count, both descending.
    fn recall_knowledge(
        &self,
        workspace_id: Option<WorkspaceId>,
        topic: Option<&str>,
        min_confidence: f64,
    ) -> RepoResult<Vec<Knowledge>>;
    fn update_knowledge_usage(&self, id: KnowledgeId, now_ms: i64) -> RepoResult<()>;

    fn record_decision(&self, decision: &NewDecision) -> RepoResult<DecisionId>;
    fn get_decision(&self, id: DecisionId) -> RepoResult<Option<Decision>>;
    fn update_decision_outcome(
        &self,
        id: DecisionId,
        outcome: &str,
        success: bool,
    ) -> RepoResult<()>;
    /// Successful first, then newest; at most [`DECISION_RECALL_LIMIT`].
    fn recall_similar_decisions(
        &self,
        workspace_id: Option<WorkspaceId>,
        decision_type: Option<&str>,
    ) -> RepoResult<Vec<Decision>>;

    fn record_pattern(&self, pattern: &NewPattern) -> RepoResult<PatternId>;
    fn get_pattern(&self, id: PatternId) -> RepoResult<Option<Pattern>>;
    /// Folds one outcome into the pattern's streaming mean.
    fn update_pattern_success(&self, id: PatternId, success: bool, now_ms: i64)
        -> RepoResult<()>;
    fn recall_patterns(
        &self,
        workspace_id: Option<WorkspaceId>,
        pattern_type: Option<PatternType>,
        min_success_rate: f64,
    ) -> RepoResult<Vec<Pattern>>;

    fn set_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        state_key: &str,
        state_value: &str,
        state_type: StateType,
        expires_at: Option<i64>,
    ) -> RepoResult<()>;
    fn get_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        state_key: &str,
        now_ms: i64,
    ) -> RepoResult<Option<AgentState>>;
    /// Unexpired state ordered by key.
    fn get_all_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        now_ms: i64,
    ) -> RepoResult<Vec<AgentState>>;
    fn cleanup_expired_agent_state(&self, now_ms: i64) -> RepoResult<usize>;

    /// Knowledge at or above `min_confidence`, decisions capped at the
    /// recall limit, every pattern and every unexpired state entry.
    fn counts(
        &self,
        workspace_id: Option<WorkspaceId>,
        min_confidence: f64,
        now_ms: i64,
    ) -> RepoResult<BrainCounts>;
}

pub struct SqliteAgentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAgentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AgentRepository for SqliteAgentRepository<'_> {
    fn store_knowledge(&self, knowledge: &NewKnowledge) -> RepoResult<KnowledgeId> {
        if !(0.0..=1.0).contains(&knowledge.confidence) {
            return Err(ValidationError::Rejected(format!(
                "confidence must be within [0, 1], got {}",
                knowledge.confidence
            ))
            .into());
        }

        self.conn
            .execute(
                "INSERT INTO agent_knowledge (workspace_id, topic, fact, source, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    knowledge.workspace_id,
                    knowledge.topic.as_str(),
                    knowledge.fact.as_str(),
                    knowledge.source.as_deref(),
                    knowledge.confidence,
                ],
            )
            .map_err(RepoError::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_knowledge(&self, id: KnowledgeId) -> RepoResult<Option<Knowledge>> {
        let knowledge = self
            .conn
            .query_row(
                &format!("{KNOWLEDGE_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_knowledge_row,
            )
            .optional()?;
        Ok(knowledge)
    }

    fn recall_knowledge(
        &self,
        workspace_id: Option<WorkspaceId>,
        topic: Option<&str>,
        min_confidence: f64,
    ) -> RepoResult<Vec<Knowledge>> {
        let mut stmt = self.conn.prepare(&format!(
            "{KNOWLEDGE_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND (?2 IS NULL OR topic = ?2)
               AND confidence >= ?3
             ORDER BY confidence DESC, usage_count DESC, id ASC;"
        ))?;
        let rows = stmt.query_map(
            params![workspace_id, topic, min_confidence],
            parse_knowledge_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn update_knowledge_usage(&self, id: KnowledgeId, now_ms: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE agent_knowledge
             SET
                usage_count = usage_count + 1,
                last_used = ?2
             WHERE id = ?1;",
            params![id, now_ms],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "knowledge",
                id,
            });
        }
        Ok(())
    }

    fn record_decision(&self, decision: &NewDecision) -> RepoResult<DecisionId> {
        self.conn
            .execute(
                "INSERT INTO agent_decisions (
                    workspace_id,
                    decision_type,
                    input_context,
                    reasoning,
                    decision,
                    learned_from
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    decision.workspace_id,
                    decision.decision_type.as_str(),
                    decision.input_context.as_deref(),
                    decision.reasoning.as_deref(),
                    decision.decision.as_str(),
                    decision.learned_from,
                ],
            )
            .map_err(RepoError::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_decision(&self, id: DecisionId) -> RepoResult<Option<Decision>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DECISION_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_decision_row(row)?));
        }
        Ok(None)
    }

    fn update_decision_outcome(
        &self,
        id: DecisionId,
        outcome: &str,
        success: bool,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE agent_decisions
             SET
                outcome = ?2,
                success = ?3
             WHERE id = ?1;",
            params![id, outcome, bool_to_int(success)],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "decision",
                id,
            });
        }
        Ok(())
    }

    fn recall_similar_decisions(
        &self,
        workspace_id: Option<WorkspaceId>,
        decision_type: Option<&str>,
    ) -> RepoResult<Vec<Decision>> {
        let decision_type = decision_type.filter(|value| *value != ANY_DECISION_TYPE);
        let mut stmt = self.conn.prepare(&format!(
            "{DECISION_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND (?2 IS NULL OR decision_type = ?2)
             ORDER BY success DESC, created_at DESC, id DESC
             LIMIT ?3;"
        ))?;
        let mut rows = stmt.query(params![workspace_id, decision_type, DECISION_RECALL_LIMIT])?;
        let mut decisions = Vec::new();
        while let Some(row) = rows.next()? {
            decisions.push(parse_decision_row(row)?);
        }
        Ok(decisions)
    }

    fn record_pattern(&self, pattern: &NewPattern) -> RepoResult<PatternId> {
        self.conn
            .execute(
                "INSERT INTO agent_patterns (
                    workspace_id,
                    pattern_name,
                    pattern_type,
                    trigger_conditions,
                    action_taken
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    pattern.workspace_id,
                    pattern.pattern_name.as_str(),
                    pattern.pattern_type.as_str(),
                    pattern.trigger_conditions.as_str(),
                    pattern.action_taken.as_str(),
                ],
            )
            .map_err(RepoError::from_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_pattern(&self, id: PatternId) -> RepoResult<Option<Pattern>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PATTERN_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_pattern_row(row)?));
        }
        Ok(None)
    }

    fn update_pattern_success(
        &self,
        id: PatternId,
        success: bool,
        now_ms: i64,
    ) -> RepoResult<()> {
        let current: Option<(f64, i64)> = self
            .conn
            .query_row(
                "SELECT success_rate, usage_count FROM agent_patterns WHERE id = ?1;",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((rate, count)) = current else {
            return Err(RepoError::NotFound {
                entity: "pattern",
                id,
            });
        };

        self.conn.execute(
            "UPDATE agent_patterns
             SET
                success_rate = ?2,
                usage_count = ?3,
                last_used = ?4
             WHERE id = ?1;",
            params![
                id,
                Pattern::next_success_rate(rate, count, success),
                count.max(0) + 1,
                now_ms,
            ],
        )?;
        Ok(())
    }

    fn recall_patterns(
        &self,
        workspace_id: Option<WorkspaceId>,
        pattern_type: Option<PatternType>,
        min_success_rate: f64,
    ) -> RepoResult<Vec<Pattern>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PATTERN_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND (?2 IS NULL OR pattern_type = ?2)
               AND success_rate >= ?3
             ORDER BY success_rate DESC, usage_count DESC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![
            workspace_id,
            pattern_type.map(PatternType::as_str),
            min_success_rate,
        ])?;
        let mut patterns = Vec::new();
        while let Some(row) = rows.next()? {
            patterns.push(parse_pattern_row(row)?);
        }
        Ok(patterns)
    }

    fn set_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        state_key: &str,
        state_value: &str,
        state_type: StateType,
        expires_at: Option<i64>,
    ) -> RepoResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE agent_state
                 SET
                    state_value = ?3,
                    state_type = ?4,
                    expires_at = ?5,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE workspace_id IS ?1
                   AND state_key = ?2;",
                params![
                    workspace_id,
                    state_key,
                    state_value,
                    state_type.as_str(),
                    expires_at
                ],
            )
            .map_err(RepoError::from_write)?;

        if changed == 0 {
            self.conn
                .execute(
                    "INSERT INTO agent_state (
                        workspace_id,
                        state_key,
                        state_value,
                        state_type,
                        expires_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        workspace_id,
                        state_key,
                        state_value,
                        state_type.as_str(),
                        expires_at
                    ],
                )
                .map_err(RepoError::from_write)?;
        }
        Ok(())
    }

    fn get_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        state_key: &str,
        now_ms: i64,
    ) -> RepoResult<Option<AgentState>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STATE_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND state_key = ?2
               AND (expires_at IS NULL OR expires_at > ?3);"
        ))?;
        let mut rows = stmt.query(params![workspace_id, state_key, now_ms])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_state_row(row)?));
        }
        Ok(None)
    }

    fn get_all_agent_state(
        &self,
        workspace_id: Option<WorkspaceId>,
        now_ms: i64,
    ) -> RepoResult<Vec<AgentState>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STATE_SELECT_SQL}
             WHERE workspace_id IS ?1
               AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY state_key ASC;"
        ))?;
        let mut rows = stmt.query(params![workspace_id, now_ms])?;
        let mut states = Vec::new();
        while let Some(row) = rows.next()? {
            states.push(parse_state_row(row)?);
        }
        Ok(states)
    }

    fn cleanup_expired_agent_state(&self, now_ms: i64) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM agent_state
             WHERE expires_at IS NOT NULL
               AND expires_at <= ?1;",
            [now_ms],
        )?;
        Ok(deleted)
    }

    fn counts(
        &self,
        workspace_id: Option<WorkspaceId>,
        min_confidence: f64,
        now_ms: i64,
    ) -> RepoResult<BrainCounts> {
        let counts = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM agent_knowledge
                    WHERE workspace_id IS ?1 AND confidence >= ?3),
                MIN((SELECT COUNT(*) FROM agent_decisions WHERE workspace_id IS ?1), ?4),
                (SELECT COUNT(*) FROM agent_patterns WHERE workspace_id IS ?1),
                (SELECT COUNT(*) FROM agent_state
                    WHERE workspace_id IS ?1
                      AND (expires_at IS NULL OR expires_at > ?2));",
            params![workspace_id, now_ms, min_confidence, DECISION_RECALL_LIMIT],
            |row| {
                Ok(BrainCounts {
                    knowledge: count(row.get(0)?),
                    decisions: count(row.get(1)?),
                    patterns: count(row.get(2)?),
                    states: count(row.get(3)?),
                })
            },
        )?;
        Ok(counts)
    }
}

fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn parse_knowledge_row(row: &Row<'_>) -> rusqlite::Result<Knowledge> {
    Ok(Knowledge {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        topic: row.get("topic")?,
        fact: row.get("fact")?,
        source: row.get("source")?,
        confidence: row.get("confidence")?,
        usage_count: row.get("usage_count")?,
        last_used: row.get("last_used")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_decision_row(row: &Row<'_>) -> RepoResult<Decision> {
    Ok(Decision {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        decision_type: row.get("decision_type")?,
        input_context: row.get("input_context")?,
        reasoning: row.get("reasoning")?,
        decision: row.get("decision")?,
        outcome: row.get("outcome")?,
        success: optional_flag(row, "success", "agent_decisions")?,
        learned_from: row.get("learned_from")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_pattern_row(row: &Row<'_>) -> RepoResult<Pattern> {
    let raw_type: String = row.get("pattern_type")?;
    let pattern_type = PatternType::parse(&raw_type).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid pattern_type value `{raw_type}` in agent_patterns.pattern_type"
        ))
    })?;

    Ok(Pattern {
        id: row.get("id")?,
        workspace_id: row.get("workspace_id")?,
        pattern_name: row.get("pattern_name")?,
        pattern_type,
        trigger_conditions: row.get("trigger_conditions")?,
        action_taken: row.get("action_taken")?,
        success_rate: row.get("success_rate")?,
        usage_count: row.get("usage_count")?,
        last_used: row.get("last_used")?,
    })
}

fn parse_state_row(row: &Row<'_>) -> RepoResult<AgentState> {
    let raw_type: String = row.get("state_type")?;
    let state_type = StateType::parse(&raw_type).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid state_type value `{raw_type}` in agent_state.state_type"
        ))
    })?;

    Ok(AgentState {
        workspace_id: row.get("workspace_id")?,
        state_key: row.get("state_key")?,
        state_value: row.get("state_value")?,
        state_type,
        expires_at: row.get("expires_at")?,
        updated_at: row.get("updated_at")?,
    })
}
