//! Agent brain records: knowledge, decisions, patterns, state.
//!
//! # Invariants
//! - `confidence` is in `[0, 1]` and only changes through explicit writes.
//! - `success_rate` is the streaming mean of recorded outcomes and is never
//!   reset without resetting `usage_count` alongside it.
//! - `learned_from` is a lookup reference between decisions, not ownership.

use super::workspace::WorkspaceId;
use serde::{Deserialize, Serialize};

pub type KnowledgeId = i64;
pub type DecisionId = i64;
pub type PatternId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    pub id: KnowledgeId,
    pub workspace_id: Option<WorkspaceId>,
    pub topic: String,
    pub fact: String,
    pub source: Option<String>,
    pub confidence: f64,
    pub usage_count: i64,
    pub last_used: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewKnowledge {
    pub workspace_id: Option<WorkspaceId>,
    pub topic: String,
    pub fact: String,
    pub source: Option<String>,
    pub confidence: f64,
}

impl NewKnowledge {
    /// Fact at full confidence with no source.
    pub fn new(
        workspace_id: Option<WorkspaceId>,
        topic: impl Into<String>,
        fact: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id,
            topic: topic.into(),
            fact: fact.into(),
            source: None,
            confidence: 1.0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub workspace_id: Option<WorkspaceId>,
    pub decision_type: String,
    pub input_context: Option<String>,
    pub reasoning: Option<String>,
    pub decision: String,
    pub outcome: Option<String>,
    /// `None` until an outcome is recorded.
    pub success: Option<bool>,
    pub learned_from: Option<DecisionId>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewDecision {
    pub workspace_id: Option<WorkspaceId>,
    pub decision_type: String,
    pub decision: String,
    pub input_context: Option<String>,
    pub reasoning: Option<String>,
    pub learned_from: Option<DecisionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Success,
    Failure,
    Optimization,
    Warning,
}

impl PatternType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Optimization => "optimization",
            Self::Warning => "warning",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            "optimization" => Some(Self::Optimization),
            "warning" => Some(Self::Warning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub workspace_id: Option<WorkspaceId>,
    pub pattern_name: String,
    pub pattern_type: PatternType,
    pub trigger_conditions: String,
    pub action_taken: String,
    pub success_rate: f64,
    pub usage_count: i64,
    pub last_used: Option<i64>,
}

impl Pattern {
    /// Streaming mean after folding in one more outcome.
    pub fn next_success_rate(rate: f64, count: i64, success: bool) -> f64 {
        let outcome = if success { 1.0 } else { 0.0 };
        let count = count.max(0) as f64;
        (rate * count + outcome) / (count + 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPattern {
    pub workspace_id: Option<WorkspaceId>,
    pub pattern_name: String,
    pub pattern_type: PatternType,
    pub trigger_conditions: String,
    pub action_taken: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    #[default]
    Preference,
    Memory,
    Goal,
    Constraint,
}

impl StateType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preference => "preference",
            Self::Memory => "memory",
            Self::Goal => "goal",
            Self::Constraint => "constraint",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preference" => Some(Self::Preference),
            "memory" => Some(Self::Memory),
            "goal" => Some(Self::Goal),
            "constraint" => Some(Self::Constraint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub workspace_id: Option<WorkspaceId>,
    pub state_key: String,
    pub state_value: String,
    pub state_type: StateType,
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

/// Derived summary of one scope's brain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIntelligence {
    pub knowledge_count: usize,
    pub decision_count: usize,
    pub pattern_count: usize,
    pub state_count: usize,
    pub top_patterns: Vec<Pattern>,
    pub recent_decisions: Vec<Decision>,
}
