//! Core persistence layer for Dexter workspaces.
//! This crate is the single source of truth for store invariants.

pub mod config;
pub mod db;
pub mod health;
pub mod logging;
pub mod model;
pub mod reliability;
pub mod repo;
pub mod service;
pub mod validation;

pub use config::StoreConfig;
pub use db::{init_database, init_database_with_extra, DbError, DbResult, Store, BUNDLED_SCHEMA};
pub use health::{health_check, system_stats, validate_data, validate_schema, HealthStatus};
pub use logging::{default_log_level, init_logging, logging_status};
pub use reliability::{CallContext, Command, CommandExt, Guards, ReliabilityError};
pub use repo::{RepoError, RepoResult};
pub use service::action_verifier::ActionVerifier;
pub use service::agent_brain::AgentBrain;
pub use service::context_service::ContextService;
pub use service::rule_service::RuleService;
pub use service::workspace_service::WorkspaceService;
pub use validation::ValidationError;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
