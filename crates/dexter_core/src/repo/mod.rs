//! Repository layer: typed CRUD over the store's tables.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts per entity family.
//! - Keep SQL details and row decoding inside the persistence boundary.
//!
//! # Invariants
//! - Repositories borrow a connection (usually a scoped transaction) and
//!   never commit on their own.
//! - Reads hide soft-deleted (`is_active = 0`) and expired rows.
//! - Natural-key writes upsert, except workspace names which must be unique.

pub mod action_repo;
pub mod agent_repo;
pub mod error;
pub mod integration_repo;
pub mod rule_repo;
pub mod settings_repo;
pub mod workspace_repo;

mod row;

pub use error::{RepoError, RepoResult};
