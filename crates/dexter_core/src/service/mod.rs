//! Use-case services over a [`crate::db::Store`].
//!
//! # Responsibility
//! - Validate input, then orchestrate repository calls inside one scope.
//! - Keep callers (CLI, reliability wrappers) away from SQL and scopes.
//!
//! # Invariants
//! - One public call opens at most one write scope.
//! - Services hold a cloned `Store`, never a live connection.

pub mod action_verifier;
pub mod agent_brain;
pub mod context_service;
pub mod rule_service;
pub mod workspace_service;
