//! Scoped transactional execution over a freshly opened connection.
//!
//! # Responsibility
//! - Hand callers a transaction that only lives inside a closure.
//! - Commit on `Ok`, roll back on `Err`, close the connection either way.
//!
//! # Invariants
//! - The caller's error is returned unchanged; a failed rollback is logged,
//!   never substituted for it.
//! - A failed commit surfaces as a `DbError` and nothing is persisted.

use super::open::open_db;
use super::DbError;
use crate::config::StoreConfig;
use log::{debug, warn};
use rusqlite::{Transaction, TransactionBehavior};
use std::path::Path;

/// Runs `work` inside one transaction on a new connection to `config.path`.
///
/// The transaction is deferred: it takes the write lock on the first write.
pub fn with_connection<T, E, F>(config: &StoreConfig, work: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DbError>,
{
    run_scoped(config, TransactionBehavior::Deferred, work)
}

fn run_scoped<T, E, F>(config: &StoreConfig, behavior: TransactionBehavior, work: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<DbError>,
{
    let mut conn = open_db(config)?;
    let tx = conn
        .transaction_with_behavior(behavior)
        .map_err(DbError::from)?;

    match work(&tx) {
        Ok(value) => {
            tx.commit().map_err(DbError::from)?;
            debug!("event=db_scope module=db status=ok outcome=commit");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(
                    "event=db_scope module=db status=error outcome=rollback_failed error={}",
                    rollback_err
                );
            } else {
                debug!("event=db_scope module=db status=ok outcome=rollback");
            }
            Err(err)
        }
    }
}

/// Handle to one store file; the composition root for services.
///
/// Cloning is cheap and every scope opens its own connection, so clones can
/// be handed to independent callers.
#[derive(Debug, Clone)]
pub struct Store {
    config: StoreConfig,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Builds a store at `path` with production defaults.
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self::new(StoreConfig::new(path.as_ref()))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Runs `work` in a deferred transaction. Suited to read scopes.
    pub fn with_connection<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        run_scoped(&self.config, TransactionBehavior::Deferred, work)
    }

    /// Runs `work` in an immediate transaction holding the write lock.
    ///
    /// A second writer waits up to the configured busy timeout, then fails
    /// with a busy error instead of blocking indefinitely.
    pub fn with_write_connection<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        run_scoped(&self.config, TransactionBehavior::Immediate, work)
    }
}
