//! SQLite connection management and schema bootstrap entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections with retry/backoff.
//! - Run caller work inside a scoped transaction with commit-or-rollback.
//! - Apply the external schema file as a one-shot clean-room initializer.
//!
//! # Invariants
//! - Every returned connection has `foreign_keys=ON` and a busy timeout.
//! - A scope either commits every statement it ran or none of them.
//! - A scoped connection is closed on every exit path.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod bootstrap;
mod open;
mod scope;

pub use bootstrap::{init_database, init_database_with_extra, BUNDLED_SCHEMA};
pub use open::{open_db, open_db_in_memory};
pub use scope::{with_connection, Store};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Store could not be opened after all retry attempts.
    Connection {
        attempts: u32,
        source: rusqlite::Error,
    },
    SchemaNotFound(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DbError {
    /// Returns whether the error is SQLite write contention (busy/locked).
    pub fn is_busy(&self) -> bool {
        let err = match self {
            Self::Sqlite(err) => err,
            Self::Connection { source, .. } => source,
            _ => return false,
        };
        matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        )
    }

    /// Returns whether the error is a unique/foreign-key/check violation.
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Sqlite(err) => matches!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::ConstraintViolation)
            ),
            _ => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Connection { attempts, source } => write!(
                f,
                "failed to open database after {attempts} attempt(s): {source}"
            ),
            Self::SchemaNotFound(path) => {
                write!(f, "schema file not found: {}", path.display())
            }
            Self::Io { path, source } => write!(f, "i/o error on `{}`: {source}", path.display()),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Connection { source, .. } => Some(source),
            Self::SchemaNotFound(_) => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
