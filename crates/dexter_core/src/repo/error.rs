//! Repository error taxonomy.

use crate::db::DbError;
use crate::validation::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Validation(ValidationError),
    /// Workspace name already taken.
    DuplicateName(String),
    /// Unique, foreign-key or check constraint violation.
    Integrity(String),
    NotFound { entity: &'static str, id: i64 },
    /// Persisted data cannot be decoded into a valid record.
    InvalidData(String),
}

impl RepoError {
    /// SQLite busy/locked; safe to retry.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }

    pub fn is_integrity(&self) -> bool {
        match self {
            Self::DuplicateName(_) | Self::Integrity(_) => true,
            Self::Db(err) => err.is_integrity(),
            _ => false,
        }
    }

    /// Classifies a write failure, lifting constraint violations into
    /// `Integrity` so callers can match on them without digging into SQLite.
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Self::Integrity(err.to_string()),
            _ => Self::Db(DbError::Sqlite(err)),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateName(name) => write!(f, "workspace name already exists: `{name}`"),
            Self::Integrity(message) => write!(f, "integrity violation: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}
