//! Reliability error taxonomy.

use crate::db::DbError;
use crate::repo::RepoError;
use crate::validation::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type ReliabilityResult<T> = Result<T, ReliabilityError>;

#[derive(Debug)]
pub enum ReliabilityError {
    /// Policy rejection; the wrapped command never ran.
    RateLimitExceeded {
        key: String,
        max_calls: usize,
        window: Duration,
    },
    /// Policy rejection; the wrapped command never ran.
    SafetyCheckFailed(String),
    /// The command ran but its result was rejected.
    ResultVerificationFailed(String),
    Validation(ValidationError),
    Repo(RepoError),
    /// Failure raised by wrapped business logic.
    Operation(String),
}

impl ReliabilityError {
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    /// Rate-limit and safety rejections.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::SafetyCheckFailed(_)
        )
    }

    /// SQLite busy/locked; the default retryable class.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Repo(err) if err.is_busy())
    }
}

impl Display for ReliabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimitExceeded {
                key,
                max_calls,
                window,
            } => write!(
                f,
                "rate limit exceeded for `{key}`: {max_calls} calls per {}s",
                window.as_secs()
            ),
            Self::SafetyCheckFailed(message) => write!(f, "safety check failed: {message}"),
            Self::ResultVerificationFailed(message) => {
                write!(f, "result verification failed: {message}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Operation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ReliabilityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ReliabilityError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for ReliabilityError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for ReliabilityError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}
