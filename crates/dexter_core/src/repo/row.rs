//! Row decoding helpers shared by repositories.

use super::error::{RepoError, RepoResult};
use rusqlite::Row;

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Decodes a `0/1` flag column, rejecting anything else.
pub(crate) fn flag(row: &Row<'_>, column: &str, table: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in {table}.{column}"
        ))),
    }
}

pub(crate) fn optional_flag(row: &Row<'_>, column: &str, table: &str) -> RepoResult<Option<bool>> {
    match row.get::<_, Option<i64>>(column)? {
        None => Ok(None),
        Some(0) => Ok(Some(false)),
        Some(1) => Ok(Some(true)),
        Some(other) => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in {table}.{column}"
        ))),
    }
}
