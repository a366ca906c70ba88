//! Clean-room schema initializer.
//!
//! # Responsibility
//! - Delete any existing store (and its WAL/SHM side files) at the target path.
//! - Execute an external schema file, plus an optional extra schema file,
//!   inside one transaction.
//!
//! # Invariants
//! - Destructive: never call this on a store holding production data.
//! - Either the whole schema lands or none of it does.

use super::scope::with_connection;
use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Schema shipped with this crate; write it to disk to bootstrap a store.
pub const BUNDLED_SCHEMA: &str = include_str!("../../schema/dexter.sql");

const SIDE_FILE_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Re-initializes the store at `config.path` from `schema_path`.
///
/// # Errors
/// - `DbError::SchemaNotFound` when `schema_path` does not exist. The existing
///   store is left untouched in that case.
/// - `DbError::Io` when the old store cannot be removed or the schema read.
/// - `DbError::Sqlite` when any schema statement fails; nothing is applied.
pub fn init_database(config: &StoreConfig, schema_path: impl AsRef<Path>) -> DbResult<()> {
    init_database_with_extra(config, schema_path, None)
}

/// Like [`init_database`], then applies `extra_schema_path` in the same
/// transaction.
///
/// A missing extra schema file is skipped with a warning; only the core
/// schema is mandatory.
pub fn init_database_with_extra(
    config: &StoreConfig,
    schema_path: impl AsRef<Path>,
    extra_schema_path: Option<&Path>,
) -> DbResult<()> {
    let started_at = Instant::now();
    let schema_path = schema_path.as_ref();
    info!(
        "event=db_init module=db status=start path={}",
        config.path.display()
    );

    if !schema_path.exists() {
        error!(
            "event=db_init module=db status=error error_code=schema_not_found schema={}",
            schema_path.display()
        );
        return Err(DbError::SchemaNotFound(schema_path.to_path_buf()));
    }
    let schema = read_schema(schema_path)?;
    let extra_schema = match extra_schema_path {
        Some(path) if path.exists() => Some(read_schema(path)?),
        Some(path) => {
            warn!(
                "event=db_init module=db status=skipped reason=extra_schema_missing schema={}",
                path.display()
            );
            None
        }
        None => None,
    };

    if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DbError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    remove_existing_store(&config.path)?;

    let result = with_connection(config, |tx| {
        tx.execute_batch(&schema)?;
        if let Some(extra_schema) = &extra_schema {
            tx.execute_batch(extra_schema)?;
        }
        Ok::<_, DbError>(())
    });

    match &result {
        Ok(()) => info!(
            "event=db_init module=db status=ok path={} duration_ms={}",
            config.path.display(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_init module=db status=error error_code=schema_apply_failed duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn read_schema(path: &Path) -> DbResult<String> {
    std::fs::read_to_string(path).map_err(|source| DbError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_existing_store(path: &Path) -> DbResult<()> {
    let mut targets = vec![path.to_path_buf()];
    targets.extend(SIDE_FILE_SUFFIXES.iter().map(|suffix| side_file(path, suffix)));

    for target in targets {
        if !target.exists() {
            continue;
        }
        warn!(
            "event=db_init module=db status=remove_existing path={}",
            target.display()
        );
        std::fs::remove_file(&target).map_err(|source| DbError::Io {
            path: target.clone(),
            source,
        })?;
    }
    Ok(())
}

fn side_file(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::side_file;
    use std::path::Path;

    #[test]
    fn side_file_appends_suffix_to_full_name() {
        assert_eq!(
            side_file(Path::new("/data/dexter.db"), "-wal"),
            Path::new("/data/dexter.db-wal")
        );
    }
}
