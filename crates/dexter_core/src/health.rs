//! Store health, schema validation and usage statistics.
//!
//! # Responsibility
//! - Report integrity, foreign-key, schema and table-size health.
//! - Back the `validate`, `health` and `stats` CLI commands.
//!
//! # Invariants
//! - No rows are written. Connections are opened through the normal
//!   store path, so the configured journal mode (WAL by default) is applied
//!   to an existing file like any other open.
//! - A missing store file is reported, never created.
//! - Health and validation capture store errors as findings; only
//!   `system_stats` propagates them.

use crate::db::{DbError, Store};
use crate::model::action::ActionStatus;
use crate::repo::action_repo::{ActionRepository, SqliteActionRepository};
use crate::repo::RepoResult;
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Tables a usable store must contain.
pub const REQUIRED_TABLES: &[&str] = &[
    "workspaces",
    "cursor_rules",
    "integrations",
    "action_log",
    "rules",
    "context",
    "domains",
    "checkpoints",
    "agent_knowledge",
    "agent_decisions",
    "agent_patterns",
    "agent_state",
];

/// Row count above which a table is flagged as large.
pub const LARGE_TABLE_ROWS: u64 = 10_000;

/// Workspace-scoped tables checked for rows pointing at missing workspaces.
const ORPHAN_CHECKED_TABLES: &[&str] = &["cursor_rules", "integrations", "context"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Usable, with warnings (orphans or large tables).
    Degraded,
    /// Missing, corrupt or incomplete store.
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Findings from one validation pass; empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub file_size_bytes: u64,
    /// Integrity, foreign-key and schema findings.
    pub schema: ValidationReport,
    /// Orphaned-row findings.
    pub data: ValidationReport,
    pub table_count: usize,
    pub index_count: usize,
    pub table_counts: BTreeMap<String, u64>,
    pub large_tables: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub actions_total: u64,
    pub actions_by_status: BTreeMap<String, u64>,
    pub workspaces: u64,
    pub active_rules: u64,
    pub active_integrations: u64,
}

/// Runs every check and folds them into one status.
pub fn health_check(store: &Store) -> HealthReport {
    let mut report = HealthReport {
        status: HealthStatus::Unhealthy,
        file_size_bytes: 0,
        schema: ValidationReport::default(),
        data: ValidationReport::default(),
        table_count: 0,
        index_count: 0,
        table_counts: BTreeMap::new(),
        large_tables: BTreeMap::new(),
    };

    match std::fs::metadata(store.path()) {
        Ok(metadata) => report.file_size_bytes = metadata.len(),
        Err(_) => {
            report.schema.issues.push(missing_store_issue(store));
            warn!(
                "event=health_check module=health status=error reason=missing_store path={}",
                store.path().display()
            );
            return report;
        }
    }

    report.schema = validate_schema(store);
    report.data = validate_data(store);

    let sizes = store.with_connection(|tx| -> Result<_, DbError> {
        let tables = table_names(tx)?;
        let mut counts = BTreeMap::new();
        for table in &tables {
            counts.insert(table.clone(), count_rows(tx, table)?);
        }
        let index_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%';",
            [],
            |row| row.get(0),
        )?;
        Ok((counts, usize::try_from(index_count).unwrap_or(0)))
    });
    match sizes {
        Ok((counts, index_count)) => {
            report.table_count = counts.len();
            report.index_count = index_count;
            report.large_tables = counts
                .iter()
                .filter(|(_, rows)| **rows > LARGE_TABLE_ROWS)
                .map(|(table, rows)| (table.clone(), *rows))
                .collect();
            report.table_counts = counts;
        }
        Err(err) => report.schema.issues.push(format!("Database error: {err}")),
    }

    report.status = if !report.schema.is_valid() {
        HealthStatus::Unhealthy
    } else if !report.data.is_valid() || !report.large_tables.is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    info!(
        "event=health_check module=health status={} tables={} indexes={} large_tables={}",
        report.status,
        report.table_count,
        report.index_count,
        report.large_tables.len()
    );
    report
}

/// Integrity check, required tables and foreign-key violations.
pub fn validate_schema(store: &Store) -> ValidationReport {
    let mut report = ValidationReport::default();
    if !store.path().exists() {
        report.issues.push(missing_store_issue(store));
        return report;
    }

    let result = store.with_connection(|tx| -> Result<(), DbError> {
        let integrity: String = tx.query_row("PRAGMA integrity_check;", [], |row| row.get(0))?;
        if integrity != "ok" {
            report
                .issues
                .push(format!("Integrity check failed: {integrity}"));
        }

        let existing = table_names(tx)?;
        for table in REQUIRED_TABLES {
            if !existing.iter().any(|name| name == table) {
                report.issues.push(format!("Required table missing: {table}"));
            }
        }

        let mut stmt = tx.prepare("PRAGMA foreign_key_check;")?;
        let violations = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for violation in violations {
            let (table, rowid, parent) = violation?;
            report.issues.push(format!(
                "Foreign key violation: {table} row {} references missing {parent}",
                rowid.map_or_else(|| "?".to_string(), |id| id.to_string())
            ));
        }
        Ok(())
    });
    if let Err(err) = result {
        report.issues.push(format!("Database error: {err}"));
    }
    report
}

/// Rows in workspace-scoped tables whose workspace no longer exists.
pub fn validate_data(store: &Store) -> ValidationReport {
    let mut report = ValidationReport::default();
    if !store.path().exists() {
        report.issues.push(missing_store_issue(store));
        return report;
    }

    let result = store.with_connection(|tx| -> Result<(), DbError> {
        for table in ORPHAN_CHECKED_TABLES {
            let orphans: i64 = tx.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {table} t
                     LEFT JOIN workspaces w ON t.workspace_id = w.id
                     WHERE t.workspace_id IS NOT NULL AND w.id IS NULL;"
                ),
                [],
                |row| row.get(0),
            )?;
            if orphans > 0 {
                report
                    .issues
                    .push(format!("Found {orphans} orphaned {table}"));
            }
        }
        Ok(())
    });
    if let Err(err) = result {
        report.issues.push(format!("Data validation error: {err}"));
    }
    report
}

/// Action counts by status plus active entity counts.
pub fn system_stats(store: &Store) -> RepoResult<SystemStats> {
    store.with_connection(|tx| -> RepoResult<SystemStats> {
        let by_status = SqliteActionRepository::new(tx).status_counts()?;
        let count = |sql: &str| -> RepoResult<u64> {
            let value: i64 = tx.query_row(sql, [], |row| row.get(0)).map_err(DbError::from)?;
            Ok(u64::try_from(value).unwrap_or(0))
        };

        Ok(SystemStats {
            actions_total: by_status.values().sum(),
            actions_by_status: by_status
                .into_iter()
                .map(|(status, rows): (ActionStatus, u64)| (status.as_str().to_string(), rows))
                .collect(),
            workspaces: count("SELECT COUNT(*) FROM workspaces;")?,
            active_rules: count("SELECT COUNT(*) FROM cursor_rules WHERE is_active = 1;")?,
            active_integrations: count("SELECT COUNT(*) FROM integrations WHERE is_active = 1;")?,
        })
    })
}

fn missing_store_issue(store: &Store) -> String {
    format!("Database file not found: {}", store.path().display())
}

fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name;",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\";"), [], |row| {
        row.get(0)
    })?;
    Ok(u64::try_from(count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::{health_check, validate_data, validate_schema, HealthStatus};
    use crate::db::{DbError, Store};

    #[test]
    fn missing_store_is_unhealthy_and_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path().join("absent.db"));

        let report = health_check(&store);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!store.path().exists());
        assert!(!validate_data(&store).is_valid());
    }

    #[test]
    fn health_check_writes_no_rows_but_applies_journal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path().join("plain.db"));
        store
            .with_write_connection(|tx| {
                tx.execute_batch(
                    "CREATE TABLE workspaces (id INTEGER PRIMARY KEY, name TEXT);
                     INSERT INTO workspaces (name) VALUES ('Acme');",
                )?;
                Ok::<_, DbError>(())
            })
            .unwrap();

        let first = health_check(&store);
        let second = health_check(&store);
        assert_eq!(first.table_counts, second.table_counts);
        assert_eq!(second.table_counts.get("workspaces"), Some(&1));

        let conn = rusqlite::Connection::open(store.path()).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn partial_schema_reports_each_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path().join("partial.db"));
        store
            .with_connection(|tx| {
                tx.execute_batch("CREATE TABLE workspaces (id INTEGER PRIMARY KEY, name TEXT);")?;
                Ok::<_, DbError>(())
            })
            .unwrap();

        let report = validate_schema(&store);
        assert!(report
            .issues
            .iter()
            .any(|issue| issue == "Required table missing: checkpoints"));
        assert!(!report
            .issues
            .iter()
            .any(|issue| issue.ends_with(": workspaces")));
    }
}
