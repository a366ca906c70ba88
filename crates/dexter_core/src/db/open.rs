//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Retry failed opens with linear backoff (`100ms * attempt`).
//! - Configure pragmas required for concurrent access.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - File connections run in the configured journal mode (WAL by default).
//! - Writers wait at most `busy_timeout` on a held lock, then fail busy.

use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{error, info, warn};
use rusqlite::Connection;
use std::time::{Duration, Instant};

const OPEN_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Opens the store described by `config`, retrying up to `config.retry_count`
/// extra times.
///
/// # Errors
/// - `DbError::Connection` carrying the last cause once retries are exhausted.
pub fn open_db(config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    let max_attempts = config.retry_count.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = Connection::open(&config.path).and_then(|mut conn| {
            configure_connection(&mut conn, config)?;
            Ok(conn)
        });

        match result {
            Ok(conn) => {
                info!(
                    "event=db_open module=db status=ok mode=file attempt={} duration_ms={}",
                    attempt,
                    started_at.elapsed().as_millis()
                );
                return Ok(conn);
            }
            Err(err) if attempt < max_attempts => {
                let delay = OPEN_BACKOFF_STEP * attempt;
                warn!(
                    "event=db_open module=db status=retry mode=file attempt={} max_attempts={} delay_ms={} error={}",
                    attempt,
                    max_attempts,
                    delay.as_millis(),
                    err
                );
                std::thread::sleep(delay);
            }
            Err(err) => {
                error!(
                    "event=db_open module=db status=error mode=file attempts={} duration_ms={} error_code=db_open_failed error={}",
                    attempt,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(DbError::Connection {
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

/// Opens an in-memory SQLite database with the same pragma setup.
///
/// In-memory stores ignore the WAL request and keep a memory journal.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    let mut conn = Connection::open_in_memory()?;
    configure_connection(&mut conn, &StoreConfig::new(":memory:"))?;
    info!(
        "event=db_open module=db status=ok mode=memory duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn configure_connection(conn: &mut Connection, config: &StoreConfig) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(config.busy_timeout())?;
    let _mode: String = conn.pragma_update_and_check(
        None,
        "journal_mode",
        config.journal_mode.pragma_value(),
        |row| row.get(0),
    )?;
    conn.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
    Ok(())
}
