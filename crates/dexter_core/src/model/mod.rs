//! Typed records for every persisted entity.
//!
//! # Responsibility
//! - Replace untyped row maps with one struct per table.
//! - Own the string forms of stored enums (status, pattern/state type).
//!
//! # Invariants
//! - Rows are keyed by opaque SQLite integer ids.
//! - `workspace_id = None` means the row is global, never "any workspace".
//! - Timestamps are Unix epoch milliseconds.

pub mod action;
pub mod agent;
pub mod workspace;

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
