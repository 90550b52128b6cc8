//! SQLite schema and connection setup.
//!
//! - `subscription_version` holds one row per SV; at most one row per
//!   `(tn, spid)` may sit in a lineage-holding status at a time
//!   (partial unique index `sv_open_lineage`).
//! - Dependent rows reference `reference_key` through foreign keys that are
//!   `DEFERRABLE INITIALLY DEFERRED`, so a key reassignment may rewrite
//!   dependents before the replacement SV row exists. An orphan still fails
//!   the commit.
//! - `key_sequence` issues reference, message and range keys; values are
//!   never reused, even after the owning row is deleted.

use crate::correlation::StoreError;
use lnp_kernel::StoreConfig;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::time::Duration;

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS key_sequence (
    space      TEXT PRIMARY KEY,
    last_value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS subscription_version (
    reference_key               INTEGER PRIMARY KEY,
    tn                          TEXT NOT NULL,
    spid                        TEXT NOT NULL,
    onsp                        TEXT,
    nnsp                        TEXT,
    status                      TEXT NOT NULL,
    last_request_type           TEXT,
    object_id                   INTEGER,
    region                      INTEGER,
    attr_invoke_id              INTEGER,
    attr_sent_at                TEXT,
    status_invoke_id            INTEGER,
    status_sent_at              TEXT,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL,
    activated_at                TEXT,
    disconnected_at             TEXT,
    canceled_at                 TEXT,
    old_sp_conflict_resolved_at TEXT,
    new_sp_conflict_resolved_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS sv_open_lineage
    ON subscription_version (tn, spid)
    WHERE status NOT IN ('active', 'old', 'canceled');

CREATE INDEX IF NOT EXISTS sv_tn_spid ON subscription_version (tn, spid, reference_key);

CREATE INDEX IF NOT EXISTS sv_object_id ON subscription_version (object_id, spid, region);

CREATE TABLE IF NOT EXISTS message (
    message_key   INTEGER PRIMARY KEY,
    reference_key INTEGER REFERENCES subscription_version (reference_key)
                  DEFERRABLE INITIALLY DEFERRED,
    request_type  TEXT NOT NULL,
    tns           TEXT NOT NULL,
    body          TEXT NOT NULL,
    queue_status  TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS message_reference ON message (reference_key);

CREATE TABLE IF NOT EXISTS range_group (
    range_key    INTEGER PRIMARY KEY,
    request_type TEXT NOT NULL,
    message_key  INTEGER NOT NULL REFERENCES message (message_key)
                 DEFERRABLE INITIALLY DEFERRED,
    tn_range     TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS range_member (
    range_key     INTEGER NOT NULL REFERENCES range_group (range_key)
                  DEFERRABLE INITIALLY DEFERRED,
    reference_key INTEGER NOT NULL REFERENCES subscription_version (reference_key)
                  DEFERRABLE INITIALLY DEFERRED,
    PRIMARY KEY (range_key, reference_key)
);

CREATE INDEX IF NOT EXISTS range_member_reference ON range_member (reference_key);

CREATE TABLE IF NOT EXISTS pending_attribute_snapshot (
    snapshot_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    reference_key INTEGER NOT NULL REFERENCES subscription_version (reference_key)
                  DEFERRABLE INITIALLY DEFERRED,
    spid          TEXT NOT NULL,
    request_type  TEXT NOT NULL,
    attributes    TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS snapshot_reference ON pending_attribute_snapshot (reference_key);

CREATE TABLE IF NOT EXISTS request_queue (
    queue_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    message_key  INTEGER NOT NULL REFERENCES message (message_key)
                 DEFERRABLE INITIALLY DEFERRED,
    request_type TEXT NOT NULL,
    body         TEXT NOT NULL,
    enqueued_at  TEXT NOT NULL
);
"#;

/// Open (and create if needed) a store database file.
pub fn open_connection(
    path: impl AsRef<Path>,
    config: &StoreConfig,
) -> Result<Connection, StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Io(format!("{}: {e}", parent.display())))?;
    }
    let mut connection = Connection::open(path)?;
    apply_pragmas(&connection, config)?;
    initialize_schema(&mut connection)?;
    Ok(connection)
}

pub fn open_in_memory(config: &StoreConfig) -> Result<Connection, StoreError> {
    let mut connection = Connection::open_in_memory()?;
    apply_pragmas(&connection, config)?;
    initialize_schema(&mut connection)?;
    Ok(connection)
}

fn apply_pragmas(connection: &Connection, config: &StoreConfig) -> Result<(), StoreError> {
    connection.pragma_update(None, "foreign_keys", true)?;
    let mode: String = connection.pragma_update_and_check(
        None,
        "journal_mode",
        config.journal_mode.pragma_value(),
        |row| row.get(0),
    )?;
    tracing::debug!(journal_mode = %mode, "store journal mode set");
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
            row.get(0)
        })
        .optional()?;
    match version {
        None => {
            tx.execute_batch(SCHEMA)?;
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(StoreError::Corrupt(format!(
                "unsupported store schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_initializes_once() {
        let connection = open_in_memory(&StoreConfig::default()).expect("store should open");
        let tables: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('subscription_version', 'message', 'range_group', 'range_member', \
                  'pending_attribute_snapshot', 'request_queue', 'key_sequence')",
                params![],
                |row| row.get(0),
            )
            .expect("table count should query");
        assert_eq!(tables, 7);

        let foreign_keys: i64 = connection
            .query_row("PRAGMA foreign_keys", params![], |row| row.get(0))
            .expect("pragma should query");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let mut connection = Connection::open_in_memory().expect("connection should open");
        connection
            .execute_batch(
                "CREATE TABLE store_meta (version INTEGER NOT NULL);
                 INSERT INTO store_meta (version) VALUES (99);",
            )
            .expect("fixture schema should apply");
        assert!(matches!(
            initialize_schema(&mut connection),
            Err(StoreError::Corrupt(_))
        ));
    }
}
