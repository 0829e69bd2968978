//! Schema steps for the campaign database.
//!
//! Each step runs in its own transaction together with the row that records
//! it in `_migrations`, so a failed step leaves no trace. A step that only
//! adds a column is recorded without running when the column is already
//! present (a fresh `001` may already carry it).

use rusqlite::{params, Connection, OptionalExtension};

use super::error::DatabaseError;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// `(table, column)` this step adds, if that is all it does.
    adds_column: Option<(&'static str, &'static str)>,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "create_campaigns_table",
        sql: include_str!("sql/001_create_campaigns.sql"),
        adds_column: None,
    },
    SchemaStep {
        version: 2,
        name: "add_target_audience_to_campaigns",
        sql: include_str!("sql/002_add_target_audience.sql"),
        adds_column: Some(("campaigns", "target_audience")),
    },
];

/// Latest schema version this build knows about.
pub fn latest_version() -> u32 {
    STEPS.last().map(|s| s.version).unwrap_or(0)
}

/// Highest recorded schema version, 0 for a blank database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_migrations'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    if table.is_none() {
        return Ok(0);
    }
    let version = conn.query_row("SELECT IFNULL(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;
    Ok(version)
}

/// Brings the schema up to [`latest_version`].
pub fn apply_pending(conn: &mut Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );",
    )?;

    let from = current_version(conn)?;
    for step in STEPS.iter().filter(|s| s.version > from) {
        let tx = conn.transaction()?;

        let skip = match step.adds_column {
            Some((table, column)) => has_column(&tx, table, column)?,
            None => false,
        };
        if skip {
            log::debug!("Schema step {} already satisfied", step.name);
        } else {
            log::info!("Applying schema step v{} ({})", step.version, step.name);
            tx.execute_batch(step.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: step.version,
                    reason: e.to_string(),
                })?;
        }

        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![step.version, step.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
