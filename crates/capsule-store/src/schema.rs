use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, during};

pub const SCHEMA_VERSION: i64 = 1;

/// Create the capsule table and its indexes if missing. Idempotent: every
/// statement is `IF NOT EXISTS`, so concurrent processes may race here.
pub fn initialize(conn: &Connection) -> Result<()> {
    // busy_timeout first so the remaining statements wait out a racing writer
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(during("initialize"))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(during("initialize"))?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS capsules (
            id                 TEXT PRIMARY KEY,
            title              TEXT NOT NULL,
            content            TEXT,
            tags               TEXT NOT NULL DEFAULT '[]',
            source_university  TEXT,
            source_author      TEXT,
            source_date        TEXT,
            source_url         TEXT,
            datm_truth         REAL NOT NULL DEFAULT 0.5,
            datm_goodness      REAL NOT NULL DEFAULT 0.5,
            datm_beauty        REAL NOT NULL DEFAULT 0.5,
            datm_intelligence  REAL NOT NULL DEFAULT 0.5,
            created_at         TEXT NOT NULL,
            version            INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_capsules_tags ON capsules(tags);
        CREATE INDEX IF NOT EXISTS idx_capsules_university ON capsules(source_university);
        CREATE INDEX IF NOT EXISTS idx_capsules_created_at ON capsules(created_at);
        ",
    )
    .map_err(during("initialize"))?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )
    .map_err(during("initialize"))?;

    tracing::debug!("capsule schema v{SCHEMA_VERSION} ready");
    Ok(())
}

/// Stored schema version, `None` when the metadata table has no version row.
pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(during("read schema version"))?;
    raw.map(|v| v.parse::<i64>().map_err(during("read schema version")))
        .transpose()
}
