use rusqlite::{Connection, params};
use supportflow_common::{Error, Result};
use tracing::debug;

/// Migration system for tracking and applying database schema changes.
///
/// Each migration has a version number and a SQL statement.
/// Migrations are applied in order and tracked in a `_migrations` table.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const TICKET_SCHEMA_V1: Migration = Migration {
    version: 1,
    name: "ticket_schema",
    sql: "CREATE TABLE IF NOT EXISTS threads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS thread_respondents (
            thread_id INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            email TEXT NOT NULL,
            PRIMARY KEY (thread_id, email)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            author TEXT NOT NULL,
            author_email TEXT NOT NULL,
            visibility TEXT NOT NULL CHECK (visibility IN ('public', 'private')),
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages(thread_id, id);

        CREATE TABLE IF NOT EXISTS markers (
            entity_kind TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            meta_key TEXT NOT NULL,
            meta_value TEXT NOT NULL,
            PRIMARY KEY (entity_kind, entity_id, meta_key)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_markers_lookup
            ON markers(entity_kind, meta_key, meta_value);",
};

pub const MIGRATIONS: &[Migration] = &[TICKET_SCHEMA_V1];

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| Error::Database(format!("failed to create migrations table: {e}")))?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        debug!("applying migration {} ({})", migration.version, migration.name);
        conn.execute_batch(migration.sql).map_err(|e| {
            Error::Database(format!("migration {} failed: {e}", migration.name))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?, ?)",
            params![migration.version, migration.name],
        )
        .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MIGRATIONS, apply};
    use rusqlite::Connection;

    #[test]
    fn apply_is_idempotent_and_records_versions() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply(&conn).expect("first apply");
        apply(&conn).expect("second apply");

        let recorded: i64 = conn
            .query_row("SELECT count(*) FROM _migrations", [], |row| row.get(0))
            .expect("count migrations");
        assert_eq!(recorded, MIGRATIONS.len() as i64);
    }
}
