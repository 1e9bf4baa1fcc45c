use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use supportflow_common::{
    EntityKind, Error, Message, MessageId, NewMessage, NewThread, Result, Thread, ThreadId,
    Visibility,
};
use tracing::{debug, info};

use crate::migrations;

/// Width of the status column in the original post table.
const MAX_STATUS_LEN: usize = 20;

/// Thread row plus the aggregates shown when listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread: Thread,
    pub respondents: Vec<String>,
    pub message_count: usize,
}

/// Capabilities the importer and the CLI need from the local ticketing system.
pub trait TicketStore: Send + Sync {
    fn create_thread(&self, thread: &NewThread) -> Result<ThreadId>;
    /// Replaces the respondent set with the addresses in `contacts` (comma separated).
    fn set_thread_respondents(&self, thread_id: ThreadId, contacts: &str) -> Result<Vec<String>>;
    fn add_message(
        &self,
        thread_id: ThreadId,
        content: &str,
        message: &NewMessage,
    ) -> Result<MessageId>;
    fn set_marker(&self, kind: EntityKind, entity_id: i64, key: &str, value: &str) -> Result<()>;
    fn find_by_marker(&self, kind: EntityKind, key: &str, value: &str) -> Result<Option<i64>>;
    /// Removes a thread together with its respondents, messages and markers.
    fn delete_thread(&self, thread_id: ThreadId) -> Result<()>;
    fn list_threads(&self, status: Option<&str>) -> Result<Vec<ThreadSummary>>;
    fn thread_messages(&self, thread_id: ThreadId) -> Result<Vec<Message>>;
    fn thread_respondents(&self, thread_id: ThreadId) -> Result<Vec<String>>;
}

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening ticket store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.connection()?;
        migrations::apply(&conn)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("ticket database lock poisoned".into()))
    }

    fn thread_exists(conn: &Connection, thread_id: ThreadId) -> Result<bool> {
        conn.query_row(
            "SELECT 1 FROM threads WHERE id = ?",
            params![thread_id.get()],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .map_err(|e| Error::Database(format!("failed to look up thread {thread_id}: {e}")))
    }
}

impl TicketStore for SqliteTicketStore {
    fn create_thread(&self, thread: &NewThread) -> Result<ThreadId> {
        validate_status(&thread.status)?;

        let created_at = thread.created_at.unwrap_or_else(Utc::now).to_rfc3339();
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO threads (subject, status, created_at) VALUES (?, ?, ?)",
            params![thread.subject, thread.status, created_at],
        )
        .map_err(|e| Error::ThreadCreation(format!("failed to insert thread: {e}")))?;

        let id = ThreadId::from_raw(conn.last_insert_rowid());
        debug!("created thread {id} with status {}", thread.status);
        Ok(id)
    }

    fn set_thread_respondents(&self, thread_id: ThreadId, contacts: &str) -> Result<Vec<String>> {
        let respondents = parse_respondents(contacts);

        let mut conn = self.connection()?;
        if !Self::thread_exists(&conn, thread_id)? {
            return Err(Error::NotFound(format!("thread {thread_id}")));
        }

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        tx.execute(
            "DELETE FROM thread_respondents WHERE thread_id = ?",
            params![thread_id.get()],
        )
        .map_err(|e| Error::Database(format!("failed to clear respondents: {e}")))?;
        for email in &respondents {
            tx.execute(
                "INSERT INTO thread_respondents (thread_id, email) VALUES (?, ?)",
                params![thread_id.get(), email],
            )
            .map_err(|e| Error::Database(format!("failed to add respondent {email}: {e}")))?;
        }
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit respondents: {e}")))?;

        Ok(respondents)
    }

    fn add_message(
        &self,
        thread_id: ThreadId,
        content: &str,
        message: &NewMessage,
    ) -> Result<MessageId> {
        let created_at = message.created_at.unwrap_or_else(Utc::now).to_rfc3339();
        let conn = self.connection()?;
        if !Self::thread_exists(&conn, thread_id)? {
            return Err(Error::MessageCreation(format!(
                "thread {thread_id} does not exist"
            )));
        }

        conn.execute(
            "INSERT INTO messages (thread_id, author, author_email, visibility, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                thread_id.get(),
                message.author,
                message.author_email,
                message.visibility.as_str(),
                content,
                created_at,
            ],
        )
        .map_err(|e| Error::MessageCreation(format!("failed to insert message: {e}")))?;

        Ok(MessageId::from_raw(conn.last_insert_rowid()))
    }

    fn set_marker(&self, kind: EntityKind, entity_id: i64, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO markers (entity_kind, entity_id, meta_key, meta_value)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(entity_kind, entity_id, meta_key)
             DO UPDATE SET meta_value = excluded.meta_value",
            params![kind.as_str(), entity_id, key, value],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Database(format!(
                    "{key}={value} is already assigned to another {kind}"
                ))
            }
            other => Error::Database(format!("failed to set marker {key}: {other}")),
        })?;

        Ok(())
    }

    fn find_by_marker(&self, kind: EntityKind, key: &str, value: &str) -> Result<Option<i64>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT entity_id FROM markers
             WHERE entity_kind = ? AND meta_key = ? AND meta_value = ?",
            params![kind.as_str(), key, value],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to look up marker {key}: {e}")))
    }

    fn delete_thread(&self, thread_id: ThreadId) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        tx.execute(
            "DELETE FROM markers WHERE entity_kind = ?
               AND entity_id IN (SELECT id FROM messages WHERE thread_id = ?)",
            params![EntityKind::Message.as_str(), thread_id.get()],
        )
        .map_err(|e| Error::Database(format!("failed to clear message markers: {e}")))?;
        tx.execute(
            "DELETE FROM markers WHERE entity_kind = ? AND entity_id = ?",
            params![EntityKind::Thread.as_str(), thread_id.get()],
        )
        .map_err(|e| Error::Database(format!("failed to clear thread markers: {e}")))?;
        tx.execute(
            "DELETE FROM messages WHERE thread_id = ?",
            params![thread_id.get()],
        )
        .map_err(|e| Error::Database(format!("failed to delete messages: {e}")))?;
        tx.execute(
            "DELETE FROM thread_respondents WHERE thread_id = ?",
            params![thread_id.get()],
        )
        .map_err(|e| Error::Database(format!("failed to delete respondents: {e}")))?;
        let deleted = tx
            .execute("DELETE FROM threads WHERE id = ?", params![thread_id.get()])
            .map_err(|e| Error::Database(format!("failed to delete thread: {e}")))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit thread deletion: {e}")))?;

        if deleted == 0 {
            return Err(Error::NotFound(format!("thread {thread_id}")));
        }
        debug!("deleted thread {thread_id}");
        Ok(())
    }

    fn list_threads(&self, status: Option<&str>) -> Result<Vec<ThreadSummary>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT t.id, t.subject, t.status, t.created_at,
                        (SELECT count(*) FROM messages m WHERE m.thread_id = t.id),
                        (SELECT group_concat(email, ',') FROM
                            (SELECT email FROM thread_respondents r
                             WHERE r.thread_id = t.id ORDER BY email))
                 FROM threads t
                 WHERE (?1 IS NULL OR t.status = ?1)
                 ORDER BY t.id",
            )
            .map_err(|e| Error::Database(format!("failed to prepare thread listing: {e}")))?;

        let rows = stmt
            .query_map(params![status], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .map_err(|e| Error::Database(format!("failed to list threads: {e}")))?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, subject, status, created_at, count, respondents) =
                row.map_err(|e| Error::Database(format!("failed to read thread row: {e}")))?;
            summaries.push(ThreadSummary {
                thread: Thread {
                    id: ThreadId::from_raw(id),
                    subject,
                    status,
                    created_at: parse_timestamp(&created_at)?,
                },
                respondents: respondents
                    .map(|r| r.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
                message_count: count as usize,
            });
        }

        Ok(summaries)
    }

    fn thread_messages(&self, thread_id: ThreadId) -> Result<Vec<Message>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, author, author_email, visibility, content, created_at
                 FROM messages WHERE thread_id = ? ORDER BY id",
            )
            .map_err(|e| Error::Database(format!("failed to prepare message query: {e}")))?;

        let rows = stmt
            .query_map(params![thread_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| Error::Database(format!("failed to query messages: {e}")))?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, author, author_email, visibility, content, created_at) =
                row.map_err(|e| Error::Database(format!("failed to read message row: {e}")))?;
            messages.push(Message {
                id: MessageId::from_raw(id),
                thread_id,
                author,
                author_email,
                visibility: Visibility::from_db(&visibility)?,
                content,
                created_at: parse_timestamp(&created_at)?,
            });
        }

        Ok(messages)
    }

    fn thread_respondents(&self, thread_id: ThreadId) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT email FROM thread_respondents WHERE thread_id = ? ORDER BY email")
            .map_err(|e| Error::Database(format!("failed to prepare respondent query: {e}")))?;

        let rows = stmt
            .query_map(params![thread_id.get()], |row| row.get::<_, String>(0))
            .map_err(|e| Error::Database(format!("failed to query respondents: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to read respondent row: {e}")))
    }
}

fn validate_status(status: &str) -> Result<()> {
    if status.is_empty() {
        return Err(Error::ThreadCreation("status cannot be empty".into()));
    }
    if status.chars().count() > MAX_STATUS_LEN {
        return Err(Error::ThreadCreation(format!(
            "status '{status}' is longer than {MAX_STATUS_LEN} characters"
        )));
    }
    if !status
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(Error::ThreadCreation(format!(
            "status '{status}' may only contain a-z, 0-9, '_' and '-'"
        )));
    }
    Ok(())
}

/// Normalises a comma-separated contact list into a sorted, de-duplicated address set.
pub fn parse_respondents(contacts: &str) -> Vec<String> {
    let mut emails: Vec<String> = contacts
        .split(',')
        .map(|c| c.trim().to_lowercase())
        .filter(|c| c.contains('@'))
        .collect();
    emails.sort();
    emails.dedup();
    emails
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("invalid stored timestamp '{value}': {e}")))
}
