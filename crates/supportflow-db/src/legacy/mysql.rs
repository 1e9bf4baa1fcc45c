use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::{Connection, MySqlConnection, Row};
use supportflow_common::{Error, Result};
use tracing::{debug, info};

use super::schema::{LegacyTable, LegacyTables};
use super::{LegacyConnection, LegacyMessage, LegacySource, LegacyThread, parse_legacy_datetime};

/// Legacy reader over a single MySQL connection held for the whole batch.
pub struct MySqlLegacySource {
    conn: MySqlConnection,
    tables: LegacyTables,
}

impl MySqlLegacySource {
    pub async fn connect(params: &LegacyConnection) -> Result<Self> {
        params.validate()?;
        let (host, port) = params.host_and_port()?;

        let mut options = MySqlConnectOptions::new()
            .host(host)
            .database(&params.database)
            .username(&params.user)
            .password(&params.password);
        if let Some(port) = port {
            options = options.port(port);
        }

        info!(
            "connecting to legacy database {} on {}",
            params.database, params.host
        );
        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| Error::Connection(format!("failed to connect to {}: {e}", params.host)))?;

        let discovered = discover_schema(&mut conn, &params.table_prefix).await?;
        let tables = LegacyTables::resolve(&params.table_prefix, &discovered)?;
        debug!("resolved legacy tables with prefix '{}'", tables.prefix());

        Ok(Self { conn, tables })
    }

    pub async fn close(self) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| Error::Connection(format!("failed to close legacy connection: {e}")))
    }
}

#[async_trait]
impl LegacySource for MySqlLegacySource {
    async fn list_threads(&mut self) -> Result<Vec<LegacyThread>> {
        let sql = format!(
            "SELECT CAST(thread_id AS SIGNED) AS thread_id, subject,
                    CAST(dt AS CHAR) AS dt, state, email
             FROM {} ORDER BY thread_id",
            self.tables.quoted(LegacyTable::Threads)?
        );

        let rows = sqlx::query(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| Error::Query(format!("failed to list legacy threads: {e}")))?;
        debug!("read {} legacy threads", rows.len());

        rows.iter().map(thread_from_row).collect()
    }

    async fn list_messages(&mut self, thread_id: i64) -> Result<Vec<LegacyMessage>> {
        let sql = format!(
            "SELECT CAST(message_id AS SIGNED) AS message_id,
                    CAST(thread_id AS SIGNED) AS thread_id, email,
                    CAST(dt AS CHAR) AS dt, message_type, content
             FROM {} WHERE thread_id = ? ORDER BY message_id",
            self.tables.quoted(LegacyTable::Messages)?
        );

        let rows = sqlx::query(&sql)
            .bind(thread_id)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| {
                Error::Query(format!(
                    "failed to list messages of legacy thread {thread_id}: {e}"
                ))
            })?;

        rows.iter().map(message_from_row).collect()
    }
}

async fn discover_schema(
    conn: &mut MySqlConnection,
    prefix: &str,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let rows = sqlx::query(
        "SELECT CAST(TABLE_NAME AS CHAR) AS table_name, CAST(COLUMN_NAME AS CHAR) AS column_name
         FROM information_schema.COLUMNS
         WHERE TABLE_SCHEMA = DATABASE() AND LEFT(TABLE_NAME, CHAR_LENGTH(?)) = ?",
    )
    .bind(prefix)
    .bind(prefix)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| Error::Query(format!("failed to read legacy schema: {e}")))?;

    let mut schema: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in &rows {
        let table: String = get(row, "table_name")?;
        let column: String = get(row, "column_name")?;
        schema.entry(table).or_default().insert(column.to_lowercase());
    }
    Ok(schema)
}

fn thread_from_row(row: &MySqlRow) -> Result<LegacyThread> {
    Ok(LegacyThread {
        id: get(row, "thread_id")?,
        subject: text(row, "subject")?,
        date: parse_legacy_datetime(&text(row, "dt")?),
        state: text(row, "state")?,
        email: text(row, "email")?,
    })
}

fn message_from_row(row: &MySqlRow) -> Result<LegacyMessage> {
    Ok(LegacyMessage {
        id: get(row, "message_id")?,
        thread_id: get(row, "thread_id")?,
        email: text(row, "email")?,
        date: parse_legacy_datetime(&text(row, "dt")?),
        message_type: text(row, "message_type")?,
        content: text(row, "content")?,
    })
}

fn get<'r, T>(row: &'r MySqlRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get(column)
        .map_err(|e| Error::Query(format!("failed to read column '{column}': {e}")))
}

/// Nullable text column, NULL reads as empty.
fn text(row: &MySqlRow, column: &str) -> Result<String> {
    get::<Option<String>>(row, column).map(Option::unwrap_or_default)
}
