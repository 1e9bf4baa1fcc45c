//! Read side of a legacy SupportFlow installation.
//!
//! The importer only needs two queries: every thread, and the messages of one
//! thread. [`LegacySource`] exposes exactly that so tests can swap the MySQL
//! reader for an in-memory fixture.

mod mysql;
mod schema;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use supportflow_common::{Error, Result};

pub use mysql::MySqlLegacySource;
pub use schema::{LegacyTable, LegacyTables};

pub const DEFAULT_TABLE_PREFIX: &str = "support_";

const LEGACY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyThread {
    pub id: i64,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub state: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyMessage {
    pub id: i64,
    pub thread_id: i64,
    pub email: String,
    pub date: Option<DateTime<Utc>>,
    /// `note` for internal notes, anything else is a public reply.
    pub message_type: String,
    pub content: String,
}

#[async_trait]
pub trait LegacySource: Send {
    /// Every legacy thread, ordered by legacy id.
    async fn list_threads(&mut self) -> Result<Vec<LegacyThread>>;
    /// Messages of one legacy thread, ordered by legacy id.
    async fn list_messages(&mut self, thread_id: i64) -> Result<Vec<LegacyMessage>>;
}

/// Connection parameters for the legacy database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConnection {
    /// Hostname, optionally with a `:port` suffix.
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub table_prefix: String,
}

impl LegacyConnection {
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("host", &self.host),
            ("database", &self.database),
            ("user", &self.user),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("legacy database {field} is required")));
            }
        }
        validate_prefix(&self.table_prefix)?;
        self.host_and_port().map(|_| ())
    }

    /// Splits `host[:port]`. IPv6 addresses take a port only in the bracketed
    /// `[addr]:port` form; a bare address such as `::1` is returned whole.
    pub fn host_and_port(&self) -> Result<(&str, Option<u16>)> {
        let invalid = || Error::Config(format!("invalid port in legacy host '{}'", self.host));
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid());

        if let Some(rest) = self.host.strip_prefix('[') {
            let (addr, after) = rest.split_once(']').ok_or_else(|| {
                Error::Config(format!("unclosed '[' in legacy host '{}'", self.host))
            })?;
            return match after {
                "" => Ok((addr, None)),
                _ => match after.strip_prefix(':') {
                    Some(port) => Ok((addr, Some(parse_port(port)?))),
                    None => Err(invalid()),
                },
            };
        }

        match self.host.split_once(':') {
            Some((host, port)) if !port.contains(':') => Ok((host, Some(parse_port(port)?))),
            _ => Ok((self.host.as_str(), None)),
        }
    }
}

/// Table prefixes end up inside identifiers, so only word characters are allowed.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "table prefix '{prefix}' may only contain letters, digits and '_'"
        )))
    }
}

/// Parses a legacy `DATETIME` value. The zero date and garbage read as `None`.
pub fn parse_legacy_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), LEGACY_DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
