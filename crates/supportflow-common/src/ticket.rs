use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{MessageId, ThreadId};

/// Marker key linking a record to the legacy record it was imported from.
pub const IMPORT_MARKER_KEY: &str = "_imported_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub subject: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a thread before the store assigns its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewThread {
    pub subject: String,
    pub status: String,
    /// Defaults to now when absent.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub author: String,
    pub author_email: String,
    pub visibility: Visibility,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub author: String,
    pub author_email: String,
    pub visibility: Visibility,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    /// Internal note, never shown to the respondent.
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(Error::Database(format!("unknown message visibility: {other}"))),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
