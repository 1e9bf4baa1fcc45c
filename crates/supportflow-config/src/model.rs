use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_TABLE_PREFIX: &str = "support_";
pub const DEFAULT_STATUS_PREFIX: &str = "imported_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub import: ImportConfig,

    /// Connection details that replace the command-line values when set.
    #[serde(default)]
    pub imap: ImapConfig,

    #[serde(default)]
    pub email_replies: EmailRepliesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: Some("info".to_string()),
            store: StoreConfig::default(),
            import: ImportConfig::default(),
            imap: ImapConfig::default(),
            email_replies: EmailRepliesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file backing the ticket store.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    #[serde(default = "default_status_prefix")]
    pub status_prefix: String,

    #[serde(default)]
    pub strip_quoted_replies: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            table_prefix: default_table_prefix(),
            status_prefix: default_status_prefix(),
            strip_quoted_replies: false,
        }
    }
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_status_prefix() -> String {
    DEFAULT_STATUS_PREFIX.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImapConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub inbox: Option<String>,
    pub archive: Option<String>,
}

/// External command that fetches and appends email replies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRepliesConfig {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}
