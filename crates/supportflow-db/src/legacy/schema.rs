use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use supportflow_common::{Error, Result};
use tracing::warn;

use super::validate_prefix;

/// Tables a legacy installation ships with.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum LegacyTable {
    MessageMeta,
    Messages,
    PredefinedMessages,
    Tags,
    ThreadMeta,
    Threads,
    UserMeta,
    Users,
}

impl LegacyTable {
    pub const ALL: [LegacyTable; 8] = [
        Self::MessageMeta,
        Self::Messages,
        Self::PredefinedMessages,
        Self::Tags,
        Self::ThreadMeta,
        Self::Threads,
        Self::UserMeta,
        Self::Users,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::MessageMeta => "messagemeta",
            Self::Messages => "messages",
            Self::PredefinedMessages => "predefined_messages",
            Self::Tags => "tags",
            Self::ThreadMeta => "threadmeta",
            Self::Threads => "threads",
            Self::UserMeta => "usermeta",
            Self::Users => "users",
        }
    }

    /// Columns the importer reads. Empty for tables it does not touch.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Threads => &["thread_id", "subject", "dt", "state", "email"],
            Self::Messages => &[
                "message_id",
                "thread_id",
                "email",
                "dt",
                "message_type",
                "content",
            ],
            _ => &[],
        }
    }

    pub fn is_required(&self) -> bool {
        !self.required_columns().is_empty()
    }
}

impl fmt::Display for LegacyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Resolved, validated table names for one legacy installation.
#[derive(Debug, Clone)]
pub struct LegacyTables {
    prefix: String,
    names: BTreeMap<LegacyTable, String>,
}

impl LegacyTables {
    /// Builds the mapping from the `table -> columns` listing of the legacy schema.
    ///
    /// Missing `threads`/`messages` tables or columns are query errors; missing
    /// sibling tables are only logged.
    pub fn resolve(prefix: &str, discovered: &BTreeMap<String, BTreeSet<String>>) -> Result<Self> {
        validate_prefix(prefix)?;

        let mut names = BTreeMap::new();
        for table in LegacyTable::ALL {
            let name = format!("{prefix}{}", table.suffix());
            let Some(columns) = discovered.get(&name) else {
                if table.is_required() {
                    return Err(Error::Query(format!(
                        "table '{name}' not found (is the table prefix '{prefix}' correct?)"
                    )));
                }
                warn!("legacy table '{name}' not found, ignoring");
                continue;
            };

            let missing: Vec<&str> = table
                .required_columns()
                .iter()
                .copied()
                .filter(|col| !columns.contains(*col))
                .collect();
            if !missing.is_empty() {
                return Err(Error::Query(format!(
                    "table '{name}' is missing column(s): {}",
                    missing.join(", ")
                )));
            }

            names.insert(table, name);
        }

        Ok(Self {
            prefix: prefix.to_string(),
            names,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self, table: LegacyTable) -> Option<&str> {
        self.names.get(&table).map(String::as_str)
    }

    /// Backtick-quoted name of a table `resolve` guarantees to exist.
    pub(crate) fn quoted(&self, table: LegacyTable) -> Result<String> {
        self.name(table)
            .map(|name| format!("`{name}`"))
            .ok_or_else(|| Error::Query(format!("legacy table '{table}' is not available")))
    }
}

#[cfg(test)]
mod tests {
    use super::{LegacyTable, LegacyTables};
    use std::collections::{BTreeMap, BTreeSet};
    use supportflow_common::Error;

    fn columns(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn full_schema(prefix: &str) -> BTreeMap<String, BTreeSet<String>> {
        let mut schema = BTreeMap::new();
        for table in LegacyTable::ALL {
            let mut cols = columns(table.required_columns());
            cols.insert("extra".to_string());
            schema.insert(format!("{prefix}{}", table.suffix()), cols);
        }
        schema
    }

    #[test]
    fn resolves_every_table_under_prefix() {
        let tables = LegacyTables::resolve("support_", &full_schema("support_")).expect("resolve");
        assert_eq!(tables.prefix(), "support_");
        assert_eq!(tables.name(LegacyTable::Threads), Some("support_threads"));
        assert_eq!(
            tables.name(LegacyTable::PredefinedMessages),
            Some("support_predefined_messages")
        );
        assert_eq!(
            tables.quoted(LegacyTable::Messages).unwrap(),
            "`support_messages`"
        );
    }

    #[test]
    fn missing_threads_table_is_a_query_error() {
        let err = LegacyTables::resolve("sp_", &full_schema("support_")).expect_err("wrong prefix");
        assert!(matches!(err, Error::Query(_)));
        assert!(err.to_string().contains("sp_messages") || err.to_string().contains("sp_threads"));
    }

    #[test]
    fn missing_sibling_tables_are_tolerated() {
        let mut schema = full_schema("support_");
        schema.remove("support_tags");
        schema.remove("support_usermeta");

        let tables = LegacyTables::resolve("support_", &schema).expect("resolve");
        assert_eq!(tables.name(LegacyTable::Tags), None);
        assert!(tables.quoted(LegacyTable::Tags).is_err());
        assert!(tables.name(LegacyTable::Threads).is_some());
    }

    #[test]
    fn missing_required_column_is_reported() {
        let mut schema = full_schema("support_");
        schema.insert(
            "support_messages".to_string(),
            columns(&["message_id", "thread_id", "email", "dt", "content"]),
        );

        let err = LegacyTables::resolve("support_", &schema).expect_err("missing column");
        assert!(err.to_string().contains("message_type"));
    }
}
