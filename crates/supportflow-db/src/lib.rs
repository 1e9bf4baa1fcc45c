pub mod legacy;
pub mod migrations;
pub mod ticket_store;

pub use legacy::{
    LegacyConnection, LegacyMessage, LegacySource, LegacyTable, LegacyTables, LegacyThread,
    MySqlLegacySource,
};
pub use ticket_store::{SqliteTicketStore, ThreadSummary, TicketStore};
