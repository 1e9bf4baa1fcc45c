pub mod error;
pub mod ticket;
pub mod types;

pub use error::{Error, Result};
pub use ticket::{IMPORT_MARKER_KEY, Message, NewMessage, NewThread, Thread, Visibility};
pub use types::{EntityKind, MessageId, ThreadId};
