use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    /// The legacy source could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// A legacy table or column is missing, or a legacy query failed.
    #[error("query error: {0}")]
    Query(String),

    #[error("thread creation failed: {0}")]
    ThreadCreation(String),

    #[error("message creation failed: {0}")]
    MessageCreation(String),

    /// Failure reported by the email replies service, message kept verbatim.
    #[error("{0}")]
    EmailReplies(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Errors that abort an import batch instead of skipping one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Query(_) | Self::Config(_))
    }
}
