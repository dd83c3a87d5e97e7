use thiserror::Error;

#[derive(Error, Debug)]
pub enum RivuletError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Feed not found: {0}")]
    UnresolvedFeedReference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl RivuletError {
    /// SQLite reports an interrupted statement as a generic failure; the
    /// store calls this to tell a cancellation apart from a storage error.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                Self::Cancelled
            }
            _ => Self::Database(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, RivuletError>;
