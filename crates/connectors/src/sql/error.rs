use model::records::row::RecordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Driver-level error that is not a recognized conflict.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// Uniqueness / primary-key violation.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// An update by primary key matched no existing row.
    #[error("Stale update: {0}")]
    StaleUpdate(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// MySQL duplicate-entry error codes (ER_DUP_KEY, ER_DUP_ENTRY,
/// ER_DUP_ENTRY_WITH_KEY_NAME).
const DUPLICATE_CODES: [u16; 3] = [1022, 1062, 1586];

/// Server error codes that are typically transient: lock waits, deadlocks,
/// connection-level failures, server going away, too many connections.
/// See: https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html
const RETRYABLE_CODES: [u16; 8] = [1205, 1213, 2002, 2003, 2006, 2013, 1040, 1042];

impl DbError {
    /// Converts a driver error, promoting duplicate-entry server errors to
    /// the dedicated variant so the upsert cascade can branch on them.
    pub fn from_driver(err: mysql_async::Error) -> Self {
        if let mysql_async::Error::Server(server_err) = &err
            && DUPLICATE_CODES.contains(&server_err.code)
        {
            return DbError::DuplicateKey(server_err.message.clone());
        }
        DbError::MySql(err)
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DbError::DuplicateKey(_))
    }

    pub fn is_stale_update(&self) -> bool {
        matches!(self, DbError::StaleUpdate(_))
    }

    /// Server/connection errors worth riding out with the retry back-off.
    /// Everything else is either a classified conflict or fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::MySql(err) => match err {
                mysql_async::Error::Io(_) | mysql_async::Error::Driver(_) => true,
                mysql_async::Error::Server(server_err) => {
                    RETRYABLE_CODES.contains(&server_err.code)
                        || matches!(server_err.state.as_str(), "40001" | "HYT00" | "08S01")
                }
                _ => false,
            },
            _ => false,
        }
    }
}
