//! Error types for SQLite operations.

use quarry_query::error::{ErrorCode, QueryError};
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Blocking task failure.
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Sqlite(e) => {
                QueryError::command(format!("SQLite command failed: {}", e)).with_source(e)
            }
            SqliteError::Config(msg) => QueryError::configuration(format!("sqlite: {}", msg)),
            SqliteError::Connection(msg) => QueryError::resource(ErrorCode::ConnectionFailed, msg),
            SqliteError::Task(e) => {
                QueryError::resource(ErrorCode::ReaderFailed, format!("SQLite task failed: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn test_error_conversion() {
        let err: QueryError = SqliteError::connection("database is locked").into();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert!(err.is_resource_error());

        let err: QueryError = SqliteError::from(rusqlite::Error::InvalidQuery).into();
        assert_eq!(err.code, ErrorCode::CommandFailed);
    }
}
