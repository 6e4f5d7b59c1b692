//! A [`CommandExecutor`] over one `rusqlite` connection.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use rusqlite::{Connection, params_from_iter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use quarry_query::error::{QueryError, QueryResult};
use quarry_query::executor::{CommandExecutor, RowIter, RowStream};
use quarry_query::sql::BoundCommand;
use quarry_query::value::Row;

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::types::{from_sqlite, to_sqlite};

/// Executes bound commands on a shared SQLite connection.
///
/// Commands are serialized on the connection. Rows are read to the end
/// before they are handed out, so no statement outlives a call.
#[derive(Clone)]
pub struct SqliteExecutor {
    conn: Arc<Mutex<Connection>>,
    config: Arc<SqliteConfig>,
}

impl SqliteExecutor {
    /// Open the database described by `config`.
    pub fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = config.open()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        })
    }

    /// Open a fresh in-memory database.
    pub fn memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory())
    }

    /// The configuration the database was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> SqliteResult<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(SqliteError::from)
    }

    /// Run a batch of statements, e.g. a schema script.
    pub fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        self.with_connection(|conn| conn.execute_batch(sql))
    }

    fn query(conn: &Connection, command: &BoundCommand) -> SqliteResult<Vec<Row>> {
        let mut stmt = conn.prepare_cached(&command.sql)?;
        let width = stmt.column_count();
        let params = params_from_iter(command.parameters.iter().map(to_sqlite));
        let mut rows = stmt.query(params)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(from_sqlite(row.get_ref(index)?));
            }
            result.push(values);
        }
        Ok(result)
    }
}

#[async_trait]
impl CommandExecutor for SqliteExecutor {
    fn execute(&self, command: &BoundCommand) -> QueryResult<RowIter> {
        debug!(sql = %command.sql, parameters = command.parameters.len(), "sqlite execute");
        let rows = Self::query(&self.conn.lock(), command)?;
        trace!(rows = rows.len(), "sqlite rows read");
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    async fn execute_async(&self, command: &BoundCommand, cancel: &CancellationToken) -> QueryResult<RowStream> {
        if cancel.is_cancelled() {
            return Err(QueryError::cancelled());
        }
        debug!(sql = %command.sql, parameters = command.parameters.len(), "sqlite execute async");

        let conn = self.conn.clone();
        let command = command.clone();
        let task = tokio::task::spawn_blocking(move || Self::query(&conn.lock(), &command));
        let rows = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueryError::cancelled()),
            joined = task => joined.map_err(SqliteError::from)??,
        };
        trace!(rows = rows.len(), "sqlite rows read");
        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

impl fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("path", &self.config.path_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;
    use quarry_query::error::ErrorCode;
    use quarry_query::value::Value;

    fn executor() -> SqliteExecutor {
        let executor = SqliteExecutor::memory().unwrap();
        executor
            .execute_batch(
                "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL);
                 INSERT INTO items VALUES (1, 'pen', 1.5), (2, 'ink', NULL);",
            )
            .unwrap();
        executor
    }

    fn command(sql: &str, parameters: Vec<Value>) -> BoundCommand {
        BoundCommand {
            sql: sql.to_string(),
            parameters,
        }
    }

    #[test]
    fn test_execute_binds_parameters() {
        let rows: Vec<Row> = executor()
            .execute(&command("SELECT id, name, price FROM items WHERE id > ?", vec![Value::Int(0)]))
            .unwrap()
            .collect::<QueryResult<_>>()
            .unwrap();

        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::from("pen"), Value::Float(1.5)],
                vec![Value::Int(2), Value::from("ink"), Value::Null],
            ]
        );
    }

    #[test]
    fn test_bad_sql_is_a_command_error() {
        let err = executor().execute(&command("SELECT nope FROM items", vec![])).err().unwrap();
        assert_eq!(err.code, ErrorCode::CommandFailed);
    }

    #[tokio::test]
    async fn test_execute_async() {
        let rows: Vec<Row> = executor()
            .execute_async(
                &command("SELECT name FROM items WHERE id = ?", vec![Value::Int(2)]),
                &CancellationToken::new(),
            )
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::from("ink")]]);
    }

    #[tokio::test]
    async fn test_execute_async_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor()
            .execute_async(&command("SELECT 1", vec![]), &cancel)
            .await
            .err()
            .unwrap();
        assert!(err.is_cancelled());
    }
}
