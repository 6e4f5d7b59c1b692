//! The command executor seam between the pipeline and a store.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{QueryError, QueryResult};
use crate::sql::BoundCommand;
use crate::value::Row;

/// A boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Rows produced by a synchronous execution.
pub type RowIter = Box<dyn Iterator<Item = QueryResult<Row>> + Send>;

/// Rows produced by an asynchronous execution.
pub type RowStream = BoxStream<'static, QueryResult<Row>>;

/// Runs bound commands against a store.
///
/// Rows must contain one value per projected column, in projection order.
/// Retry policy, if any, belongs to implementations of this trait.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command and return its rows.
    fn execute(&self, command: &BoundCommand) -> QueryResult<RowIter>;

    /// Execute a command asynchronously.
    ///
    /// The default runs [`execute`](Self::execute) after checking `cancel`.
    async fn execute_async(
        &self,
        command: &BoundCommand,
        cancel: &CancellationToken,
    ) -> QueryResult<RowStream> {
        if cancel.is_cancelled() {
            return Err(QueryError::cancelled());
        }
        let rows = self.execute(command)?;
        Ok(futures::stream::iter(rows).boxed())
    }
}
