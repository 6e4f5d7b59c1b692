//! Related-entity loaders: one per navigation on an include path.
//!
//! Loaders are created by factories once per query execution and disposed
//! when the include chain that owns them is disposed. Two strategies share
//! the same traits:
//!
//! - [`CorrelatedLoader`] binds the principal key into a secondary command
//!   and runs it through the command executor.
//! - [`PreJoinedLoader`] slices the rows of the current result element, which
//!   already carry the related columns through `LEFT JOIN`s.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::query::QueryContext;
use crate::sql::{BoundCommand, RelationalCommand};
use crate::tracking::EntityKey;
use crate::value::{Row, Value};

/// Loads the rows related to one principal key.
pub trait RelatedEntitiesLoader: Send {
    /// Rows of the related entity type, in property order, for `key`.
    fn load(&mut self, context: &QueryContext, key: &[Value]) -> QueryResult<Vec<Row>>;

    /// Release resources. Called once by the owning chain.
    fn dispose(&mut self);
}

/// Asynchronous [`RelatedEntitiesLoader`].
#[async_trait]
pub trait AsyncRelatedEntitiesLoader: Send {
    /// Rows of the related entity type, in property order, for `key`.
    async fn load(
        &mut self,
        context: &QueryContext,
        key: &[Value],
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<Row>>;

    /// Release resources. Called once by the owning chain.
    fn dispose(&mut self);
}

/// Creates a loader bound to one execution.
pub type LoaderFactory =
    Arc<dyn Fn(&QueryContext) -> QueryResult<Box<dyn RelatedEntitiesLoader>> + Send + Sync>;

/// Creates an async loader bound to one execution.
pub type AsyncLoaderFactory =
    Arc<dyn Fn(&QueryContext) -> QueryResult<Box<dyn AsyncRelatedEntitiesLoader>> + Send + Sync>;

/// Compiled secondary command for a correlated load.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedCommand {
    /// `SELECT .. FROM target WHERE match columns = key parameters`.
    pub command: RelationalCommand,
    /// Parameter names receiving the key parts, in key order.
    pub key_parameters: Vec<SmolStr>,
    /// Navigation being loaded, for messages.
    pub navigation: SmolStr,
}

/// Where the related entity sits inside pre-joined rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PreJoinedSlice {
    /// Related entity type name.
    pub entity_type: SmolStr,
    /// First column of the related entity.
    pub offset: usize,
    /// Number of related entity columns.
    pub width: usize,
    /// Indices, within the slice, of the columns compared against the key.
    pub match_indices: Vec<usize>,
    /// Indices, within the slice, of the related primary key.
    pub key_indices: Vec<usize>,
    /// Navigation being loaded, for messages.
    pub navigation: SmolStr,
}

/// How one navigation of an include path is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderPlan {
    /// One secondary command per principal key.
    Correlated(Arc<CorrelatedCommand>),
    /// A slice of the current element's rows.
    PreJoined(Arc<PreJoinedSlice>),
}

impl LoaderPlan {
    /// Factory for synchronous loaders.
    pub fn factory(&self) -> LoaderFactory {
        match self {
            Self::Correlated(command) => {
                let command = command.clone();
                Arc::new(move |_: &QueryContext| -> QueryResult<Box<dyn RelatedEntitiesLoader>> {
                    Ok(Box::new(CorrelatedLoader::new(command.clone())))
                })
            }
            Self::PreJoined(slice) => {
                let slice = slice.clone();
                Arc::new(move |_: &QueryContext| -> QueryResult<Box<dyn RelatedEntitiesLoader>> {
                    Ok(Box::new(PreJoinedLoader::new(slice.clone())))
                })
            }
        }
    }

    /// Factory for asynchronous loaders.
    pub fn async_factory(&self) -> AsyncLoaderFactory {
        match self {
            Self::Correlated(command) => {
                let command = command.clone();
                Arc::new(move |_: &QueryContext| -> QueryResult<Box<dyn AsyncRelatedEntitiesLoader>> {
                    Ok(Box::new(CorrelatedLoader::new(command.clone())))
                })
            }
            Self::PreJoined(slice) => {
                let slice = slice.clone();
                Arc::new(move |_: &QueryContext| -> QueryResult<Box<dyn AsyncRelatedEntitiesLoader>> {
                    Ok(Box::new(PreJoinedLoader::new(slice.clone())))
                })
            }
        }
    }
}

/// Loads related rows with one secondary command per principal key.
pub struct CorrelatedLoader {
    command: Option<Arc<CorrelatedCommand>>,
}

impl CorrelatedLoader {
    /// Bind a compiled secondary command.
    pub fn new(command: Arc<CorrelatedCommand>) -> Self {
        Self {
            command: Some(command),
        }
    }

    /// Whether the loader has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.command.is_none()
    }

    fn bind(&self, key: &[Value]) -> QueryResult<BoundCommand> {
        let command = self
            .command
            .as_ref()
            .ok_or_else(|| QueryError::invalid_state("Correlated loader used after dispose"))?;
        if key.len() != command.key_parameters.len() {
            return Err(QueryError::internal(format!(
                "Navigation '{}' expects a key of {} part(s), got {}",
                command.navigation,
                command.key_parameters.len(),
                key.len()
            )));
        }
        let values: HashMap<SmolStr, Value> = command
            .key_parameters
            .iter()
            .cloned()
            .zip(key.iter().cloned())
            .collect();
        trace!(navigation = %command.navigation, "loading correlated rows");
        command.command.bind(&values)
    }
}

impl fmt::Debug for CorrelatedLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelatedLoader")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl RelatedEntitiesLoader for CorrelatedLoader {
    fn load(&mut self, context: &QueryContext, key: &[Value]) -> QueryResult<Vec<Row>> {
        let bound = self.bind(key)?;
        context.executor().execute(&bound)?.collect()
    }

    fn dispose(&mut self) {
        self.command = None;
    }
}

#[async_trait]
impl AsyncRelatedEntitiesLoader for CorrelatedLoader {
    async fn load(
        &mut self,
        context: &QueryContext,
        key: &[Value],
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<Row>> {
        let bound = self.bind(key)?;
        let fetch = async {
            let rows = context.executor().execute_async(&bound, cancel).await?;
            rows.try_collect::<Vec<Row>>().await
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueryError::cancelled()),
            rows = fetch => rows,
        }
    }

    fn dispose(&mut self) {
        self.command = None;
    }
}

/// Loads related rows from the pre-joined rows of the current element.
pub struct PreJoinedLoader {
    slice: Option<Arc<PreJoinedSlice>>,
}

impl PreJoinedLoader {
    /// Bind a slice description.
    pub fn new(slice: Arc<PreJoinedSlice>) -> Self {
        Self { slice: Some(slice) }
    }

    /// Whether the loader has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.slice.is_none()
    }

    fn extract(&self, context: &QueryContext, key: &[Value]) -> QueryResult<Vec<Row>> {
        let slice = self
            .slice
            .as_ref()
            .ok_or_else(|| QueryError::invalid_state("Pre-joined loader used after dispose"))?;
        let group = context.current_group();

        let mut seen = HashSet::new();
        let mut related = Vec::new();
        for row in group.iter() {
            let values = row.get(slice.offset..slice.offset + slice.width).ok_or_else(|| {
                QueryError::internal(format!(
                    "Row has {} column(s), navigation '{}' reads up to column {}",
                    row.len(),
                    slice.navigation,
                    slice.offset + slice.width
                ))
            })?;
            let column = |i: &usize| values.get(*i).unwrap_or(&Value::Null);

            let Some(entity_key) = EntityKey::new(&slice.entity_type, slice.key_indices.iter().map(column))
            else {
                continue;
            };
            let matches = slice
                .match_indices
                .iter()
                .map(column)
                .zip(key)
                .all(|(a, b)| a.loose_eq(b));
            if matches && seen.insert(entity_key) {
                related.push(values.to_vec());
            }
        }
        Ok(related)
    }
}

impl fmt::Debug for PreJoinedLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreJoinedLoader")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl RelatedEntitiesLoader for PreJoinedLoader {
    fn load(&mut self, context: &QueryContext, key: &[Value]) -> QueryResult<Vec<Row>> {
        self.extract(context, key)
    }

    fn dispose(&mut self) {
        self.slice = None;
    }
}

#[async_trait]
impl AsyncRelatedEntitiesLoader for PreJoinedLoader {
    async fn load(
        &mut self,
        context: &QueryContext,
        key: &[Value],
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<Row>> {
        if cancel.is_cancelled() {
            return Err(QueryError::cancelled());
        }
        self.extract(context, key)
    }

    fn dispose(&mut self) {
        self.slice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{CommandParameter, SqlBuilder};
    use crate::test_support::{MockExecutor, order_model, test_context};
    use pretty_assertions::assert_eq;

    fn correlated() -> Arc<CorrelatedCommand> {
        let mut builder = SqlBuilder::new(crate::sql::DatabaseType::SQLite);
        builder
            .push("SELECT * FROM lines WHERE order_id = ")
            .push_param(CommandParameter::Named("__key_0".into()));
        Arc::new(CorrelatedCommand {
            command: builder.build(),
            key_parameters: vec!["__key_0".into()],
            navigation: "Order.Lines".into(),
        })
    }

    #[test]
    fn test_correlated_binds_key() {
        let executor = MockExecutor::new().with_rows(vec![vec![Value::Int(10), Value::Int(1)]]);
        let context = test_context(order_model(), executor.clone());

        let mut loader = CorrelatedLoader::new(correlated());
        let rows = RelatedEntitiesLoader::load(&mut loader, &context, &[Value::Int(1)]).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(executor.commands()[0].parameters, vec![Value::Int(1)]);
    }

    #[test]
    fn test_correlated_after_dispose_fails() {
        let context = test_context(order_model(), MockExecutor::new());
        let mut loader = CorrelatedLoader::new(correlated());
        RelatedEntitiesLoader::dispose(&mut loader);

        assert!(loader.is_disposed());
        assert!(RelatedEntitiesLoader::load(&mut loader, &context, &[Value::Int(1)]).is_err());
    }

    #[tokio::test]
    async fn test_correlated_async_honours_cancellation() {
        let executor = MockExecutor::new();
        let context = test_context(order_model(), executor.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut loader = CorrelatedLoader::new(correlated());
        let err = AsyncRelatedEntitiesLoader::load(&mut loader, &context, &[Value::Int(1)], &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(executor.commands().is_empty());
    }

    #[test]
    fn test_pre_joined_slices_and_dedupes() {
        let context = test_context(order_model(), MockExecutor::new());
        // order(Id) | line(Id, OrderId, Product)
        context.set_current_group(vec![
            vec![Value::Int(1), Value::Int(10), Value::Int(1), Value::from("a")],
            vec![Value::Int(1), Value::Int(11), Value::Int(1), Value::from("b")],
            vec![Value::Int(1), Value::Int(10), Value::Int(1), Value::from("a")],
            vec![Value::Int(1), Value::Null, Value::Null, Value::Null],
        ]);

        let mut loader = PreJoinedLoader::new(Arc::new(PreJoinedSlice {
            entity_type: "OrderLine".into(),
            offset: 1,
            width: 3,
            match_indices: vec![1],
            key_indices: vec![0],
            navigation: "Order.Lines".into(),
        }));
        let rows = RelatedEntitiesLoader::load(&mut loader, &context, &[Value::Int(1)]).unwrap();

        assert_eq!(
            rows,
            vec![
                vec![Value::Int(10), Value::Int(1), Value::from("a")],
                vec![Value::Int(11), Value::Int(1), Value::from("b")],
            ]
        );
    }
}
