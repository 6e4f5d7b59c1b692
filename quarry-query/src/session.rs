//! The query-execution layer: one model, one executor, one unit of work.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;

use crate::config::QuarryConfig;
use crate::diagnostics::{Diagnostics, DiagnosticsSink, TracingSink};
use crate::error::QueryResult;
use crate::executor::CommandExecutor;
use crate::expression::QueryExpression;
use crate::metadata::Model;
use crate::query::{
    AsyncQueryResults, ClientMethodRegistry, CompiledQuery, DefaultEntityTrackingInfoFactory,
    EntityTrackingInfoFactory, QueryCompiler, QueryContext, QueryItem, QueryOptions, QueryResults,
};
use crate::tracking::UnitOfWork;
use crate::translators::CompositeMethodCallTranslator;
use crate::value::Value;

/// Compiles and runs queries against one store, sharing an identity map.
///
/// ```rust,ignore
/// let session = Session::new(model, executor)
///     .with_options(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Throw));
///
/// let orders = session.to_list(Query::from("Order", "o").include(&["Lines"]))?;
/// ```
#[derive(Clone)]
pub struct Session {
    model: Arc<Model>,
    executor: Arc<dyn CommandExecutor>,
    unit_of_work: Arc<UnitOfWork>,
    options: QueryOptions,
    translator: Arc<CompositeMethodCallTranslator>,
    methods: Arc<ClientMethodRegistry>,
    sink: Arc<dyn DiagnosticsSink>,
    tracking_factory: Arc<dyn EntityTrackingInfoFactory>,
}

impl Session {
    /// A session with default options and the relational translator set.
    pub fn new(model: Arc<Model>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            unit_of_work: Arc::new(UnitOfWork::new(model.clone())),
            model,
            executor,
            options: QueryOptions::default(),
            translator: Arc::new(CompositeMethodCallTranslator::relational()),
            methods: Arc::new(ClientMethodRegistry::with_defaults()),
            sink: Arc::new(TracingSink),
            tracking_factory: Arc::new(DefaultEntityTrackingInfoFactory),
        }
    }

    /// Use these options.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Use the options of a `quarry.toml`.
    pub fn with_config(self, config: &QuarryConfig) -> Self {
        self.with_options(config.query_options())
    }

    /// Use a provider's translator set.
    pub fn with_translator(mut self, translator: Arc<CompositeMethodCallTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Use a client method registry.
    pub fn with_methods(mut self, methods: Arc<ClientMethodRegistry>) -> Self {
        self.methods = methods;
        self
    }

    /// Send logged diagnostics to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use a tracking info factory.
    pub fn with_tracking_info_factory(mut self, factory: Arc<dyn EntityTrackingInfoFactory>) -> Self {
        self.tracking_factory = factory;
        self
    }

    /// The metadata model.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The identity map shared by every query of this session.
    pub fn unit_of_work(&self) -> &Arc<UnitOfWork> {
        &self.unit_of_work
    }

    /// The options in effect.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::new(Diagnostics::new(self.options.warnings.clone(), self.sink.clone()))
    }

    /// A compiler configured like this session.
    pub fn compiler(&self) -> QueryCompiler {
        QueryCompiler::new(self.model.clone(), self.options.clone())
            .with_translator(self.translator.clone())
            .with_methods(self.methods.clone())
            .with_diagnostics(self.diagnostics())
            .with_tracking_info_factory(self.tracking_factory.clone())
    }

    /// Compile without executing.
    pub fn compile(&self, query: impl Into<QueryExpression>) -> QueryResult<Arc<CompiledQuery>> {
        let query = query.into();
        Ok(Arc::new(self.compiler().compile(&query)?))
    }

    fn context(&self, parameters: HashMap<SmolStr, Value>) -> Arc<QueryContext> {
        Arc::new(
            QueryContext::new(self.model.clone(), self.executor.clone(), self.unit_of_work.clone())
                .with_parameters(parameters)
                .with_diagnostics(self.diagnostics()),
        )
    }

    /// Compile and enumerate a query.
    pub fn query(&self, query: impl Into<QueryExpression>) -> QueryResult<QueryResults> {
        self.query_with(query, HashMap::new())
    }

    /// Compile and enumerate a query with parameter values.
    pub fn query_with(
        &self,
        query: impl Into<QueryExpression>,
        parameters: HashMap<SmolStr, Value>,
    ) -> QueryResult<QueryResults> {
        let compiled = self.compile(query)?;
        crate::quarry_debug!(sql = %compiled.sql(), "running query");
        QueryResults::new(self.context(parameters), compiled)
    }

    /// Compile and enumerate a query asynchronously.
    pub fn query_async(
        &self,
        query: impl Into<QueryExpression>,
        parameters: HashMap<SmolStr, Value>,
        cancel: CancellationToken,
    ) -> QueryResult<AsyncQueryResults> {
        let compiled = self.compile(query)?;
        crate::quarry_debug!(sql = %compiled.sql(), "running query asynchronously");
        AsyncQueryResults::new(self.context(parameters), compiled, cancel)
    }

    /// Run a query to completion.
    pub fn to_list(&self, query: impl Into<QueryExpression>) -> QueryResult<Vec<QueryItem>> {
        self.query(query)?.to_list()
    }

    /// Run a query to completion asynchronously.
    pub async fn to_list_async(
        &self,
        query: impl Into<QueryExpression>,
        cancel: CancellationToken,
    ) -> QueryResult<Vec<QueryItem>> {
        self.query_async(query, HashMap::new(), cancel)?.to_list().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("tracked", &self.unit_of_work.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{EventId, MemorySink};
    use crate::error::ErrorCode;
    use crate::expression::{Expression, Query};
    use crate::test_support::{MockExecutor, order_model};
    use crate::types::{ClientEvaluationBehavior, IncludeStrategy};
    use pretty_assertions::assert_eq;

    fn orders_executor() -> MockExecutor {
        MockExecutor::new().with_handler(|command| {
            if command.sql.contains("\"order_lines\" AS \"t\"") {
                let order_id = command.parameters[0].as_i64().unwrap_or_default();
                Ok(vec![
                    vec![Value::Int(order_id * 10), Value::Int(order_id), Value::from("pen")],
                    vec![Value::Int(order_id * 10 + 1), Value::Int(order_id), Value::from("ink")],
                ])
            } else {
                Ok(vec![
                    vec![Value::Int(1), Value::from("ada")],
                    vec![Value::Int(2), Value::from("bob")],
                ])
            }
        })
    }

    #[test]
    fn test_correlated_include_loads_lines() {
        let executor = orders_executor();
        let session = Session::new(order_model(), Arc::new(executor.clone()));

        let items = session.to_list(Query::from("Order", "o").include(&["Lines"])).unwrap();
        assert_eq!(items.len(), 2);
        let first = items[0].as_entity().unwrap();
        let lines = first.collection("Lines").unwrap();
        assert_eq!(lines.len(), 2);
        assert!(Arc::ptr_eq(&lines[0].reference("Order").unwrap(), first));
        assert_eq!(executor.commands().len(), 3);
        assert_eq!(session.unit_of_work().len(), 6);
    }

    #[test]
    fn test_client_filter_and_warning() {
        let sink = Arc::new(MemorySink::new());
        let session = Session::new(order_model(), Arc::new(orders_executor())).with_sink(sink.clone());

        let items = session
            .to_list(
                Query::from("Order", "o").filter(
                    Expression::member("o", "Customer")
                        .call("string", "reverse", vec![])
                        .equal("bob"),
                ),
            )
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_entity().unwrap().get("Id"), Value::Int(2));
        assert_eq!(sink.count(EventId::ClientEvaluation), 1);
    }

    #[test]
    fn test_strict_mode_runs_nothing() {
        let executor = orders_executor();
        let session = Session::new(order_model(), Arc::new(executor.clone()))
            .with_options(QueryOptions::new().client_evaluation(ClientEvaluationBehavior::Throw));

        let err = session
            .query(Query::from("Order", "o").filter(
                Expression::member("o", "Customer").call("string", "reverse", vec![]).equal("bob"),
            ))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ClientEvaluationDisallowed);
        assert!(executor.commands().is_empty());
    }

    #[test]
    fn test_missing_parameter() {
        let session = Session::new(order_model(), Arc::new(orders_executor()));
        let query = Query::from("Order", "o").filter(Expression::member("o", "Id").equal(Expression::parameter("id")));

        let err = session.to_list(query.clone()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParameterMissing);

        let params = HashMap::from([(SmolStr::new("id"), Value::Int(1))]);
        assert_eq!(session.query_with(query, params).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_async_pre_joined_include() {
        let executor = MockExecutor::new().with_rows(vec![
            vec![Value::Int(1), Value::from("ada"), Value::Int(10), Value::Int(1), Value::from("pen")],
            vec![Value::Int(1), Value::from("ada"), Value::Int(11), Value::Int(1), Value::from("ink")],
            vec![Value::Int(2), Value::from("bob"), Value::Null, Value::Null, Value::Null],
        ]);
        let session = Session::new(order_model(), Arc::new(executor.clone()))
            .with_options(QueryOptions::new().include_strategy(IncludeStrategy::PreJoined));

        let items = session
            .to_list_async(Query::from("Order", "o").include(&["Lines"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_entity().unwrap().collection("Lines").unwrap().len(), 2);
        assert!(items[1].as_entity().unwrap().collection("Lines").unwrap().is_empty());
        assert_eq!(executor.commands().len(), 1);
    }

    /// Orders whose row reader fails after the first row.
    struct BrokenReader;

    #[async_trait::async_trait]
    impl CommandExecutor for BrokenReader {
        fn execute(&self, command: &crate::sql::BoundCommand) -> QueryResult<crate::executor::RowIter> {
            if command.sql.contains("\"order_lines\"") {
                return Ok(Box::new(std::iter::empty()));
            }
            let rows = vec![
                Ok(vec![Value::Int(1), Value::from("ada")]),
                Err(crate::error::QueryError::resource(ErrorCode::ReaderFailed, "connection reset")),
                Ok(vec![Value::Int(2), Value::from("bob")]),
            ];
            Ok(Box::new(rows.into_iter()))
        }
    }

    #[test]
    fn test_abandoned_enumeration_disposes_include_chains() {
        let session = Session::new(order_model(), Arc::new(orders_executor()));
        let mut results = session.query(Query::from("Order", "o").include(&["Lines"])).unwrap();

        assert!(results.next().unwrap().is_ok());
        let context = results.context().clone();
        assert_eq!(context.include_scope_depth(), 1);

        drop(results);
        assert_eq!(context.include_scope_depth(), 0);
    }

    #[test]
    fn test_reader_failure_disposes_include_chains() {
        let session = Session::new(order_model(), Arc::new(BrokenReader));
        let mut results = session.query(Query::from("Order", "o").include(&["Lines"])).unwrap();
        let context = results.context().clone();

        assert!(results.next().unwrap().is_ok());
        let err = results.next().unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::ReaderFailed);
        assert_eq!(context.include_scope_depth(), 0);
        assert!(results.next().is_none());
    }

    #[tokio::test]
    async fn test_async_abandoned_enumeration_disposes_include_chains() {
        let session = Session::new(order_model(), Arc::new(orders_executor()));
        let mut results = session
            .query_async(Query::from("Order", "o").include(&["Lines"]), HashMap::new(), CancellationToken::new())
            .unwrap();

        assert!(results.next().await.unwrap().is_some());
        let context = results.context().clone();
        assert_eq!(context.include_scope_depth(), 1);

        drop(results);
        assert_eq!(context.include_scope_depth(), 0);
    }

    #[tokio::test]
    async fn test_async_reader_failure_disposes_include_chains() {
        let session = Session::new(order_model(), Arc::new(BrokenReader));
        let mut results = session
            .query_async(Query::from("Order", "o").include(&["Lines"]), HashMap::new(), CancellationToken::new())
            .unwrap();
        let context = results.context().clone();

        assert!(results.next().await.unwrap().is_some());
        assert_eq!(results.next().await.unwrap_err().code, ErrorCode::ReaderFailed);
        assert_eq!(context.include_scope_depth(), 0);
    }

    #[tokio::test]
    async fn test_async_cancelled_before_execution() {
        let executor = orders_executor();
        let session = Session::new(order_model(), Arc::new(executor.clone()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = session
            .to_list_async(Query::from("Order", "o"), cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(executor.commands().is_empty());
    }
}
