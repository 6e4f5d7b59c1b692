//! Shared fixtures for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::QueryResult;
use crate::executor::{CommandExecutor, RowIter};
use crate::include::{AsyncRelatedEntitiesLoader, RelatedEntitiesLoader};
use crate::metadata::{Model, ModelBuilder, Relationship};
use crate::query::QueryContext;
use crate::sql::BoundCommand;
use crate::tracking::UnitOfWork;
use crate::value::{Row, Value, ValueKind};

type Handler = Arc<dyn Fn(&BoundCommand) -> QueryResult<Vec<Row>> + Send + Sync>;

/// Executor returning canned rows and recording every command.
#[derive(Clone)]
pub(crate) struct MockExecutor {
    handler: Handler,
    commands: Arc<Mutex<Vec<BoundCommand>>>,
}

impl MockExecutor {
    pub(crate) fn new() -> Self {
        Self {
            handler: Arc::new(|_| Ok(Vec::new())),
            commands: Arc::default(),
        }
    }

    /// Return `rows` for every command.
    pub(crate) fn with_rows(self, rows: Vec<Row>) -> Self {
        self.with_handler(move |_| Ok(rows.clone()))
    }

    pub(crate) fn with_handler(
        mut self,
        handler: impl Fn(&BoundCommand) -> QueryResult<Vec<Row>> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    pub(crate) fn commands(&self) -> Vec<BoundCommand> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    fn execute(&self, command: &BoundCommand) -> QueryResult<RowIter> {
        self.commands.lock().push(command.clone());
        let rows = (self.handler)(command)?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

/// `Order(Id, Customer)` with many `OrderLine(Id, OrderId, Product)`.
pub(crate) fn order_model() -> Arc<Model> {
    ModelBuilder::new()
        .entity("Order", |e| {
            e.table("orders")
                .mapped("Id", "id", ValueKind::Int, false)
                .mapped("Customer", "customer", ValueKind::String, false)
                .key(&["Id"])
        })
        .entity("OrderLine", |e| {
            e.table("order_lines")
                .mapped("Id", "id", ValueKind::Int, false)
                .mapped("OrderId", "order_id", ValueKind::Int, false)
                .mapped("Product", "product", ValueKind::String, false)
                .key(&["Id"])
        })
        .relationship(
            Relationship::new("Order", "OrderLine")
                .foreign_key(&["OrderId"])
                .with_many("Lines")
                .with_one("Order"),
        )
        .build()
        .expect("order model is valid")
}

pub(crate) fn test_context(model: Arc<Model>, executor: MockExecutor) -> Arc<QueryContext> {
    let unit_of_work = Arc::new(UnitOfWork::new(model.clone()));
    Arc::new(QueryContext::new(model, Arc::new(executor), unit_of_work))
}

/// Loader that returns nothing and records its calls.
pub(crate) struct RecordingLoader {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingLoader {
    pub(crate) fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self { name, log }
    }
}

impl RelatedEntitiesLoader for RecordingLoader {
    fn load(&mut self, _context: &QueryContext, _key: &[Value]) -> QueryResult<Vec<Row>> {
        self.log.lock().push(format!("load {}", self.name));
        Ok(Vec::new())
    }

    fn dispose(&mut self) {
        self.log.lock().push(format!("dispose {}", self.name));
    }
}

#[async_trait]
impl AsyncRelatedEntitiesLoader for RecordingLoader {
    async fn load(
        &mut self,
        _context: &QueryContext,
        _key: &[Value],
        _cancel: &CancellationToken,
    ) -> QueryResult<Vec<Row>> {
        self.log.lock().push(format!("load {}", self.name));
        Ok(Vec::new())
    }

    fn dispose(&mut self) {
        self.log.lock().push(format!("dispose {}", self.name));
    }
}
