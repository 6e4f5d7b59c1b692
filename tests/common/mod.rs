//! Shared fixtures: an order model over an in-memory SQLite database.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use quarry::query::executor::{CommandExecutor, RowIter, RowStream};
use quarry::query::metadata::{Model, ModelBuilder, Relationship};
use quarry::query::sql::BoundCommand;
use quarry::query::value::ValueKind;
use quarry::query::{QueryResult, Session};
use quarry::sqlite::SqliteExecutor;

pub const SCHEMA: &str = "
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer TEXT NOT NULL
    );
    CREATE TABLE order_lines (
        id INTEGER PRIMARY KEY,
        order_id INTEGER NOT NULL REFERENCES orders (id),
        product TEXT NOT NULL
    );
    INSERT INTO orders VALUES (1, 'ada'), (2, 'bob'), (3, 'cyd');
    INSERT INTO order_lines VALUES
        (10, 1, 'pen'), (11, 1, 'ink'), (12, 1, 'pad'),
        (20, 2, 'cup');
";

/// `Order(Id, Customer)` with many `OrderLine(Id, OrderId, Product)`.
pub fn order_model() -> Arc<Model> {
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
        .expect("order model")
}

/// Counts the commands that reach SQLite.
#[derive(Clone)]
pub struct CountingExecutor {
    inner: SqliteExecutor,
    count: Arc<AtomicUsize>,
}

impl CountingExecutor {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandExecutor for CountingExecutor {
    fn execute(&self, command: &BoundCommand) -> QueryResult<RowIter> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(command)
    }

    async fn execute_async(&self, command: &BoundCommand, cancel: &CancellationToken) -> QueryResult<RowStream> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.execute_async(command, cancel).await
    }
}

/// A seeded in-memory database.
pub fn database() -> CountingExecutor {
    let inner = SqliteExecutor::memory().expect("open sqlite");
    inner.execute_batch(SCHEMA).expect("seed schema");
    CountingExecutor {
        inner,
        count: Arc::default(),
    }
}

/// A SQLite session over `executor`, sharing its command counter.
pub fn session(executor: &CountingExecutor) -> Session {
    Session::new(order_model(), Arc::new(executor.clone()))
        .with_translator(Arc::new(quarry::sqlite::translators::composite()))
}

/// Install a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
