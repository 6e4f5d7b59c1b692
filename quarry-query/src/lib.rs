//! # quarry-query
//!
//! Query translation, include loading and entity tracking for the Quarry ORM.
//!
//! This crate provides the provider-agnostic pipeline:
//! - A metadata [`Model`](metadata::Model) of entity types, foreign keys and navigations
//! - Composed query trees ([`Query`](expression::Query)) over scalar [`Expression`](expression::Expression)s
//! - Method-call translators and a SQL generator
//! - In-process evaluation of what the store cannot run, under a
//!   [`ClientEvaluationBehavior`](types::ClientEvaluationBehavior)
//! - Eager loading of navigations through grouped-join include chains
//! - An identity map ([`UnitOfWork`](tracking::UnitOfWork)) for tracked entities
//!
//! ## Building a model
//!
//! ```rust
//! use quarry_query::metadata::{ModelBuilder, Relationship};
//! use quarry_query::value::ValueKind;
//!
//! let model = ModelBuilder::new()
//!     .entity("Order", |e| {
//!         e.table("orders")
//!             .property("Id", ValueKind::Int)
//!             .property("Customer", ValueKind::String)
//!             .key(&["Id"])
//!     })
//!     .entity("OrderLine", |e| {
//!         e.table("order_lines")
//!             .property("Id", ValueKind::Int)
//!             .property("OrderId", ValueKind::Int)
//!             .key(&["Id"])
//!     })
//!     .relationship(
//!         Relationship::new("Order", "OrderLine")
//!             .foreign_key(&["OrderId"])
//!             .with_many("Lines")
//!             .with_one("Order"),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(model.find_navigation("Order", "Lines").is_some());
//! ```
//!
//! ## Compiling a query
//!
//! ```rust
//! # use quarry_query::metadata::ModelBuilder;
//! # use quarry_query::value::ValueKind;
//! use quarry_query::expression::{Expression, Query};
//! use quarry_query::query::{QueryCompiler, QueryOptions};
//!
//! # let model = ModelBuilder::new()
//! #     .entity("Order", |e| e.table("orders").property("Id", ValueKind::Int).key(&["Id"]))
//! #     .build()
//! #     .unwrap();
//! let compiler = QueryCompiler::new(model, QueryOptions::new());
//! let compiled = compiler
//!     .compile(&Query::from("Order", "o").filter(Expression::member("o", "Id").greater_than(5)).build())
//!     .unwrap();
//!
//! assert_eq!(compiled.sql(), r#"SELECT "o"."Id" FROM "orders" AS "o" WHERE ("o"."Id" > ?)"#);
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use quarry_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::navigation_not_found("Order", "Items");
//! assert_eq!(err.code, ErrorCode::NavigationNotFound);
//! assert!(err.is_translation_error());
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod expression;
pub mod include;
pub mod logging;
pub mod metadata;
pub mod query;
pub mod session;
pub mod sql;
pub mod tracking;
pub mod translators;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::QuarryConfig;
pub use diagnostics::{
    DiagnosticEvent, Diagnostics, DiagnosticsSink, EventId, MemorySink, TracingSink, WarningBehavior,
    WarningsConfiguration, WarningsConfigurationBuilder,
};
pub use error::{ErrorCategory, ErrorCode, ErrorContext, QueryError, QueryResult, Suggestion};
pub use executor::{CommandExecutor, RowIter, RowStream};
pub use expression::{BinaryOp, Expression, MethodCallExpression, MethodInfo, Projection, Query, QueryExpression};
pub use metadata::{Model, ModelBuilder, Navigation, Relationship};
pub use query::{
    AsyncQueryResults, ClientMethodRegistry, CompiledQuery, QueryCompiler, QueryContext, QueryItem, QueryOptions,
    QueryResults,
};
pub use session::Session;
pub use sql::{BoundCommand, DatabaseType, RelationalCommand};
pub use tracking::{EntityObject, EntityRef, EntityState, UnitOfWork};
pub use translators::{CompositeMethodCallTranslator, MethodCallTranslator};
pub use types::{ClientEvaluationBehavior, IncludeStrategy, SortOrder, TrackingBehavior};
pub use value::{Row, Value, ValueKind};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::expression::{Expression, Projection, Query};
    pub use crate::metadata::{ModelBuilder, Relationship};
    pub use crate::query::{QueryItem, QueryOptions};
    pub use crate::session::Session;
    pub use crate::types::{ClientEvaluationBehavior, IncludeStrategy, SortOrder, TrackingBehavior};
    pub use crate::value::{Value, ValueKind};
}
