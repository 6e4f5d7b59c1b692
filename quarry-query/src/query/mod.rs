//! Compilation and execution of queries.
//!
//! A [`QueryCompiler`] turns a [`QueryExpression`](crate::expression::QueryExpression)
//! into a [`CompiledQuery`]; [`QueryResults`] and [`AsyncQueryResults`]
//! execute it against a [`QueryContext`].

pub mod client;
pub mod compiler;
pub mod context;
pub mod generator;
pub mod options;
pub mod results;
pub mod select;
pub mod shaper;
pub mod tracking_info;

pub use client::{ClientEvaluator, ClientMethod, ClientMethodRegistry, ClientOperator, ClientPipeline, Element, RowGrouper};
pub use compiler::{CompiledQuery, IncludePlan, QueryCompiler};
pub use context::QueryContext;
pub use generator::SqlGenerator;
pub use options::QueryOptions;
pub use results::{AsyncQueryResults, QueryResults};
pub use select::{JoinKind, OrderingExpression, ProjectionColumn, SelectExpression, TableExpression};
pub use shaper::{EntityMaterializer, QueryItem, RowLayout, ScalarSource, Shaper, ShaperNode};
pub use tracking_info::{DefaultEntityTrackingInfoFactory, EntityTrackingInfo, EntityTrackingInfoFactory};
