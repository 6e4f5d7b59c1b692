//! Eager loading of navigations ("include").
//!
//! A compiled query carries, per materialized source, an ordered chain of
//! include steps. Each step is one navigation path with one loader factory
//! per navigation. At execution time the chain is initialized against the
//! [`QueryContext`](crate::query::QueryContext), run once per materialized
//! entity, and disposed when the results end, fail, or are dropped.

mod async_group_join;
mod group_join;
mod loader;

pub use async_group_join::{AsyncGroupJoinInclude, AsyncIncludeStep};
pub use group_join::{GroupJoinInclude, IncludeStep};
pub use loader::{
    AsyncLoaderFactory, AsyncRelatedEntitiesLoader, CorrelatedCommand, CorrelatedLoader, LoaderFactory,
    LoaderPlan, PreJoinedLoader, PreJoinedSlice, RelatedEntitiesLoader,
};
