//! # Quarry
//!
//! Expression-tree query translation and entity materialization for
//! relational stores.
//!
//! Quarry provides:
//! - A metadata model of entity types, keys and navigations
//! - Composable query trees translated to SQL through pluggable method-call translators
//! - In-process evaluation of what the store cannot run, with a strict mode that refuses it
//! - Eager loading of navigations, by correlated commands or pre-joined rows
//! - An identity map so one key is one instance per session
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quarry::prelude::*;
//! use quarry::sqlite::SqliteExecutor;
//!
//! let model = ModelBuilder::new()
//!     .entity("Order", |e| e.table("orders").property("Id", ValueKind::Int).key(&["Id"]))
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
//!     .build()?;
//!
//! let session = quarry::sqlite::session(model, SqliteExecutor::memory()?);
//! let orders = session.to_list(Query::from("Order", "o").include(&["Lines"]))?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Query translation, include loading and entity tracking.
pub mod query {
    pub use quarry_query::*;
}

/// The SQLite provider.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use quarry_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use quarry_query::prelude::*;

    #[cfg(feature = "sqlite")]
    pub use quarry_sqlite::{SqliteConfig, SqliteExecutor};
}

// Re-export key types at the crate root
pub use quarry_query::{QuarryConfig, QueryError, QueryResult, Session};
