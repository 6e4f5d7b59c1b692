//! SQLite provider for Quarry.
//!
//! This crate provides the SQLite pieces of the query pipeline:
//!
//! - A [`SqliteExecutor`] running bound commands on a `rusqlite` connection
//! - The SQLite method-call translator set ([`translators`])
//! - [`SqliteConfig`] pragmas applied when the database is opened
//!
//! # Example
//!
//! ```rust,ignore
//! use quarry_sqlite::{SqliteConfig, SqliteExecutor};
//!
//! let executor = SqliteExecutor::open(SqliteConfig::from_url("sqlite://./shop.db")?)?;
//! let session = quarry_sqlite::session(model, executor);
//!
//! let customers = session.to_list(Query::from("Customer", "c").include(&["Orders"]))?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod translators;
pub mod types;

use std::sync::Arc;

use quarry_query::metadata::Model;
use quarry_query::session::Session;
use quarry_query::sql::DatabaseType;

pub use config::{JournalMode, SqliteConfig, SynchronousMode};
pub use error::{SqliteError, SqliteResult};
pub use executor::SqliteExecutor;

/// A session over `executor` using the SQLite dialect and translator set.
pub fn session(model: Arc<Model>, executor: SqliteExecutor) -> Session {
    let options = quarry_query::query::QueryOptions::new().database(DatabaseType::SQLite);
    Session::new(model, Arc::new(executor))
        .with_options(options)
        .with_translator(Arc::new(translators::composite()))
}
