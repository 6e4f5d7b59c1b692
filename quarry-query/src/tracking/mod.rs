//! Entity instances, identity resolution and the unit of work.
//!
//! Every materialized row goes through the [`QueryBuffer`]. When tracking is
//! required, the buffer resolves the row's [`EntityKey`] against the
//! [`UnitOfWork`] so that one key always maps to one instance; new instances
//! are registered and linked to the tracked entities they relate to.

mod buffer;
mod entity;
mod key;
mod unit_of_work;

pub use buffer::QueryBuffer;
pub use entity::{EntityObject, EntityRef, NavigationValue};
pub use key::{EntityKey, KeyValue};
pub use unit_of_work::{EntityState, TrackedEntry, UnitOfWork};
