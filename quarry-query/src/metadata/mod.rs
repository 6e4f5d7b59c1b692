//! The metadata model: entity types, foreign keys and navigations.
//!
//! A [`Model`] is built once with [`ModelBuilder`] and then shared read-only
//! (`Arc<Model>`) across every query compiled against it. Navigations and
//! foreign keys live in arenas addressed by [`NavigationId`] and
//! [`ForeignKeyId`].
//!
//! ```rust
//! use quarry_query::metadata::{ModelBuilder, Relationship};
//! use quarry_query::ValueKind;
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
//!     .build()
//!     .unwrap();
//!
//! let lines = model.find_navigation("Order", "Lines").unwrap();
//! assert!(lines.is_collection(&model));
//! assert_eq!(lines.declaring_entity_type(&model).name(), "Order");
//! assert_eq!(lines.find_inverse(&model).unwrap().name(), "Order");
//! ```

mod accessor;
mod builder;
mod entity_type;
mod navigation;
mod runtime;

use indexmap::IndexMap;
use smol_str::SmolStr;

pub use accessor::CollectionAccessor;
pub use builder::{EntityTypeBuilder, ModelBuilder, Relationship};
pub use entity_type::{EntityType, Property};
pub use navigation::{ForeignKey, Navigation};
pub use runtime::{PropertyType, RuntimeProperty, RuntimeType};

use crate::error::{QueryError, QueryResult};

/// Index of a navigation in its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NavigationId(pub(crate) usize);

/// Index of a foreign key in its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignKeyId(pub(crate) usize);

/// Immutable metadata graph.
#[derive(Debug)]
pub struct Model {
    entity_types: IndexMap<SmolStr, EntityType>,
    runtime_types: IndexMap<SmolStr, RuntimeType>,
    foreign_keys: Vec<ForeignKey>,
    navigations: Vec<Navigation>,
}

impl Model {
    /// All entity types in declaration order.
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.entity_types.values()
    }

    /// Look up an entity type.
    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.get(name)
    }

    /// Look up an entity type or fail with a translation error.
    pub fn require_entity_type(&self, name: &str) -> QueryResult<&EntityType> {
        self.entity_type(name)
            .ok_or_else(|| QueryError::entity_type_not_found(name))
    }

    /// `name` must come from this model's own metadata (a navigation target,
    /// a foreign key end); the builder validates those on `build`.
    pub(crate) fn entity_type_unchecked(&self, name: &str) -> &EntityType {
        &self.entity_types[name]
    }

    /// Look up a runtime type.
    pub fn runtime_type(&self, name: &str) -> Option<&RuntimeType> {
        self.runtime_types.get(name)
    }

    /// Navigation by id.
    ///
    /// # Panics
    ///
    /// If `id` was issued by a different model. Use
    /// [`get_navigation`](Self::get_navigation) for ids of unknown origin.
    pub fn navigation(&self, id: NavigationId) -> &Navigation {
        &self.navigations[id.0]
    }

    /// Navigation by id, `None` when this model has no such navigation.
    pub fn get_navigation(&self, id: NavigationId) -> Option<&Navigation> {
        self.navigations.get(id.0)
    }

    /// Foreign key by id.
    ///
    /// # Panics
    ///
    /// If `id` was issued by a different model.
    pub fn foreign_key(&self, id: ForeignKeyId) -> &ForeignKey {
        &self.foreign_keys[id.0]
    }

    /// Foreign key by id, `None` when this model has no such foreign key.
    pub fn get_foreign_key(&self, id: ForeignKeyId) -> Option<&ForeignKey> {
        self.foreign_keys.get(id.0)
    }

    /// Navigations declared on an entity type.
    pub fn navigations_of<'m>(
        &'m self,
        entity_type: &EntityType,
    ) -> impl Iterator<Item = &'m Navigation> + use<'m> {
        let ids = entity_type.navigation_ids().to_vec();
        ids.into_iter().map(move |id| self.navigation(id))
    }

    /// Find a navigation by declaring entity type and name.
    pub fn find_navigation(&self, entity_type: &str, name: &str) -> Option<&Navigation> {
        let et = self.entity_type(entity_type)?;
        et.navigation_ids()
            .iter()
            .map(|id| self.navigation(*id))
            .find(|nav| nav.name() == name)
    }

    /// Whether a value of runtime type `source` can be stored where `target` is declared.
    pub fn is_assignable_from(&self, target: &str, source: &str) -> bool {
        let mut current = Some(source);
        let mut depth = 0;
        while let Some(name) = current {
            if name == target {
                return true;
            }
            depth += 1;
            if depth > self.runtime_types.len() {
                return false;
            }
            current = self.runtime_types.get(name).and_then(|rt| rt.base());
        }
        false
    }

    /// Find a property on a runtime type or any of its bases.
    pub fn find_runtime_property(&self, runtime_type: &str, name: &str) -> Option<&RuntimeProperty> {
        let mut current = self.runtime_types.get(runtime_type);
        let mut depth = 0;
        while let Some(rt) = current {
            if let Some(property) = rt.declared_property(name) {
                return Some(property);
            }
            depth += 1;
            if depth > self.runtime_types.len() {
                return None;
            }
            current = rt.base().and_then(|base| self.runtime_types.get(base));
        }
        None
    }
}
