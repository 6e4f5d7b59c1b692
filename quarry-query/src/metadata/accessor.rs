//! Access to the collection slot of a collection navigation.

use std::collections::HashSet;
use std::sync::Arc;

use smol_str::SmolStr;

use super::Model;
use super::navigation::Navigation;
use crate::error::{QueryError, QueryResult};
use crate::tracking::{EntityObject, EntityRef};

/// Reads and mutates one collection navigation on entity objects.
#[derive(Debug)]
pub struct CollectionAccessor {
    navigation: SmolStr,
    display: String,
    element_type: SmolStr,
    accepted: HashSet<SmolStr>,
}

impl CollectionAccessor {
    pub(crate) fn new(model: &Model, navigation: &Navigation) -> Self {
        let target = navigation.target_type(model);
        let element_type = SmolStr::new(target.runtime_type().unwrap_or(target.name()));

        let mut accepted: HashSet<SmolStr> = model
            .entity_types()
            .filter(|et| {
                et.runtime_type()
                    .is_some_and(|rt| model.is_assignable_from(&element_type, rt))
            })
            .map(|et| SmolStr::new(et.name()))
            .collect();
        accepted.insert(SmolStr::new(target.name()));

        Self {
            navigation: SmolStr::new(navigation.name()),
            display: navigation.display(model),
            element_type,
            accepted,
        }
    }

    /// Runtime type of the elements.
    pub fn element_type(&self) -> &str {
        &self.element_type
    }

    /// Snapshot of the collection, or `None` if it was never created.
    pub fn get(&self, entity: &EntityObject) -> Option<Vec<EntityRef>> {
        entity.collection(&self.navigation)
    }

    /// Snapshot of the collection, creating an empty one if absent.
    pub fn get_or_create(&self, entity: &EntityObject) -> Vec<EntityRef> {
        entity.with_collection_mut(&self.navigation, |items| items.clone())
    }

    /// Append an element.
    pub fn add(&self, entity: &EntityObject, value: EntityRef) -> QueryResult<()> {
        if !self.accepted.contains(value.entity_type()) {
            return Err(QueryError::incompatible_entity(value.entity_type(), &self.display));
        }
        entity.with_collection_mut(&self.navigation, |items| items.push(value));
        Ok(())
    }

    /// Whether this exact instance is in the collection.
    pub fn contains(&self, entity: &EntityObject, value: &EntityRef) -> bool {
        entity
            .collection(&self.navigation)
            .is_some_and(|items| items.iter().any(|item| Arc::ptr_eq(item, value)))
    }

    /// Remove every element, keeping the (now empty) collection.
    pub fn clear(&self, entity: &EntityObject) {
        entity.with_collection_mut(&self.navigation, |items| items.clear());
    }
}
