//! Materialized entity instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::error::QueryResult;
use crate::metadata::EntityType;
use crate::value::Value;

/// Shared handle to an entity instance. Identity is pointer identity.
pub type EntityRef = Arc<EntityObject>;

/// Contents of one navigation slot.
#[derive(Debug, Clone)]
pub enum NavigationValue {
    /// A single related entity, or none.
    Reference(Option<EntityRef>),
    /// Related entities in attachment order.
    Collection(Vec<EntityRef>),
}

/// A runtime entity: property values plus navigation slots.
pub struct EntityObject {
    entity_type: SmolStr,
    values: RwLock<IndexMap<SmolStr, Value>>,
    navigations: RwLock<HashMap<SmolStr, NavigationValue>>,
}

impl EntityObject {
    /// Create an instance from named values.
    pub fn new(entity_type: impl Into<SmolStr>, values: IndexMap<SmolStr, Value>) -> EntityRef {
        Arc::new(Self {
            entity_type: entity_type.into(),
            values: RwLock::new(values),
            navigations: RwLock::new(HashMap::new()),
        })
    }

    /// Create an instance from values in property order, coercing each to its declared kind.
    pub fn materialize(entity_type: &EntityType, values: &[Value]) -> QueryResult<EntityRef> {
        let mut named = IndexMap::with_capacity(entity_type.properties().len());
        for (property, value) in entity_type.properties().iter().zip(values) {
            named.insert(property.name.clone(), value.clone().coerce(property.kind)?);
        }
        Ok(Self::new(entity_type.name(), named))
    }

    /// Name of the entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Value of a property (null when absent).
    pub fn get(&self, property: &str) -> Value {
        self.values.read().get(property).cloned().unwrap_or(Value::Null)
    }

    /// Overwrite a property.
    pub fn set(&self, property: impl Into<SmolStr>, value: impl Into<Value>) {
        self.values.write().insert(property.into(), value.into());
    }

    /// Snapshot of all property values.
    pub fn values(&self) -> IndexMap<SmolStr, Value> {
        self.values.read().clone()
    }

    /// Values of several properties, in the given order.
    pub fn get_many(&self, properties: &[SmolStr]) -> Vec<Value> {
        let values = self.values.read();
        properties
            .iter()
            .map(|p| values.get(p).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// The entity referenced by a reference navigation.
    pub fn reference(&self, navigation: &str) -> Option<EntityRef> {
        match self.navigations.read().get(navigation) {
            Some(NavigationValue::Reference(target)) => target.clone(),
            _ => None,
        }
    }

    /// Assign a reference navigation.
    pub fn set_reference(&self, navigation: impl Into<SmolStr>, target: Option<EntityRef>) {
        self.navigations
            .write()
            .insert(navigation.into(), NavigationValue::Reference(target));
    }

    /// Snapshot of a collection navigation, `None` if never created.
    pub fn collection(&self, navigation: &str) -> Option<Vec<EntityRef>> {
        match self.navigations.read().get(navigation) {
            Some(NavigationValue::Collection(items)) => Some(items.clone()),
            _ => None,
        }
    }

    /// Whether a navigation slot has been assigned.
    pub fn is_loaded(&self, navigation: &str) -> bool {
        self.navigations.read().contains_key(navigation)
    }

    /// Mutate a collection slot, creating it when absent.
    pub(crate) fn with_collection_mut<R>(
        &self,
        navigation: &str,
        f: impl FnOnce(&mut Vec<EntityRef>) -> R,
    ) -> R {
        let mut navigations = self.navigations.write();
        let slot = navigations
            .entry(SmolStr::new(navigation))
            .or_insert_with(|| NavigationValue::Collection(Vec::new()));
        if !matches!(slot, NavigationValue::Collection(_)) {
            *slot = NavigationValue::Collection(Vec::new());
        }
        match slot {
            NavigationValue::Collection(items) => f(items),
            NavigationValue::Reference(_) => f(&mut Vec::new()),
        }
    }

    /// Drop every navigation link held by this instance.
    pub fn clear_navigations(&self) {
        self.navigations.write().clear();
    }

    /// Property values as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&*self.values.read()).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Debug for EntityObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let navigations: Vec<SmolStr> = self.navigations.read().keys().cloned().collect();
        f.debug_struct("EntityObject")
            .field("entity_type", &self.entity_type)
            .field("values", &*self.values.read())
            .field("navigations", &navigations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_slot_created_on_demand() {
        let order = EntityObject::new("Order", IndexMap::new());
        assert!(order.collection("Lines").is_none());

        let line = EntityObject::new("OrderLine", IndexMap::new());
        order.with_collection_mut("Lines", |items| items.push(line.clone()));

        let lines = order.collection("Lines").unwrap();
        assert_eq!(lines.len(), 1);
        assert!(Arc::ptr_eq(&lines[0], &line));
    }

    #[test]
    fn test_reference_and_values() {
        let mut values = IndexMap::new();
        values.insert(SmolStr::new("Id"), Value::Int(7));
        let blog = EntityObject::new("Blog", values);
        let person = EntityObject::new("Person", IndexMap::new());

        blog.set_reference("Author", Some(person.clone()));
        assert!(Arc::ptr_eq(&blog.reference("Author").unwrap(), &person));
        assert_eq!(blog.get("Id"), Value::Int(7));
        assert_eq!(blog.get("Missing"), Value::Null);
        assert_eq!(blog.to_json(), serde_json::json!({"Id": 7}));
    }
}
