//! Entity types and their mapped properties.

use std::fmt;

use smol_str::SmolStr;

use super::{ForeignKeyId, NavigationId};
use crate::value::ValueKind;

/// A mapped scalar property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name used in query expressions.
    pub name: SmolStr,
    /// Column the property is stored in.
    pub column: SmolStr,
    /// Storage kind.
    pub kind: ValueKind,
    /// Whether null is allowed.
    pub nullable: bool,
}

/// An entity type in the model.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub(crate) name: SmolStr,
    pub(crate) table: Option<SmolStr>,
    pub(crate) properties: Vec<Property>,
    pub(crate) primary_key: Vec<usize>,
    pub(crate) runtime_type: Option<SmolStr>,
    pub(crate) navigations: Vec<NavigationId>,
    pub(crate) foreign_keys: Vec<ForeignKeyId>,
    pub(crate) referencing_keys: Vec<ForeignKeyId>,
}

impl EntityType {
    /// Entity type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table the entity is stored in, if mapped.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Mapped properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Find a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Position of a property in [`properties`](Self::properties).
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Primary key property positions, in key order.
    pub fn primary_key_indices(&self) -> &[usize] {
        &self.primary_key
    }

    /// Primary key properties, in key order.
    pub fn primary_key(&self) -> impl Iterator<Item = &Property> + '_ {
        self.primary_key.iter().map(move |i| &self.properties[*i])
    }

    /// Name of the runtime type, or `None` for shadow entities.
    pub fn runtime_type(&self) -> Option<&str> {
        self.runtime_type.as_deref()
    }

    /// Whether instances exist only inside the tracker.
    pub fn is_shadow(&self) -> bool {
        self.runtime_type.is_none()
    }

    /// Navigations declared on this entity type.
    pub fn navigation_ids(&self) -> &[NavigationId] {
        &self.navigations
    }

    /// Foreign keys where this type is the dependent.
    pub fn foreign_key_ids(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    /// Foreign keys where this type is the principal.
    pub fn referencing_key_ids(&self) -> &[ForeignKeyId] {
        &self.referencing_keys
    }

    /// Name used in messages.
    pub fn display_name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
