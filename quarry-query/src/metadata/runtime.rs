//! Runtime shapes of entity types.
//!
//! An entity type describes how data is stored; a [`RuntimeType`] describes
//! the in-memory object that holds it. Navigation compatibility checks are
//! expressed against runtime types so that a navigation declared on a base
//! type is usable from derived types.

use smol_str::SmolStr;

use crate::value::ValueKind;

/// Declared type of a runtime property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    /// A scalar value.
    Scalar(ValueKind),
    /// A single related object of the named runtime type.
    Reference(SmolStr),
    /// A collection of objects of the named runtime type.
    Collection(SmolStr),
}

impl PropertyType {
    /// Element type when this is a collection.
    pub fn sequence_element(&self) -> Option<&str> {
        match self {
            Self::Collection(element) => Some(element),
            _ => None,
        }
    }

    /// Human readable form used in error messages.
    pub fn display_name(&self) -> String {
        match self {
            Self::Scalar(kind) => format!("{:?}", kind).to_lowercase(),
            Self::Reference(name) => name.to_string(),
            Self::Collection(name) => format!("Vec<{}>", name),
        }
    }
}

/// A property on a runtime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProperty {
    /// Property name.
    pub name: SmolStr,
    /// Runtime type that declares the property.
    pub declaring_type: SmolStr,
    /// Declared type.
    pub ty: PropertyType,
}

/// An in-memory object shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeType {
    name: SmolStr,
    base: Option<SmolStr>,
    properties: Vec<RuntimeProperty>,
}

impl RuntimeType {
    /// Create a runtime type without properties.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            base: None,
            properties: Vec::new(),
        }
    }

    /// Set the base type.
    pub fn extends(mut self, base: impl Into<SmolStr>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Declare a scalar property.
    pub fn scalar(self, name: impl Into<SmolStr>, kind: ValueKind) -> Self {
        self.property(name, PropertyType::Scalar(kind))
    }

    /// Declare a single-valued object property.
    pub fn reference(self, name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        self.property(name, PropertyType::Reference(target.into()))
    }

    /// Declare a collection property.
    pub fn collection(self, name: impl Into<SmolStr>, element: impl Into<SmolStr>) -> Self {
        self.property(name, PropertyType::Collection(element.into()))
    }

    fn property(mut self, name: impl Into<SmolStr>, ty: PropertyType) -> Self {
        let declaring_type = self.name.clone();
        self.properties.push(RuntimeProperty {
            name: name.into(),
            declaring_type,
            ty,
        });
        self
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base type name.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Properties declared directly on this type.
    pub fn properties(&self) -> &[RuntimeProperty] {
        &self.properties
    }

    /// Property declared directly on this type.
    pub fn declared_property(&self, name: &str) -> Option<&RuntimeProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}
