//! Fluent construction of a [`Model`].

use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use super::entity_type::{EntityType, Property};
use super::navigation::{ForeignKey, Navigation};
use super::runtime::RuntimeType;
use super::{ForeignKeyId, Model, NavigationId};
use crate::error::{QueryError, QueryResult};
use crate::value::ValueKind;

#[derive(Debug, Clone, Default)]
enum RuntimeMode {
    #[default]
    Derived,
    Shadow,
    Named(SmolStr),
}

/// Builder for one entity type.
#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    name: SmolStr,
    table: Option<SmolStr>,
    properties: Vec<Property>,
    key: Vec<SmolStr>,
    runtime: RuntimeMode,
}

impl EntityTypeBuilder {
    fn new(name: SmolStr) -> Self {
        Self {
            name,
            table: None,
            properties: Vec::new(),
            key: Vec::new(),
            runtime: RuntimeMode::Derived,
        }
    }

    /// Map the entity to a table.
    pub fn table(mut self, table: impl Into<SmolStr>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add a required property stored in a column of the same name.
    pub fn property(self, name: impl Into<SmolStr>, kind: ValueKind) -> Self {
        let name = name.into();
        self.mapped(name.clone(), name, kind, false)
    }

    /// Add a nullable property stored in a column of the same name.
    pub fn nullable(self, name: impl Into<SmolStr>, kind: ValueKind) -> Self {
        let name = name.into();
        self.mapped(name.clone(), name, kind, true)
    }

    /// Add a property stored in a differently named column.
    pub fn mapped(
        mut self,
        name: impl Into<SmolStr>,
        column: impl Into<SmolStr>,
        kind: ValueKind,
        nullable: bool,
    ) -> Self {
        self.properties.push(Property {
            name: name.into(),
            column: column.into(),
            kind,
            nullable,
        });
        self
    }

    /// Set the primary key.
    pub fn key(mut self, properties: &[&str]) -> Self {
        self.key = properties.iter().map(|p| SmolStr::new(*p)).collect();
        self
    }

    /// Instances have no runtime type and exist only in the tracker.
    pub fn shadow(mut self) -> Self {
        self.runtime = RuntimeMode::Shadow;
        self
    }

    /// Use an explicitly registered runtime type.
    pub fn runtime_type(mut self, name: impl Into<SmolStr>) -> Self {
        self.runtime = RuntimeMode::Named(name.into());
        self
    }
}

/// A foreign key between two entity types with its optional navigations.
#[derive(Debug, Clone)]
pub struct Relationship {
    principal: SmolStr,
    dependent: SmolStr,
    foreign_key: Vec<SmolStr>,
    principal_to_dependent: Option<SmolStr>,
    dependent_to_principal: Option<SmolStr>,
    unique: bool,
}

impl Relationship {
    /// Relationship where `dependent` references `principal`.
    pub fn new(principal: impl Into<SmolStr>, dependent: impl Into<SmolStr>) -> Self {
        Self {
            principal: principal.into(),
            dependent: dependent.into(),
            foreign_key: Vec::new(),
            principal_to_dependent: None,
            dependent_to_principal: None,
            unique: false,
        }
    }

    /// Foreign key properties on the dependent.
    pub fn foreign_key(mut self, properties: &[&str]) -> Self {
        self.foreign_key = properties.iter().map(|p| SmolStr::new(*p)).collect();
        self
    }

    /// Collection navigation on the principal.
    pub fn with_many(mut self, navigation: impl Into<SmolStr>) -> Self {
        self.principal_to_dependent = Some(navigation.into());
        self.unique = false;
        self
    }

    /// Reference navigation on the principal (one-to-one).
    pub fn with_unique(mut self, navigation: impl Into<SmolStr>) -> Self {
        self.principal_to_dependent = Some(navigation.into());
        self.unique = true;
        self
    }

    /// Reference navigation on the dependent.
    pub fn with_one(mut self, navigation: impl Into<SmolStr>) -> Self {
        self.dependent_to_principal = Some(navigation.into());
        self
    }
}

/// Builds and validates a [`Model`].
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityTypeBuilder>,
    runtime_types: Vec<RuntimeType>,
    relationships: Vec<Relationship>,
}

impl ModelBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity type.
    pub fn entity(
        mut self,
        name: impl Into<SmolStr>,
        configure: impl FnOnce(EntityTypeBuilder) -> EntityTypeBuilder,
    ) -> Self {
        self.entities.push(configure(EntityTypeBuilder::new(name.into())));
        self
    }

    /// Register a runtime type referenced by name.
    pub fn runtime_type(mut self, runtime_type: RuntimeType) -> Self {
        self.runtime_types.push(runtime_type);
        self
    }

    /// Add a relationship.
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Build the model and check every navigation against its runtime property.
    pub fn build(self) -> QueryResult<Arc<Model>> {
        let mut entity_types: IndexMap<SmolStr, EntityType> = IndexMap::new();
        let mut modes: Vec<RuntimeMode> = Vec::new();

        for builder in self.entities {
            if entity_types.contains_key(&builder.name) {
                return Err(QueryError::invalid_model(format!(
                    "Entity type '{}' is defined twice",
                    builder.name
                )));
            }
            for (i, property) in builder.properties.iter().enumerate() {
                if builder.properties[..i].iter().any(|p| p.name == property.name) {
                    return Err(QueryError::invalid_model(format!(
                        "Property '{}.{}' is defined twice",
                        builder.name, property.name
                    )));
                }
            }
            if builder.key.is_empty() {
                return Err(QueryError::invalid_model(format!(
                    "Entity type '{}' has no primary key",
                    builder.name
                ))
                .with_suggestion("Call key(&[...]) on the entity type"));
            }
            let primary_key = builder
                .key
                .iter()
                .map(|k| {
                    builder
                        .properties
                        .iter()
                        .position(|p| &p.name == k)
                        .ok_or_else(|| QueryError::member_not_found(builder.name.as_str(), k.as_str()))
                })
                .collect::<QueryResult<Vec<_>>>()?;

            let runtime_type = match &builder.runtime {
                RuntimeMode::Derived => Some(builder.name.clone()),
                RuntimeMode::Shadow => None,
                RuntimeMode::Named(name) => Some(name.clone()),
            };
            modes.push(builder.runtime.clone());

            entity_types.insert(
                builder.name.clone(),
                EntityType {
                    name: builder.name,
                    table: builder.table,
                    properties: builder.properties,
                    primary_key,
                    runtime_type,
                    navigations: Vec::new(),
                    foreign_keys: Vec::new(),
                    referencing_keys: Vec::new(),
                },
            );
        }

        let mut foreign_keys = Vec::new();
        let mut navigations = Vec::new();

        for rel in self.relationships {
            let principal = entity_types
                .get(&rel.principal)
                .ok_or_else(|| QueryError::entity_type_not_found(rel.principal.as_str()))?;
            let dependent = entity_types
                .get(&rel.dependent)
                .ok_or_else(|| QueryError::entity_type_not_found(rel.dependent.as_str()))?;

            let principal_key: Vec<SmolStr> =
                principal.primary_key().map(|p| p.name.clone()).collect();
            if rel.foreign_key.len() != principal_key.len() {
                return Err(QueryError::invalid_model(format!(
                    "Foreign key {:?} on '{}' does not match the key of '{}'",
                    rel.foreign_key, rel.dependent, rel.principal
                )));
            }
            for property in &rel.foreign_key {
                if dependent.property(property).is_none() {
                    return Err(QueryError::member_not_found(rel.dependent.as_str(), property.as_str()));
                }
            }

            let fk_id = ForeignKeyId(foreign_keys.len());
            let mut fk = ForeignKey {
                id: fk_id,
                dependent: rel.dependent.clone(),
                dependent_properties: rel.foreign_key,
                principal: rel.principal.clone(),
                principal_key,
                is_unique: rel.unique,
                dependent_to_principal: None,
                principal_to_dependent: None,
            };

            if let Some(name) = rel.dependent_to_principal {
                let id = NavigationId(navigations.len());
                declare_navigation(&mut entity_types, &navigations, &rel.dependent, &name, id)?;
                navigations.push(Navigation::new(id, name, fk_id, true));
                fk.dependent_to_principal = Some(id);
            }
            if let Some(name) = rel.principal_to_dependent {
                let id = NavigationId(navigations.len());
                declare_navigation(&mut entity_types, &navigations, &rel.principal, &name, id)?;
                navigations.push(Navigation::new(id, name, fk_id, false));
                fk.principal_to_dependent = Some(id);
            }

            if let Some(et) = entity_types.get_mut(&rel.dependent) {
                et.foreign_keys.push(fk_id);
            }
            if let Some(et) = entity_types.get_mut(&rel.principal) {
                et.referencing_keys.push(fk_id);
            }
            foreign_keys.push(fk);
        }

        let mut runtime_types: IndexMap<SmolStr, RuntimeType> = IndexMap::new();
        for rt in self.runtime_types {
            runtime_types.insert(SmolStr::new(rt.name()), rt);
        }

        for (et, mode) in entity_types.values().zip(&modes) {
            match mode {
                RuntimeMode::Shadow => {}
                RuntimeMode::Named(name) => {
                    if !runtime_types.contains_key(name) {
                        return Err(QueryError::invalid_model(format!(
                            "Entity type '{}' uses unknown runtime type '{}'",
                            et.name, name
                        )));
                    }
                }
                RuntimeMode::Derived => {
                    if runtime_types.contains_key(&et.name) {
                        return Err(QueryError::invalid_model(format!(
                            "Runtime type '{}' is already registered",
                            et.name
                        ))
                        .with_suggestion("Use runtime_type(..) on the entity type to reference it"));
                    }
                    let derived = derive_runtime_type(et, &entity_types, &foreign_keys, &navigations);
                    runtime_types.insert(et.name.clone(), derived);
                }
            }
        }

        let model = Model {
            entity_types,
            runtime_types,
            foreign_keys,
            navigations,
        };

        for navigation in &model.navigations {
            let source = navigation.declaring_entity_type(&model);
            if source.is_shadow() {
                continue;
            }
            let target = navigation.target_type(&model);
            let property = Navigation::get_runtime_property(&model, navigation.name(), source, target, true)?;
            Navigation::is_compatible(
                &model,
                navigation.name(),
                property,
                source,
                target,
                Some(navigation.is_collection(&model)),
                true,
            )?;
        }

        debug!(
            entity_types = model.entity_types.len(),
            navigations = model.navigations.len(),
            "model built"
        );
        Ok(Arc::new(model))
    }
}

fn declare_navigation(
    entity_types: &mut IndexMap<SmolStr, EntityType>,
    navigations: &[Navigation],
    declaring: &SmolStr,
    name: &SmolStr,
    id: NavigationId,
) -> QueryResult<()> {
    let Some(et) = entity_types.get_mut(declaring) else {
        return Err(QueryError::entity_type_not_found(declaring.as_str()));
    };
    let clashes_with_navigation = et
        .navigations
        .iter()
        .any(|existing| navigations[existing.0].name() == name.as_str());
    if et.property(name).is_some() || clashes_with_navigation {
        return Err(QueryError::invalid_model(format!(
            "'{}.{}' is already defined",
            declaring, name
        )));
    }
    et.navigations.push(id);
    Ok(())
}

fn derive_runtime_type(
    et: &EntityType,
    entity_types: &IndexMap<SmolStr, EntityType>,
    foreign_keys: &[ForeignKey],
    navigations: &[Navigation],
) -> RuntimeType {
    let mut runtime = RuntimeType::new(et.name.clone());
    for property in &et.properties {
        runtime = runtime.scalar(property.name.clone(), property.kind);
    }
    for id in &et.navigations {
        let navigation = &navigations[id.0];
        let fk = &foreign_keys[navigation.foreign_key.0];
        let target_name = if navigation.points_to_principal {
            &fk.principal
        } else {
            &fk.dependent
        };
        let target = entity_types
            .get(target_name)
            .and_then(|t| t.runtime_type.clone())
            .unwrap_or_else(|| target_name.clone());

        runtime = if !navigation.points_to_principal && !fk.is_unique {
            runtime.collection(navigation.name.clone(), target)
        } else {
            runtime.reference(navigation.name.clone(), target)
        };
    }
    runtime
}
