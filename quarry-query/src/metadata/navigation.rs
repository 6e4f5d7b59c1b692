//! Foreign keys, navigations and runtime-shape compatibility rules.

use std::fmt;
use std::sync::{Arc, OnceLock};

use smol_str::SmolStr;
use tracing::trace;

use super::accessor::CollectionAccessor;
use super::entity_type::EntityType;
use super::runtime::{PropertyType, RuntimeProperty};
use super::{ForeignKeyId, Model, NavigationId};
use crate::error::{ErrorCode, QueryError, QueryResult};

/// Relationship between a principal and a dependent entity type.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub(crate) id: ForeignKeyId,
    pub(crate) dependent: SmolStr,
    pub(crate) dependent_properties: Vec<SmolStr>,
    pub(crate) principal: SmolStr,
    pub(crate) principal_key: Vec<SmolStr>,
    pub(crate) is_unique: bool,
    pub(crate) dependent_to_principal: Option<NavigationId>,
    pub(crate) principal_to_dependent: Option<NavigationId>,
}

impl ForeignKey {
    /// Identifier inside the model.
    pub fn id(&self) -> ForeignKeyId {
        self.id
    }

    /// Entity type holding the foreign key columns.
    pub fn dependent_type<'m>(&self, model: &'m Model) -> &'m EntityType {
        model.entity_type_unchecked(&self.dependent)
    }

    /// Entity type being referenced.
    pub fn principal_type<'m>(&self, model: &'m Model) -> &'m EntityType {
        model.entity_type_unchecked(&self.principal)
    }

    /// Name of the dependent entity type.
    pub fn dependent_name(&self) -> &str {
        &self.dependent
    }

    /// Name of the principal entity type.
    pub fn principal_name(&self) -> &str {
        &self.principal
    }

    /// Foreign key properties on the dependent, in key order.
    pub fn dependent_properties(&self) -> &[SmolStr] {
        &self.dependent_properties
    }

    /// Referenced key properties on the principal, in key order.
    pub fn principal_key(&self) -> &[SmolStr] {
        &self.principal_key
    }

    /// Whether at most one dependent exists per principal.
    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    /// Navigation from the dependent to the principal.
    pub fn dependent_to_principal(&self) -> Option<NavigationId> {
        self.dependent_to_principal
    }

    /// Navigation from the principal to the dependent(s).
    pub fn principal_to_dependent(&self) -> Option<NavigationId> {
        self.principal_to_dependent
    }
}

/// A typed edge from a declaring entity type to a target entity type.
#[derive(Debug)]
pub struct Navigation {
    pub(crate) id: NavigationId,
    pub(crate) name: SmolStr,
    pub(crate) foreign_key: ForeignKeyId,
    pub(crate) points_to_principal: bool,
    collection_accessor: OnceLock<Arc<CollectionAccessor>>,
}

impl Navigation {
    pub(crate) fn new(
        id: NavigationId,
        name: SmolStr,
        foreign_key: ForeignKeyId,
        points_to_principal: bool,
    ) -> Self {
        Self {
            id,
            name,
            foreign_key,
            points_to_principal,
            collection_accessor: OnceLock::new(),
        }
    }

    /// Identifier inside the model.
    pub fn id(&self) -> NavigationId {
        self.id
    }

    /// Navigation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this navigation goes from the dependent to the principal.
    pub fn is_dependent_to_principal(&self) -> bool {
        self.points_to_principal
    }

    /// The owning foreign key.
    pub fn foreign_key<'m>(&self, model: &'m Model) -> &'m ForeignKey {
        model.foreign_key(self.foreign_key)
    }

    /// Entity type declaring the navigation, derived from the foreign key.
    pub fn declaring_entity_type<'m>(&self, model: &'m Model) -> &'m EntityType {
        let fk = self.foreign_key(model);
        if self.points_to_principal {
            fk.dependent_type(model)
        } else {
            fk.principal_type(model)
        }
    }

    /// Entity type on the other end.
    pub fn target_type<'m>(&self, model: &'m Model) -> &'m EntityType {
        let fk = self.foreign_key(model);
        if self.points_to_principal {
            fk.principal_type(model)
        } else {
            fk.dependent_type(model)
        }
    }

    /// Whether the navigation holds many targets.
    pub fn is_collection(&self, model: &Model) -> bool {
        !self.points_to_principal && !self.foreign_key(model).is_unique
    }

    /// The navigation going the opposite way on the same foreign key.
    pub fn find_inverse<'m>(&self, model: &'m Model) -> Option<&'m Navigation> {
        let fk = self.foreign_key(model);
        let inverse = if self.points_to_principal {
            fk.principal_to_dependent
        } else {
            fk.dependent_to_principal
        };
        inverse.map(|id| model.navigation(id))
    }

    /// `Declaring.Name` form.
    pub fn display(&self, model: &Model) -> String {
        format!("{}.{}", self.declaring_entity_type(model).name(), self.name)
    }

    /// The cached collection accessor, or `None` for reference navigations.
    ///
    /// Concurrent first callers may each build an accessor; the first one
    /// stored is kept and every caller observes it.
    pub fn collection_accessor(&self, model: &Model) -> Option<Arc<CollectionAccessor>> {
        if !self.is_collection(model) {
            return None;
        }
        if let Some(accessor) = self.collection_accessor.get() {
            return Some(accessor.clone());
        }

        let computed = Arc::new(CollectionAccessor::new(model, self));
        if self.collection_accessor.set(computed).is_err() {
            trace!(navigation = %self.name, "collection accessor initialized concurrently");
        }
        self.collection_accessor.get().cloned()
    }

    /// Find the runtime property backing a navigation and check it can hold `target`.
    ///
    /// Returns `Ok(None)` when incompatible and `should_throw` is false.
    pub fn get_runtime_property<'m>(
        model: &'m Model,
        navigation_name: &str,
        source: &EntityType,
        target: &EntityType,
        should_throw: bool,
    ) -> QueryResult<Option<&'m RuntimeProperty>> {
        let property = source
            .runtime_type()
            .and_then(|rt| model.find_runtime_property(rt, navigation_name));

        if !Self::is_compatible(model, navigation_name, property, source, target, None, should_throw)? {
            return Ok(None);
        }
        Ok(property)
    }

    /// Check that `property` can navigate from `source` to `target`.
    ///
    /// `should_be_collection` forces the collection (`Some(true)`) or
    /// single-valued (`Some(false)`) interpretation. On mismatch this either
    /// returns `Ok(false)` or, when `should_throw` is set, an error.
    pub fn is_compatible(
        model: &Model,
        navigation_name: &str,
        property: Option<&RuntimeProperty>,
        source: &EntityType,
        target: &EntityType,
        should_be_collection: Option<bool>,
        should_throw: bool,
    ) -> QueryResult<bool> {
        let (Some(property), Some(source_runtime)) = (property, source.runtime_type()) else {
            return fail(should_throw, || no_runtime_navigation(navigation_name, source.display_name()));
        };

        let Some(target_runtime) = target.runtime_type() else {
            return fail(should_throw, || {
                QueryError::incompatible_navigation(
                    ErrorCode::NavigationToShadowEntity,
                    navigation_name,
                    format!(
                        "The navigation '{}' on '{}' targets the shadow entity type '{}'",
                        navigation_name,
                        source.display_name(),
                        target.display_name()
                    ),
                )
            });
        };

        Self::is_runtime_compatible(
            model,
            property,
            source_runtime,
            target_runtime,
            should_be_collection,
            should_throw,
        )
    }

    /// The runtime-type half of [`is_compatible`](Self::is_compatible).
    pub fn is_runtime_compatible(
        model: &Model,
        property: &RuntimeProperty,
        source_runtime: &str,
        target_runtime: &str,
        should_be_collection: Option<bool>,
        should_throw: bool,
    ) -> QueryResult<bool> {
        if !model.is_assignable_from(&property.declaring_type, source_runtime) {
            return fail(should_throw, || no_runtime_navigation(&property.name, source_runtime));
        }

        let element = property.ty.sequence_element();
        let element_fits = element.is_some_and(|e| model.is_assignable_from(e, target_runtime));

        if should_be_collection == Some(false) || !element_fits {
            if should_be_collection == Some(true) {
                return fail(should_throw, || {
                    QueryError::incompatible_navigation(
                        ErrorCode::IncompatibleNavigation,
                        property.name.as_str(),
                        format!(
                            "The collection navigation '{}' on '{}' has type '{}' which cannot hold '{}'",
                            property.name,
                            source_runtime,
                            property.ty.display_name(),
                            target_runtime
                        ),
                    )
                });
            }

            let single_fits = match &property.ty {
                PropertyType::Reference(ty) => model.is_assignable_from(ty, target_runtime),
                _ => false,
            };
            if !single_fits {
                return fail(should_throw, || {
                    QueryError::incompatible_navigation(
                        ErrorCode::IncompatibleNavigation,
                        property.name.as_str(),
                        format!(
                            "The navigation '{}' on '{}' has type '{}' which is not assignable from '{}'",
                            property.name,
                            source_runtime,
                            property.ty.display_name(),
                            target_runtime
                        ),
                    )
                });
            }
        }

        Ok(true)
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn fail(should_throw: bool, err: impl FnOnce() -> QueryError) -> QueryResult<bool> {
    if should_throw { Err(err()) } else { Ok(false) }
}

fn no_runtime_navigation(navigation: &str, source: &str) -> QueryError {
    QueryError::navigation_not_found(source, navigation)
        .with_help("The runtime type has no property with this name")
}
