//! Identity resolution and include attachment for materialized rows.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::entity::{EntityObject, EntityRef};
use super::key::EntityKey;
use super::unit_of_work::EntityState;
use crate::error::QueryResult;
use crate::executor::BoxFuture;
use crate::include::{AsyncRelatedEntitiesLoader, RelatedEntitiesLoader};
use crate::metadata::{EntityType, Model, Navigation, NavigationId};
use crate::query::QueryContext;
use crate::value::{Row, Value};

/// Resolves rows to entity instances and attaches included entities.
///
/// Tracked entities resolve through the unit of work. Untracked entities
/// resolve through a per-execution cache while an include scope is open, so
/// a principal reached twice in one include graph is one instance.
#[derive(Debug, Default)]
pub struct QueryBuffer {
    untracked: Mutex<HashMap<EntityKey, EntityRef>>,
}

impl QueryBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve values in property order to an instance.
    ///
    /// Returns `None` when the key is null (no entity on this row).
    pub fn get_entity(
        &self,
        context: &QueryContext,
        entity_type: &EntityType,
        values: &[Value],
        requires_tracking: bool,
    ) -> QueryResult<Option<EntityRef>> {
        let Some(key) = EntityKey::from_row(entity_type, values) else {
            return Ok(None);
        };

        if requires_tracking {
            let unit_of_work = context.unit_of_work();
            if let Some(existing) = unit_of_work.try_get(&key) {
                return Ok(Some(existing));
            }
            let entity = EntityObject::materialize(entity_type, values)?;
            return unit_of_work
                .start_tracking(entity, EntityState::Unchanged)
                .map(Some);
        }

        if context.include_scope_depth() == 0 {
            return EntityObject::materialize(entity_type, values).map(Some);
        }

        let mut untracked = self.untracked.lock();
        if let Some(existing) = untracked.get(&key) {
            return Ok(Some(existing.clone()));
        }
        let entity = EntityObject::materialize(entity_type, values)?;
        untracked.insert(key, entity.clone());
        Ok(Some(entity))
    }

    /// Load and attach the entities reached from `entity` along `path`.
    ///
    /// `loaders[i]` loads `path[i]`. Collections are reset and then receive
    /// every loaded entity in loader order; references receive the first one.
    pub fn include(
        &self,
        context: &QueryContext,
        entity: Option<&EntityRef>,
        path: &[NavigationId],
        loaders: &mut [Box<dyn RelatedEntitiesLoader>],
        requires_tracking: bool,
    ) -> QueryResult<()> {
        let (Some(entity), Some((&first, rest_path))) = (entity, path.split_first()) else {
            return Ok(());
        };
        let Some((loader, rest_loaders)) = loaders.split_first_mut() else {
            return Ok(());
        };

        let model = context.model().clone();
        let navigation = model.navigation(first);
        let related = match navigation_key(&model, navigation, entity) {
            Some(key) => {
                let rows = loader.load(context, &key)?;
                self.materialize_related(context, &model, navigation, &rows, requires_tracking)?
            }
            None => Vec::new(),
        };

        attach(&model, navigation, entity, &related, requires_tracking)?;

        for item in &related {
            self.include(context, Some(item), rest_path, rest_loaders, requires_tracking)?;
        }
        Ok(())
    }

    /// Asynchronous [`include`](Self::include).
    pub fn include_async<'a>(
        &'a self,
        context: &'a QueryContext,
        entity: Option<EntityRef>,
        path: &'a [NavigationId],
        loaders: &'a mut [Box<dyn AsyncRelatedEntitiesLoader>],
        requires_tracking: bool,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, QueryResult<()>> {
        Box::pin(async move {
            let (Some(entity), Some((&first, rest_path))) = (entity, path.split_first()) else {
                return Ok(());
            };
            let Some((loader, rest_loaders)) = loaders.split_first_mut() else {
                return Ok(());
            };

            let model = context.model().clone();
            let navigation = model.navigation(first);
            let related = match navigation_key(&model, navigation, &entity) {
                Some(key) => {
                    let rows = loader.load(context, &key, cancel).await?;
                    self.materialize_related(context, &model, navigation, &rows, requires_tracking)?
                }
                None => Vec::new(),
            };

            attach(&model, navigation, &entity, &related, requires_tracking)?;

            for item in related {
                self.include_async(
                    context,
                    Some(item),
                    rest_path,
                    &mut *rest_loaders,
                    requires_tracking,
                    cancel,
                )
                .await?;
            }
            Ok(())
        })
    }

    /// Forget untracked instances cached for the finished include scope.
    pub(crate) fn clear_scope(&self) {
        self.untracked.lock().clear();
    }

    fn materialize_related(
        &self,
        context: &QueryContext,
        model: &Model,
        navigation: &Navigation,
        rows: &[Row],
        requires_tracking: bool,
    ) -> QueryResult<Vec<EntityRef>> {
        let target = navigation.target_type(model);
        let mut related = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(item) = self.get_entity(context, target, row, requires_tracking)? {
                related.push(item);
            }
        }
        trace!(
            navigation = %navigation.display(model),
            rows = rows.len(),
            entities = related.len(),
            "loaded related entities"
        );
        Ok(related)
    }
}

/// Key values that identify the targets of `navigation` from `entity`.
///
/// Returns `None` when any part is null.
fn navigation_key(model: &Model, navigation: &Navigation, entity: &EntityObject) -> Option<Vec<Value>> {
    let fk = navigation.foreign_key(model);
    let properties = if navigation.is_dependent_to_principal() {
        fk.dependent_properties()
    } else {
        fk.principal_key()
    };
    let key = entity.get_many(properties);
    if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    }
}

fn attach(
    model: &Model,
    navigation: &Navigation,
    entity: &EntityRef,
    related: &[EntityRef],
    requires_tracking: bool,
) -> QueryResult<()> {
    match navigation.collection_accessor(model) {
        Some(accessor) => {
            accessor.clear(entity);
            for item in related {
                accessor.add(entity, item.clone())?;
            }
        }
        None => entity.set_reference(navigation.name(), related.first().cloned()),
    }

    if !requires_tracking {
        return Ok(());
    }
    if let Some(inverse) = navigation.find_inverse(model) {
        let targets: &[EntityRef] = match navigation.collection_accessor(model) {
            Some(_) => related,
            None => related.get(..1).unwrap_or(&[]),
        };
        for item in targets {
            match inverse.collection_accessor(model) {
                Some(accessor) => {
                    if !accessor.contains(item, entity) {
                        accessor.add(item, entity.clone())?;
                    }
                }
                None => item.set_reference(inverse.name(), Some(entity.clone())),
            }
        }
    }
    Ok(())
}
