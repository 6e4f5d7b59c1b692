//! The identity map and navigation fixup.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::entity::{EntityObject, EntityRef};
use super::key::EntityKey;
use crate::error::{QueryError, QueryResult};
use crate::metadata::{ForeignKey, Model};

/// Change-tracking state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Loaded from the store and not modified.
    Unchanged,
    /// New, not yet saved.
    Added,
    /// Loaded and modified.
    Modified,
    /// Marked for deletion.
    Deleted,
}

/// One identity map entry.
#[derive(Debug, Clone)]
pub struct TrackedEntry {
    /// The tracked instance.
    pub entity: EntityRef,
    /// Its state.
    pub state: EntityState,
}

/// Registry guaranteeing one tracked instance per entity key.
///
/// A unit of work outlives the queries that feed it. It is meant to be used
/// by one query execution at a time.
#[derive(Debug)]
pub struct UnitOfWork {
    model: Arc<Model>,
    entries: Mutex<IndexMap<EntityKey, TrackedEntry>>,
}

impl UnitOfWork {
    /// Create an empty unit of work over a model.
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// The model entities are keyed against.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Compute the identity key of an instance.
    pub fn key_of(&self, entity: &EntityObject) -> QueryResult<Option<EntityKey>> {
        let et = self.model.require_entity_type(entity.entity_type())?;
        let key: Vec<_> = et.primary_key().map(|p| entity.get(&p.name)).collect();
        Ok(EntityKey::new(et.name(), &key))
    }

    /// The tracked instance for a key.
    pub fn try_get(&self, key: &EntityKey) -> Option<EntityRef> {
        self.entries.lock().get(key).map(|e| e.entity.clone())
    }

    /// State of an instance, `None` when not tracked.
    pub fn state(&self, entity: &EntityRef) -> Option<EntityState> {
        let key = self.key_of(entity).ok().flatten()?;
        self.entries
            .lock()
            .get(&key)
            .filter(|e| Arc::ptr_eq(&e.entity, entity))
            .map(|e| e.state)
    }

    /// Whether this exact instance is tracked.
    pub fn is_tracked(&self, entity: &EntityRef) -> bool {
        self.state(entity).is_some()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of every entry, in tracking order.
    pub fn entries(&self) -> Vec<TrackedEntry> {
        self.entries.lock().values().cloned().collect()
    }

    /// Track an entity unchanged.
    pub fn attach(&self, entity: EntityRef) -> QueryResult<EntityRef> {
        self.start_tracking(entity, EntityState::Unchanged)
    }

    /// Track an instance and fix up links with already tracked entities.
    ///
    /// If an instance with the same key is tracked already, that instance is
    /// returned and `entity` is not tracked.
    pub fn start_tracking(&self, entity: EntityRef, state: EntityState) -> QueryResult<EntityRef> {
        let key = self.key_of(&entity)?.ok_or_else(|| {
            QueryError::invalid_state(format!(
                "Cannot track an instance of '{}' with a null key",
                entity.entity_type()
            ))
        })?;

        {
            let mut entries = self.entries.lock();
            if let Some(existing) = entries.get(&key) {
                return Ok(existing.entity.clone());
            }
            entries.insert(
                key,
                TrackedEntry {
                    entity: entity.clone(),
                    state,
                },
            );
        }

        trace!(entity_type = %entity.entity_type(), "tracking entity");
        self.fixup(&entity)?;
        Ok(entity)
    }

    /// Change the state of a tracked instance.
    pub fn set_state(&self, entity: &EntityRef, state: EntityState) -> QueryResult<()> {
        let key = self
            .key_of(entity)?
            .ok_or_else(|| QueryError::invalid_state("Entity has a null key"))?;
        match self.entries.lock().get_mut(&key) {
            Some(entry) if Arc::ptr_eq(&entry.entity, entity) => {
                entry.state = state;
                Ok(())
            }
            _ => Err(QueryError::invalid_state(format!(
                "The '{}' instance is not tracked",
                entity.entity_type()
            ))),
        }
    }

    /// Stop tracking everything and release navigation links between instances.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut *self.entries.lock());
        for entry in entries.values() {
            entry.entity.clear_navigations();
        }
    }

    fn fixup(&self, entity: &EntityRef) -> QueryResult<()> {
        let model = self.model.clone();
        let et = model.require_entity_type(entity.entity_type())?;

        for fk_id in et.foreign_key_ids() {
            let fk = model.foreign_key(*fk_id);
            let key_values = entity.get_many(fk.dependent_properties());
            let Some(principal_key) = EntityKey::new(fk.principal_name(), &key_values) else {
                continue;
            };
            if let Some(principal) = self.try_get(&principal_key) {
                link(&model, fk, &principal, entity)?;
            }
        }

        for fk_id in et.referencing_key_ids() {
            let fk = model.foreign_key(*fk_id);
            let principal_values = entity.get_many(fk.principal_key());
            let dependents: Vec<EntityRef> = self
                .entries
                .lock()
                .values()
                .filter(|e| e.entity.entity_type() == fk.dependent_name())
                .filter(|e| {
                    e.entity
                        .get_many(fk.dependent_properties())
                        .iter()
                        .zip(&principal_values)
                        .all(|(a, b)| !a.is_null() && a.loose_eq(b))
                })
                .map(|e| e.entity.clone())
                .collect();
            for dependent in dependents {
                link(&model, fk, entity, &dependent)?;
            }
        }
        Ok(())
    }
}

/// Connect a principal and a dependent through both navigations of `fk`.
pub(crate) fn link(
    model: &Model,
    fk: &ForeignKey,
    principal: &EntityRef,
    dependent: &EntityRef,
) -> QueryResult<()> {
    if let Some(id) = fk.dependent_to_principal() {
        dependent.set_reference(model.navigation(id).name(), Some(principal.clone()));
    }
    if let Some(id) = fk.principal_to_dependent() {
        let navigation = model.navigation(id);
        match navigation.collection_accessor(model) {
            Some(accessor) => {
                if !accessor.contains(principal, dependent) {
                    accessor.add(principal, dependent.clone())?;
                }
            }
            None => principal.set_reference(navigation.name(), Some(dependent.clone())),
        }
    }
    Ok(())
}
