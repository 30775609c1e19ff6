//! Typed CRUD, execution and trigger operations over one kind of definition.

use super::EngineInner;
use crate::definition::{Definition, DefinitionFilter, Trigger};
use crate::errors::{EngineError, Result};
use crate::execution::{Execution, ExecutionParams};
use crate::store::RecordStore;
use crate::utils::{generate_id, now};
use tracing::{debug, info};

/// Operations on pipelines or workflows, returned by
/// [`Engine::pipelines`](super::Engine::pipelines) and
/// [`Engine::workflows`](super::Engine::workflows).
pub struct DefinitionApi<'a, T: Definition> {
    inner: &'a EngineInner,
    store: &'a RecordStore<T>,
}

impl<T: Definition> std::fmt::Debug for DefinitionApi<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionApi")
            .field("kind", &T::DEFINITION_KIND)
            .field("count", &self.store.len())
            .finish()
    }
}

impl<'a, T: Definition> DefinitionApi<'a, T> {
    pub(crate) fn new(inner: &'a EngineInner, store: &'a RecordStore<T>) -> Self {
        Self { inner, store }
    }

    /// Validates and stores a new definition.
    ///
    /// Assigns the ID, audit fields, a default timeout and IDs for nested
    /// nodes. The status the caller set is kept.
    pub fn create(&self, mut definition: T, actor: &str) -> Result<T> {
        definition.validate(&self.inner.handlers)?;

        let created = now();
        let default_timeout = self.inner.config.default_timeout_secs;
        let meta = definition.meta_mut();
        meta.id = generate_id();
        meta.created_at = created;
        meta.updated_at = created;
        meta.created_by = actor.to_string();
        meta.updated_by = actor.to_string();
        meta.timeout_secs.get_or_insert(default_timeout);
        definition.assign_nested_ids();

        self.store.insert(definition.clone())?;
        info!(
            kind = %T::DEFINITION_KIND,
            definition_id = %definition.meta().id,
            name = %definition.meta().name,
            "Definition created"
        );
        Ok(definition)
    }

    /// Returns a definition.
    pub fn get(&self, id: &str) -> Result<T> {
        self.store.get(id)
    }

    /// Replaces a definition.
    ///
    /// The ID and creation fields of the stored version are kept; everything
    /// else, triggers included, comes from `definition`.
    pub fn update(&self, id: &str, mut definition: T, actor: &str) -> Result<T> {
        definition.validate(&self.inner.handlers)?;

        let (created_at, created_by) = self
            .store
            .read(id, |d| (d.meta().created_at, d.meta().created_by.clone()))?;
        let default_timeout = self.inner.config.default_timeout_secs;
        let meta = definition.meta_mut();
        meta.id = id.to_string();
        meta.created_at = created_at;
        meta.created_by = created_by;
        meta.updated_at = now();
        meta.updated_by = actor.to_string();
        meta.timeout_secs.get_or_insert(default_timeout);
        definition.assign_nested_ids();

        let stored = definition.clone();
        self.store.update(id, move |d| *d = stored)?;
        debug!(kind = %T::DEFINITION_KIND, definition_id = %id, "Definition updated");
        Ok(definition)
    }

    /// Deletes a definition and its triggers. Past executions are kept.
    pub fn delete(&self, id: &str) -> Result<T> {
        let removed = self.store.remove(id)?;
        info!(kind = %T::DEFINITION_KIND, definition_id = %id, "Definition deleted");
        Ok(removed)
    }

    /// Lists definitions matching `filter`, newest first.
    #[must_use]
    pub fn list(&self, filter: &DefinitionFilter) -> Vec<T> {
        let mut definitions = self.store.filter(|d| filter.matches(d.meta()));
        definitions.sort_by(|a, b| {
            b.meta()
                .created_at
                .cmp(&a.meta().created_at)
                .then_with(|| b.meta().id.cmp(&a.meta().id))
        });
        filter.page.apply(definitions)
    }

    /// Starts a run of an active definition.
    ///
    /// Returns the pending execution, or `QueueFull` if the queue is at
    /// capacity, in which case the stored execution is already `Failure`.
    pub fn execute(&self, id: &str, params: ExecutionParams) -> Result<Execution> {
        self.inner.start(self.store, id, params, None)
    }

    /// Attaches a trigger, assigning it an ID if it has none.
    pub fn register_trigger(&self, definition_id: &str, mut trigger: Trigger) -> Result<Trigger> {
        if trigger.id.is_empty() {
            trigger.id = generate_id();
        }
        let registered = trigger.clone();
        self.store.update(definition_id, move |d| {
            let meta = d.meta_mut();
            if meta.triggers.iter().any(|t| t.id == trigger.id) {
                return Err(EngineError::AlreadyExists {
                    kind: "trigger",
                    id: trigger.id,
                });
            }
            meta.triggers.push(trigger);
            meta.updated_at = now();
            Ok(())
        })??;
        debug!(definition_id = %definition_id, trigger_id = %registered.id, "Trigger registered");
        Ok(registered)
    }

    /// Detaches a trigger.
    pub fn unregister_trigger(&self, definition_id: &str, trigger_id: &str) -> Result<Trigger> {
        let removed = self.store.update(definition_id, |d| {
            let meta = d.meta_mut();
            let index = meta
                .triggers
                .iter()
                .position(|t| t.id == trigger_id)
                .ok_or_else(|| EngineError::not_found("trigger", trigger_id))?;
            meta.updated_at = now();
            Ok::<_, EngineError>(meta.triggers.remove(index))
        })??;
        debug!(definition_id = %definition_id, trigger_id = %trigger_id, "Trigger unregistered");
        Ok(removed)
    }
}
