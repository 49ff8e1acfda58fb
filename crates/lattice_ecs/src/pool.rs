//! Sparse-set component pools.
//!
//! One [`Pool`] stores every instance of a single component type. Presence
//! is an O(1) sparse lookup by entity id; the payloads live in a packed
//! dense array that iterates without gaps. Removal swaps the victim with the
//! last dense element, so dense order is not stable across removals.
//!
//! All operations take `&self`: the arrays sit behind a `RefCell`, and no
//! borrow is ever held while subscribers run. That is what makes it safe to
//! add or remove components from within a handler observing this very pool.

use std::cell::RefCell;
use std::rc::Rc;

use lattice_component::{ComponentDefinition, Entity};
use serde_json::Value;

use crate::error::EcsError;
use crate::signal::Signal;

/// Shared handle to a pool. Queries and views keep pools alive through
/// these; the registry owns the canonical ones.
pub type PoolHandle = Rc<Pool>;

/// The three observable pool events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// A component was inserted.
    Added,
    /// A component's payload was replaced in place.
    Updated,
    /// A component is being removed.
    Removed,
}

#[derive(Default)]
struct PoolInner {
    /// `id -> dense slot`, `None` when the id has no component here.
    sparse: Vec<Option<u32>>,
    /// Packed entities; `entities[sparse[id]]` is the entity for `id`.
    entities: Vec<Entity>,
    /// Payloads, parallel to `entities`.
    values: Vec<Value>,
}

impl PoolInner {
    fn slot_of(&self, entity: Entity) -> Option<usize> {
        let slot = (*self.sparse.get(entity.id() as usize)?)? as usize;
        (self.entities[slot] == entity).then_some(slot)
    }

    fn insert(&mut self, entity: Entity, value: Value) {
        let idx = entity.id() as usize;
        if self.sparse.len() <= idx {
            self.sparse.resize(idx + 1, None);
        }
        self.sparse[idx] = Some(self.entities.len() as u32);
        self.entities.push(entity);
        self.values.push(value);
    }

    fn swap_remove(&mut self, slot: usize) {
        let last = self.entities.len() - 1;
        let removed = self.entities[slot];
        self.entities.swap(slot, last);
        self.values.swap(slot, last);
        self.entities.pop();
        self.values.pop();
        if slot != last {
            let moved = self.entities[slot];
            self.sparse[moved.id() as usize] = Some(slot as u32);
        }
        self.sparse[removed.id() as usize] = None;
    }
}

/// Sparse-set storage for all instances of one component type, with
/// synchronous `added` / `updated` / `removed` multicast events.
pub struct Pool {
    definition: ComponentDefinition,
    inner: RefCell<PoolInner>,
    on_added: Signal,
    on_updated: Signal,
    on_removed: Signal,
}

impl Pool {
    /// Create an empty pool for the given definition.
    #[must_use]
    pub fn new(definition: ComponentDefinition) -> Self {
        Self {
            definition,
            inner: RefCell::new(PoolInner::default()),
            on_added: Signal::new(),
            on_updated: Signal::new(),
            on_removed: Signal::new(),
        }
    }

    /// The component definition this pool stores.
    #[must_use]
    pub fn definition(&self) -> &ComponentDefinition {
        &self.definition
    }

    /// The component name this pool stores.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Number of components in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entities.len()
    }

    /// Whether the pool holds no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `entity` has a component in this pool.
    #[must_use]
    pub fn has(&self, entity: Entity) -> bool {
        self.inner.borrow().slot_of(entity).is_some()
    }

    /// The payload stored for `entity`.
    ///
    /// Returns a clone: payloads never escape the pool by reference, so a
    /// caller can hold the result across further mutations.
    pub fn get(&self, entity: Entity) -> Result<Value, EcsError> {
        let inner = self.inner.borrow();
        let slot = inner.slot_of(entity).ok_or_else(|| self.not_present(entity))?;
        Ok(inner.values[slot].clone())
    }

    /// Insert a component for `entity`, firing `added`.
    pub fn insert(&self, entity: Entity, value: Value) -> Result<(), EcsError> {
        if self.has(entity) {
            return Err(EcsError::AlreadyPresent {
                entity,
                component: self.name().to_string(),
            });
        }
        if !self.definition.accepts(&value) {
            return Err(EcsError::TypeMismatch {
                component: self.name().to_string(),
            });
        }
        self.store_and_announce(entity, value);
        Ok(())
    }

    /// Insert a payload copied from a pool of the same definition, firing
    /// `added`. Skips the validator — the payload was accepted once already.
    pub(crate) fn insert_copied(&self, entity: Entity, value: Value) {
        debug_assert!(!self.has(entity));
        self.store_and_announce(entity, value);
    }

    fn store_and_announce(&self, entity: Entity, value: Value) {
        let announced = value.clone();
        self.inner.borrow_mut().insert(entity, value);
        self.on_added.emit(entity, &announced);
    }

    /// Replace the payload for `entity` in place, firing `updated`.
    ///
    /// The dense slot does not move.
    pub fn replace(&self, entity: Entity, value: Value) -> Result<(), EcsError> {
        if !self.has(entity) {
            return Err(self.not_present(entity));
        }
        // Validator runs with no borrow held — it is user code.
        if !self.definition.accepts(&value) {
            return Err(EcsError::TypeMismatch {
                component: self.name().to_string(),
            });
        }
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(slot) = inner.slot_of(entity) {
                inner.values[slot] = value.clone();
            }
        }
        self.on_updated.emit(entity, &value);
        Ok(())
    }

    /// Remove the component for `entity`, returning its payload.
    ///
    /// `removed` fires *before* the physical swap-remove, so handlers can
    /// still `get` the outgoing value. A handler that removes the same
    /// entity reentrantly wins; the outer call then finds nothing left to do.
    pub fn remove(&self, entity: Entity) -> Result<Value, EcsError> {
        let value = self.get(entity)?;
        self.on_removed.emit(entity, &value);

        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.slot_of(entity) {
            inner.swap_remove(slot);
        }
        Ok(value)
    }

    /// Remove every component, firing `removed` for each.
    pub fn clear(&self) {
        loop {
            // Ends the borrow before `remove` re-enters the cell.
            let last = self.inner.borrow().entities.last().copied();
            match last {
                Some(entity) => {
                    let _ = self.remove(entity);
                }
                None => break,
            }
        }
    }

    /// Snapshot of the dense entity array.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.borrow().entities.clone()
    }

    /// Snapshot of the dense `(entity, payload)` pairs.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Entity, Value)> {
        let inner = self.inner.borrow();
        inner
            .entities
            .iter()
            .copied()
            .zip(inner.values.iter().cloned())
            .collect()
    }

    /// The `added` notification point.
    #[must_use]
    pub fn on_added(&self) -> &Signal {
        &self.on_added
    }

    /// The `updated` notification point.
    #[must_use]
    pub fn on_updated(&self) -> &Signal {
        &self.on_updated
    }

    /// The `removed` notification point. Fired before the physical removal;
    /// also carries the outgoing payload.
    #[must_use]
    pub fn on_removed(&self) -> &Signal {
        &self.on_removed
    }

    /// Signal accessor by event kind.
    #[must_use]
    pub fn signal(&self, event: PoolEvent) -> &Signal {
        match event {
            PoolEvent::Added => &self.on_added,
            PoolEvent::Updated => &self.on_updated,
            PoolEvent::Removed => &self.on_removed,
        }
    }

    fn not_present(&self, entity: Entity) -> EcsError {
        EcsError::NotPresent {
            entity,
            component: self.name().to_string(),
        }
    }
}
