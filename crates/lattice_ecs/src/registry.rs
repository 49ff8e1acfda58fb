//! The registry: entity lifecycle plus name-keyed component pools.
//!
//! A [`Registry`] owns the [`EntityAllocator`] and one [`Pool`] per defined
//! component type. It is the sole mutator of entity validity and pool
//! membership: every component operation validates entity liveness and
//! definition existence first, then delegates to the owning pool, which
//! fires that pool's events.
//!
//! The whole surface takes `&self` — interior mutability keeps the registry
//! reentrant, so pool-event handlers and view callbacks may freely call back
//! into it mid-operation. `Rc`/`RefCell` interiors also make it `!Send`,
//! which is the single-writer model: one thread mutates one registry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::rc::Rc;

use lattice_component::{ComponentDefinition, Entity, EntityAllocator};
use serde_json::Value;
use tracing::debug;

use crate::error::EcsError;
use crate::pool::{Pool, PoolHandle};

/// Entity lifecycle and component CRUD over name-keyed sparse-set pools.
#[derive(Default)]
pub struct Registry {
    allocator: RefCell<EntityAllocator>,
    pools: RefCell<HashMap<String, PoolHandle>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- Definitions --

    /// Define a component type. Fails with [`EcsError::DuplicateDefinition`]
    /// if the name is already taken.
    pub fn define(&self, definition: ComponentDefinition) -> Result<(), EcsError> {
        let mut pools = self.pools.borrow_mut();
        if pools.contains_key(definition.name()) {
            return Err(EcsError::DuplicateDefinition(definition.name().to_string()));
        }
        debug!(component = definition.name(), "defined component");
        pools.insert(
            definition.name().to_string(),
            Rc::new(Pool::new(definition)),
        );
        Ok(())
    }

    /// Whether a component name has been defined.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.pools.borrow().contains_key(name)
    }

    /// Handle to the pool backing `name`, if defined. This is the raw
    /// surface used by query compilation and the attribute bridge.
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<PoolHandle> {
        self.pools.borrow().get(name).cloned()
    }

    fn pool_or_err(&self, name: &str) -> Result<PoolHandle, EcsError> {
        self.pool(name)
            .ok_or_else(|| EcsError::UnknownComponent(name.to_string()))
    }

    // -- Entity lifecycle --

    /// Create a new entity.
    pub fn create(&self) -> Entity {
        self.allocator.borrow_mut().create()
    }

    /// Recreate the exact identity carried by `entity`.
    ///
    /// If that slot currently holds a live entity it is destroyed first,
    /// components included.
    pub fn create_from(&self, entity: Entity) -> Entity {
        let occupant = self.allocator.borrow().entity_at(entity.id());
        if let Some(current) = occupant {
            // Full destroy: components removed, id freed.
            let _ = self.destroy(current);
        }
        self.allocator.borrow_mut().create_from(entity)
    }

    /// Destroy a live entity.
    ///
    /// Every component the entity holds is removed first (each removal
    /// firing its pool's `removed` event, order unspecified), then the id is
    /// freed. Removal handlers that re-add components to the dying entity
    /// are swept up by the loop, so the destroy is total.
    pub fn destroy(&self, entity: Entity) -> Result<(), EcsError> {
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }

        loop {
            let holding: Vec<PoolHandle> = self
                .pools
                .borrow()
                .values()
                .filter(|pool| pool.has(entity))
                .cloned()
                .collect();
            if holding.is_empty() {
                break;
            }
            for pool in holding {
                // A handler may have beaten us to it; that is fine.
                let _ = pool.remove(entity);
            }
        }

        self.allocator.borrow_mut().destroy(entity);
        Ok(())
    }

    /// Whether `entity` is currently live.
    #[must_use]
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.allocator.borrow().is_valid(entity)
    }

    fn check_valid(&self, entity: Entity) -> Result<(), EcsError> {
        if self.is_valid(entity) {
            Ok(())
        } else {
            Err(EcsError::InvalidEntity(entity))
        }
    }

    /// Number of live entities.
    #[must_use]
    pub fn count_entities(&self) -> u32 {
        self.allocator.borrow().count_live()
    }

    /// Invoke `f` for every live entity.
    ///
    /// Iterates a snapshot and revalidates per entity, so `f` may create or
    /// destroy entities.
    pub fn each<F: FnMut(Entity)>(&self, mut f: F) {
        let mut live = Vec::new();
        self.allocator.borrow().each(|entity| live.push(entity));
        for entity in live {
            if self.is_valid(entity) {
                f(entity);
            }
        }
    }

    // -- Component CRUD --

    /// Add a component to an entity.
    pub fn add(&self, entity: Entity, name: &str, value: Value) -> Result<(), EcsError> {
        self.check_valid(entity)?;
        self.pool_or_err(name)?.insert(entity, value)
    }

    /// Replace an existing component's payload.
    pub fn replace(&self, entity: Entity, name: &str, value: Value) -> Result<(), EcsError> {
        self.check_valid(entity)?;
        self.pool_or_err(name)?.replace(entity, value)
    }

    /// Remove a component, returning its payload.
    pub fn remove(&self, entity: Entity, name: &str) -> Result<Value, EcsError> {
        self.check_valid(entity)?;
        self.pool_or_err(name)?.remove(entity)
    }

    /// The payload of a component on an entity.
    pub fn get(&self, entity: Entity, name: &str) -> Result<Value, EcsError> {
        self.check_valid(entity)?;
        self.pool_or_err(name)?.get(entity)
    }

    /// Add a component unless the entity already has one.
    ///
    /// Returns `true` if the component was added. Liveness and definition
    /// failures still error.
    pub fn try_add(&self, entity: Entity, name: &str, value: Value) -> Result<bool, EcsError> {
        match self.add(entity, name, value) {
            Ok(()) => Ok(true),
            Err(EcsError::AlreadyPresent { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Remove a component if present. Returns `true` if one was removed.
    pub fn try_remove(&self, entity: Entity, name: &str) -> Result<bool, EcsError> {
        match self.remove(entity, name) {
            Ok(_) => Ok(true),
            Err(EcsError::NotPresent { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The existing payload, or `value` after adding it.
    pub fn get_or_add(&self, entity: Entity, name: &str, value: Value) -> Result<Value, EcsError> {
        self.check_valid(entity)?;
        let pool = self.pool_or_err(name)?;
        if pool.has(entity) {
            pool.get(entity)
        } else {
            pool.insert(entity, value.clone())?;
            Ok(value)
        }
    }

    /// Add the component, or replace it if the entity already has one.
    pub fn add_or_replace(&self, entity: Entity, name: &str, value: Value) -> Result<(), EcsError> {
        self.check_valid(entity)?;
        let pool = self.pool_or_err(name)?;
        if pool.has(entity) {
            pool.replace(entity, value)
        } else {
            pool.insert(entity, value)
        }
    }

    // -- Predicates & iteration --

    /// Whether the entity has every named component. Unknown names count as
    /// absent.
    #[must_use]
    pub fn has(&self, entity: Entity, names: &[&str]) -> bool {
        names
            .iter()
            .all(|name| self.pool(name).is_some_and(|pool| pool.has(entity)))
    }

    /// Whether the entity has at least one of the named components.
    #[must_use]
    pub fn any(&self, entity: Entity, names: &[&str]) -> bool {
        names
            .iter()
            .any(|name| self.pool(name).is_some_and(|pool| pool.has(entity)))
    }

    /// Visit component names until `f` breaks.
    ///
    /// With `entity` given, only components present on that entity are
    /// visited; otherwise every defined component is.
    pub fn visit<F>(&self, mut f: F, entity: Option<Entity>)
    where
        F: FnMut(&str) -> ControlFlow<()>,
    {
        let names: Vec<String> = self.pools.borrow().keys().cloned().collect();
        for name in names {
            if let Some(entity) = entity {
                let present = self.pool(&name).is_some_and(|pool| pool.has(entity));
                if !present {
                    continue;
                }
            }
            if f(&name).is_break() {
                break;
            }
        }
    }

    /// Number of instances of a component. Unknown names count zero.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.pool(name).map_or(0, |pool| pool.len())
    }
}

impl Clone for Registry {
    /// Copy allocator state and every pool's dense contents into a fresh
    /// registry.
    ///
    /// Payloads are inserted through the new pools, so their `added` events
    /// fire there; the clone shares no mutable state with the original.
    fn clone(&self) -> Self {
        let copy = Registry {
            allocator: RefCell::new(self.allocator.borrow().clone()),
            pools: RefCell::new(HashMap::new()),
        };

        for (name, pool) in self.pools.borrow().iter() {
            let fresh = Rc::new(Pool::new(pool.definition().clone()));
            for (entity, value) in pool.snapshot() {
                fresh.insert_copied(entity, value);
            }
            copy.pools.borrow_mut().insert(name.clone(), fresh);
        }

        debug!(
            entities = copy.count_entities(),
            components = copy.pools.borrow().len(),
            "cloned registry"
        );
        copy
    }
}
