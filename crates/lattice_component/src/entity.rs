//! Entity identifiers and the versioned allocator.
//!
//! An [`Entity`] is a packed 32-bit value: the low [`ID_BITS`] bits index the
//! allocator's slot table (and every pool's sparse array), the high
//! [`VERSION_BITS`] bits carry the slot's version. The version changes every
//! time a slot is destroyed, so a captured `Entity` from a previous life of
//! the same id can always be detected as stale — validity is a pure function
//! of allocator state, no back-references required.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of bits used for the slot index.
pub const ID_BITS: u32 = 20;

/// Number of bits used for the slot version.
pub const VERSION_BITS: u32 = 12;

/// Maximum number of entity slots the allocator can hand out.
pub const MAX_ENTITIES: u32 = 1 << ID_BITS;

const ID_MASK: u32 = (1 << ID_BITS) - 1;
const VERSION_MASK: u32 = (1 << VERSION_BITS) - 1;

/// A unique identifier for an entity in a registry.
///
/// Entities are pure identifiers — they carry no data of their own.
/// Components are attached to entities to give them meaning.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u32);

impl Entity {
    /// Pack an entity from a slot index and a version.
    ///
    /// Both values are masked to their bit widths.
    #[must_use]
    pub const fn new(id: u32, version: u32) -> Self {
        Self((id & ID_MASK) | ((version & VERSION_MASK) << ID_BITS))
    }

    /// The slot index of this entity.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0 & ID_MASK
    }

    /// The slot version captured by this entity.
    #[must_use]
    pub const fn version(self) -> u32 {
        self.0 >> ID_BITS
    }

    /// The raw packed representation.
    #[must_use]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// Reconstruct an entity from its packed representation.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id(), self.version())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id(), self.version())
    }
}

/// Allocates packed entity identifiers with slot recycling.
///
/// Destroyed slot indices go onto a free list and are reused in LIFO order.
/// A slot's version is incremented when it is destroyed — not when it is
/// created — so every `Entity` captured before the destroy compares unequal
/// to anything the allocator will hand out for that slot afterwards.
#[derive(Debug, Clone, Default)]
pub struct EntityAllocator {
    /// Current version of each slot, indexed by id.
    versions: Vec<u32>,
    /// Whether each slot currently holds a live entity.
    alive: Vec<bool>,
    /// Slot indices available for reuse (LIFO).
    free: Vec<u32>,
    /// Number of currently live entities.
    alive_count: u32,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new entity.
    ///
    /// Pops the free list if a recyclable slot exists (keeping that slot's
    /// stored version), otherwise claims the next sequential slot at
    /// version 0.
    ///
    /// # Panics
    ///
    /// Panics if all [`MAX_ENTITIES`] slots are live.
    pub fn create(&mut self) -> Entity {
        let id = if let Some(id) = self.free.pop() {
            id
        } else {
            let id = self.versions.len() as u32;
            assert!(id < MAX_ENTITIES, "entity capacity exhausted");
            self.versions.push(0);
            self.alive.push(false);
            id
        };

        self.alive[id as usize] = true;
        self.alive_count += 1;
        Entity::new(id, self.versions[id as usize])
    }

    /// Force-allocate the exact slot and version carried by `entity`.
    ///
    /// If the slot currently holds a live entity it is destroyed first. Slots
    /// between the current high-water mark and the requested id are
    /// materialized as free so sequential allocation stays consistent. Used
    /// to deterministically recreate identifiers, e.g. after deserialization.
    pub fn create_from(&mut self, entity: Entity) -> Entity {
        let id = entity.id();
        let idx = id as usize;

        if idx < self.versions.len() {
            if self.alive[idx] {
                self.destroy(Entity::new(id, self.versions[idx]));
            }
            if let Some(pos) = self.free.iter().position(|&f| f == id) {
                self.free.swap_remove(pos);
            }
        } else {
            while self.versions.len() < idx {
                let fresh = self.versions.len() as u32;
                self.versions.push(0);
                self.alive.push(false);
                self.free.push(fresh);
            }
            self.versions.push(0);
            self.alive.push(false);
        }

        self.versions[idx] = entity.version();
        self.alive[idx] = true;
        self.alive_count += 1;
        Entity::new(id, entity.version())
    }

    /// Destroy a live entity, recycling its slot.
    ///
    /// The slot's version is incremented (wrapping at [`VERSION_BITS`]) so
    /// stale captures of the old entity stay invalid forever.
    ///
    /// Returns `true` if the entity was live and is now destroyed.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        let idx = entity.id() as usize;
        if idx >= self.versions.len() || !self.alive[idx] || self.versions[idx] != entity.version()
        {
            return false;
        }

        self.versions[idx] = (self.versions[idx] + 1) & VERSION_MASK;
        self.alive[idx] = false;
        self.free.push(entity.id());
        self.alive_count -= 1;
        true
    }

    /// Check whether `entity` is currently live with a matching version.
    #[must_use]
    pub fn is_valid(&self, entity: Entity) -> bool {
        let idx = entity.id() as usize;
        idx < self.versions.len() && self.alive[idx] && self.versions[idx] == entity.version()
    }

    /// The live entity occupying slot `id`, if any.
    #[must_use]
    pub fn entity_at(&self, id: u32) -> Option<Entity> {
        let idx = id as usize;
        if idx < self.versions.len() && self.alive[idx] {
            Some(Entity::new(id, self.versions[idx]))
        } else {
            None
        }
    }

    /// Number of currently live entities.
    #[must_use]
    pub const fn count_live(&self) -> u32 {
        self.alive_count
    }

    /// Total number of slots ever allocated (live or recycled).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.versions.len()
    }

    /// Invoke `f` for every live entity.
    pub fn each<F: FnMut(Entity)>(&self, mut f: F) {
        for (idx, &alive) in self.alive.iter().enumerate() {
            if alive {
                f(Entity::new(idx as u32, self.versions[idx]));
            }
        }
    }
}
