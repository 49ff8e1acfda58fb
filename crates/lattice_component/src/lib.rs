//! # lattice_component
//!
//! Core data model for the lattice entity-component store: packed entity
//! identifiers, the recycling [`EntityAllocator`], and dynamically-typed
//! [`ComponentDefinition`]s with opaque validator predicates.
//!
//! Storage and queries live in `lattice_ecs`; this crate is deliberately
//! free of storage concerns so external collaborators (e.g. the attribute
//! bridge) can speak about entities and definitions without pulling in the
//! engine.

mod definition;
mod entity;

pub use definition::{ComponentDefinition, Validator, validators};
pub use entity::{Entity, EntityAllocator, ID_BITS, MAX_ENTITIES, VERSION_BITS};
