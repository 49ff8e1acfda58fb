//! # lattice_ecs
//!
//! Storage and query engine for the lattice entity-component store:
//! sparse-set [`Pool`]s with synchronous multicast events, the [`Registry`]
//! that owns them, and two query-view flavors — the stateless [`Mapper`]
//! that re-derives membership per traversal, and the stateful [`Reactor`]
//! that maintains it incrementally from pool events, with per-member update
//! masks and attachable resources.
//!
//! The engine is single-threaded, synchronous, and event-driven: every pool
//! mutation dispatches its events within the same call stack, and every
//! traversal snapshots before dispatch so callbacks may freely mutate the
//! registry mid-iteration.
//!
//! ```
//! use lattice_component::{ComponentDefinition, validators};
//! use lattice_ecs::{QuerySpec, Mapper, Registry};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! registry
//!     .define(ComponentDefinition::new("Health", validators::number()))
//!     .unwrap();
//!
//! let e = registry.create();
//! registry.add(e, "Health", json!(10)).unwrap();
//!
//! let query = QuerySpec::new().all(["Health"]).compile(&registry).unwrap();
//! Mapper::new(query).each(|entity, required, _| {
//!     println!("{entity}: {}", required[0]);
//! });
//! ```

mod error;
mod mapper;
mod pool;
mod query;
mod reactor;
mod registry;
mod signal;

pub use error::EcsError;
pub use mapper::Mapper;
pub use pool::{Pool, PoolEvent, PoolHandle};
pub use query::{MAX_UPDATED, Query, QuerySpec};
pub use reactor::{Attachment, Reactor, UpdateMask};
pub use registry::Registry;
pub use signal::{Signal, SubscriberId};
