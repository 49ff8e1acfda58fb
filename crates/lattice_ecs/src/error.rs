//! Engine error types.

use lattice_component::Entity;

/// Errors surfaced by registry, pool, and view operations.
///
/// All failures are local and synchronous — there is no retry and no
/// partial success.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity's version does not match the allocator's current version
    /// for that id, or the id never existed.
    #[error("entity {0} is not valid")]
    InvalidEntity(Entity),

    /// The component name was never defined on this registry.
    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    /// The component name is already defined on this registry.
    #[error("component '{0}' is already defined")]
    DuplicateDefinition(String),

    /// The entity already has the component.
    #[error("entity {entity} already has component '{component}'")]
    AlreadyPresent {
        /// The entity the operation targeted.
        entity: Entity,
        /// The component involved.
        component: String,
    },

    /// The entity does not have the component.
    #[error("entity {entity} does not have component '{component}'")]
    NotPresent {
        /// The entity the operation targeted.
        entity: Entity,
        /// The component involved.
        component: String,
    },

    /// The proposed payload was rejected by the component's validator.
    #[error("value rejected by the validator of component '{component}'")]
    TypeMismatch {
        /// The component whose validator rejected the payload.
        component: String,
    },

    /// A query was compiled with `all`, `updated`, and `any` all empty.
    #[error("query requires at least one of `all`, `updated`, or `any`")]
    EmptyQuery,

    /// A query tracks more `updated` components than the bitmask holds.
    #[error("query tracks {0} updated components, the limit is 32")]
    TooManyUpdated(usize),

    /// `consume` was called for an entity the reactor does not track.
    #[error("entity {0} is not a member of this reactor")]
    NotAMember(Entity),
}
