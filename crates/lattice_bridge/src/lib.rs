//! # lattice_bridge
//!
//! Converts between a registry's components and host-side scene objects:
//! one key-value attribute per component plus a discovery tag per component
//! name. The bridge touches only the registry's public surface (`visit`,
//! `get`, `add_or_replace`, definition names) — never pool internals.
//!
//! Per-component conversion failures are soft: the offending component is
//! skipped with a `warn!` and the bulk operation continues. Only an invalid
//! entity is a hard error.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use lattice_component::Entity;
use lattice_ecs::Registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Errors that abort a bridge operation outright.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The entity being bridged is not live.
    #[error("cannot bridge invalid entity {0}")]
    InvalidEntity(Entity),
}

/// Host-side stand-in: a scene object's key-value attributes and discovery
/// tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Attribute values, keyed by component name.
    pub attributes: BTreeMap<String, Value>,
    /// Discovery tags; one per component carried by the object.
    pub tags: BTreeSet<String>,
}

impl SceneObject {
    /// Create an object with no attributes or tags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Write every component of `entity` onto `object` as an attribute plus a
/// tag. Returns the number of components exported.
pub fn export_entity(
    registry: &Registry,
    entity: Entity,
    object: &mut SceneObject,
) -> Result<usize, BridgeError> {
    if !registry.is_valid(entity) {
        return Err(BridgeError::InvalidEntity(entity));
    }

    let mut exported = 0;
    registry.visit(
        |name| {
            match registry.get(entity, name) {
                Ok(value) => {
                    object.attributes.insert(name.to_string(), value);
                    object.tags.insert(name.to_string());
                    exported += 1;
                }
                Err(err) => {
                    warn!(component = name, error = %err, "skipping component during export");
                }
            }
            ControlFlow::Continue(())
        },
        Some(entity),
    );
    Ok(exported)
}

/// Apply `object`'s tagged attributes to `entity` as components.
///
/// Each tag names a component; its attribute value is applied with
/// `add_or_replace`. Undefined tags, missing attribute values, and
/// validator rejections are skipped with a warning. Returns the number of
/// components applied.
pub fn import_entity(
    registry: &Registry,
    entity: Entity,
    object: &SceneObject,
) -> Result<usize, BridgeError> {
    if !registry.is_valid(entity) {
        return Err(BridgeError::InvalidEntity(entity));
    }

    let mut applied = 0;
    for tag in &object.tags {
        if !registry.is_defined(tag) {
            warn!(component = %tag, "skipping tag with no matching definition");
            continue;
        }
        let Some(value) = object.attributes.get(tag) else {
            warn!(component = %tag, "skipping tag with no attribute value");
            continue;
        };
        match registry.add_or_replace(entity, tag, value.clone()) {
            Ok(()) => applied += 1,
            Err(err) => {
                warn!(component = %tag, error = %err, "skipping component during import");
            }
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use lattice_component::{ComponentDefinition, validators};
    use serde_json::json;

    use super::*;

    fn registry() -> Registry {
        let registry = Registry::new();
        registry
            .define(ComponentDefinition::new("Health", validators::number()))
            .unwrap();
        registry
            .define(ComponentDefinition::new("Name", validators::string()))
            .unwrap();
        registry
    }

    #[test]
    fn test_export_writes_attributes_and_tags() {
        let registry = registry();
        let e = registry.create();
        registry.add(e, "Health", json!(10)).unwrap();
        registry.add(e, "Name", json!("gob")).unwrap();

        let mut object = SceneObject::new();
        let exported = export_entity(&registry, e, &mut object).unwrap();
        assert_eq!(exported, 2);
        assert_eq!(object.attributes["Health"], json!(10));
        assert_eq!(object.attributes["Name"], json!("gob"));
        assert!(object.tags.contains("Health"));
        assert!(object.tags.contains("Name"));
    }

    #[test]
    fn test_import_applies_tagged_attributes() {
        let registry = registry();
        let e = registry.create();

        let mut object = SceneObject::new();
        object.attributes.insert("Health".into(), json!(7));
        object.tags.insert("Health".into());

        let applied = import_entity(&registry, e, &object).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(registry.get(e, "Health").unwrap(), json!(7));
    }

    #[test]
    fn test_import_replaces_existing() {
        let registry = registry();
        let e = registry.create();
        registry.add(e, "Health", json!(1)).unwrap();

        let mut object = SceneObject::new();
        object.attributes.insert("Health".into(), json!(9));
        object.tags.insert("Health".into());

        import_entity(&registry, e, &object).unwrap();
        assert_eq!(registry.get(e, "Health").unwrap(), json!(9));
    }

    #[test]
    fn test_import_soft_failures_skip_and_continue() {
        let registry = registry();
        let e = registry.create();

        let mut object = SceneObject::new();
        // Undefined tag.
        object.tags.insert("Ghost".into());
        // Tag without an attribute value.
        object.tags.insert("Name".into());
        // Validator rejection.
        object.attributes.insert("Health".into(), json!("broken"));
        object.tags.insert("Health".into());

        let applied = import_entity(&registry, e, &object).unwrap();
        assert_eq!(applied, 0);
        assert!(!registry.has(e, &["Health"]));
    }

    #[test]
    fn test_invalid_entity_is_hard_error() {
        let registry = registry();
        let e = registry.create();
        registry.destroy(e).unwrap();

        let mut object = SceneObject::new();
        assert!(matches!(
            export_entity(&registry, e, &mut object),
            Err(BridgeError::InvalidEntity(_))
        ));
        assert!(matches!(
            import_entity(&registry, e, &object),
            Err(BridgeError::InvalidEntity(_))
        ));
    }

    #[test]
    fn test_roundtrip_through_scene_object() {
        let registry = registry();
        let e = registry.create();
        registry.add(e, "Health", json!(3)).unwrap();
        registry.add(e, "Name", json!("imp")).unwrap();

        let mut object = SceneObject::new();
        export_entity(&registry, e, &mut object).unwrap();

        let copy = Registry::new();
        copy.define(ComponentDefinition::new("Health", validators::number()))
            .unwrap();
        copy.define(ComponentDefinition::new("Name", validators::string()))
            .unwrap();
        let f = copy.create();
        let applied = import_entity(&copy, f, &object).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(copy.get(f, "Health").unwrap(), json!(3));
        assert_eq!(copy.get(f, "Name").unwrap(), json!("imp"));
    }
}
