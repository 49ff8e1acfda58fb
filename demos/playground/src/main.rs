//! Playground — a small consumer driving the whole engine.
//!
//! Defines a few component types, spawns entities, integrates motion with a
//! mapper `map` pass, and watches burning entities through a reactor whose
//! attachments log enter/leave. Finally round-trips one entity through the
//! attribute bridge.

use anyhow::Result;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lattice_bridge::{SceneObject, export_entity};
use lattice_component::{ComponentDefinition, validators};
use lattice_ecs::{Attachment, Mapper, QuerySpec, Reactor, Registry};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("playground=info".parse()?))
        .init();

    let registry = Registry::new();
    registry.define(ComponentDefinition::new("Position", validators::object()))?;
    registry.define(ComponentDefinition::new("Velocity", validators::object()))?;
    registry.define(ComponentDefinition::new("Burning", validators::number()))?;
    registry.define(ComponentDefinition::new("Frozen", validators::any()))?;

    // A reactor over burning, unfrozen movers; attachments log membership.
    let burn_watch = Reactor::new(
        &QuerySpec::new()
            .all(["Burning"])
            .without(["Frozen"])
            .compile(&registry)?,
    );
    burn_watch.with_attachments(|entity, required, _| {
        let intensity = required[0].clone();
        info!(%entity, %intensity, "caught fire");
        vec![Attachment::Disposer(Box::new(move || {
            info!(%entity, "stopped burning");
        }))]
    });

    // Spawn a few movers.
    for i in 0..4 {
        let e = registry.create();
        registry.add(e, "Position", json!({"x": 0.0, "y": 0.0}))?;
        registry.add(e, "Velocity", json!({"x": 1.0 + f64::from(i), "y": 0.5}))?;
        if i % 2 == 0 {
            registry.add(e, "Burning", json!(i + 1))?;
        }
    }
    info!(
        entities = registry.count_entities(),
        burning = burn_watch.len(),
        "world populated"
    );

    // Integrate motion for a few steps.
    let motion = Mapper::new(
        QuerySpec::new()
            .all(["Position"])
            .updated(["Velocity"])
            .without(["Frozen"])
            .compile(&registry)?,
    );
    for step in 0..3 {
        motion.map(|_, all, updated, _| {
            let x = all[0]["x"].as_f64().unwrap_or(0.0) + updated[0]["x"].as_f64().unwrap_or(0.0);
            let y = all[0]["y"].as_f64().unwrap_or(0.0) + updated[0]["y"].as_f64().unwrap_or(0.0);
            all[0] = json!({"x": x, "y": y});
        })?;
        info!(step, "integrated motion");
    }

    // Freeze the burning movers; their attachments dispose as they leave.
    let mut frozen = Vec::new();
    burn_watch.each(|entity, _, _| frozen.push(entity));
    for entity in frozen {
        registry.add(entity, "Frozen", json!(null))?;
    }
    info!(burning = burn_watch.len(), "after freeze");

    // Round-trip one entity through the attribute bridge.
    let mut sample = None;
    registry.each(|entity| {
        if sample.is_none() {
            sample = Some(entity);
        }
    });
    if let Some(entity) = sample {
        let mut object = SceneObject::new();
        let exported = export_entity(&registry, entity, &mut object)?;
        info!(%entity, exported, tags = object.tags.len(), "exported to scene object");
    }

    burn_watch.detach();
    Ok(())
}
