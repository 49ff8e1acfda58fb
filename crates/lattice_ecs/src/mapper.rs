//! Stateless query views.
//!
//! A [`Mapper`] holds nothing but a compiled [`Query`]; every traversal
//! re-derives the matching set from the live pools. That makes it safe to
//! build before any matching component exists, and it always reflects the
//! instant-current registry state with no refresh step.

use lattice_component::Entity;
use serde_json::Value;

use crate::error::EcsError;
use crate::query::Query;

/// On-demand view over a [`Query`].
#[derive(Clone)]
pub struct Mapper {
    query: Query,
}

impl Mapper {
    /// Create a mapper over a compiled query.
    #[must_use]
    pub fn new(query: Query) -> Self {
        Self { query }
    }

    /// The underlying query.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Invoke `f` for every matching entity.
    ///
    /// `f` receives the required payloads (`all` order then `updated`
    /// order) and the optional `any` payloads. The candidate set is
    /// snapshotted before dispatch and each entity is revalidated at call
    /// time, so `f` may add or remove components, or create and destroy
    /// entities, mid-iteration.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(Entity, &[Value], &[Option<Value>]),
    {
        for entity in self.query.candidates() {
            if let Some((required, optional)) = self.query.row(entity) {
                f(entity, &required, &optional);
            }
        }
    }

    /// As [`each`](Self::each), but the `all` payloads are passed mutably
    /// and written back through each pool's `replace` afterwards, firing
    /// that pool's `updated` event.
    ///
    /// This is the only way a mapper mutates state — it is how a live
    /// reactor elsewhere observes `updated` without the mapper tracking
    /// anything itself.
    ///
    /// Fails with [`EcsError::TypeMismatch`] if `f` produced a payload the
    /// component's validator rejects; earlier entities stay written.
    pub fn map<F>(&self, mut f: F) -> Result<(), EcsError>
    where
        F: FnMut(Entity, &mut [Value], &[Value], &[Option<Value>]),
    {
        for entity in self.query.candidates() {
            if !self.query.matches(entity) {
                continue;
            }

            let all: Option<Vec<Value>> = self
                .query
                .all_pools()
                .iter()
                .map(|pool| pool.get(entity).ok())
                .collect();
            let Some(mut all) = all else { continue };
            let updated: Option<Vec<Value>> = self
                .query
                .updated_pools()
                .iter()
                .map(|pool| pool.get(entity).ok())
                .collect();
            let Some(updated) = updated else { continue };
            let optional: Vec<Option<Value>> = self
                .query
                .any_pools()
                .iter()
                .map(|pool| pool.get(entity).ok())
                .collect();

            f(entity, &mut all, &updated, &optional);

            for (pool, value) in self.query.all_pools().iter().zip(all) {
                // `f` may have removed the component; only write back what
                // is still there.
                if pool.has(entity) {
                    pool.replace(entity, value)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lattice_component::{ComponentDefinition, validators};
    use serde_json::json;

    use super::*;
    use crate::query::QuerySpec;
    use crate::registry::Registry;

    fn registry() -> Registry {
        let registry = Registry::new();
        registry
            .define(ComponentDefinition::new("Position", validators::number()))
            .unwrap();
        registry
            .define(ComponentDefinition::new("Velocity", validators::number()))
            .unwrap();
        registry
            .define(ComponentDefinition::new("Frozen", validators::any()))
            .unwrap();
        registry
    }

    fn mapper(registry: &Registry) -> Mapper {
        let query = QuerySpec::new()
            .all(["Position"])
            .updated(["Velocity"])
            .without(["Frozen"])
            .compile(registry)
            .unwrap();
        Mapper::new(query)
    }

    #[test]
    fn test_each_reflects_live_state_between_calls() {
        let registry = registry();
        let mapper = mapper(&registry);

        let mut count = 0;
        mapper.each(|_, _, _| count += 1);
        assert_eq!(count, 0);

        let e = registry.create();
        registry.add(e, "Position", json!(0)).unwrap();
        registry.add(e, "Velocity", json!(2)).unwrap();

        let mut rows = Vec::new();
        mapper.each(|entity, required, _| rows.push((entity, required.to_vec())));
        assert_eq!(rows, vec![(e, vec![json!(0), json!(2)])]);

        registry.add(e, "Frozen", json!(null)).unwrap();
        let mut count = 0;
        mapper.each(|_, _, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_map_writes_back_and_fires_updated() {
        let registry = registry();
        let mapper = mapper(&registry);

        let e = registry.create();
        registry.add(e, "Position", json!(1)).unwrap();
        registry.add(e, "Velocity", json!(3)).unwrap();

        let updates = std::rc::Rc::new(std::cell::Cell::new(0u32));
        let u = std::rc::Rc::clone(&updates);
        registry
            .pool("Position")
            .unwrap()
            .on_updated()
            .connect(move |_, _| u.set(u.get() + 1));

        mapper
            .map(|_, all, updated, _| {
                let position = all[0].as_f64().unwrap_or(0.0);
                let velocity = updated[0].as_f64().unwrap_or(0.0);
                all[0] = json!(position + velocity);
            })
            .unwrap();

        assert_eq!(registry.get(e, "Position").unwrap(), json!(4.0));
        assert_eq!(updates.get(), 1);
    }

    #[test]
    fn test_map_validator_rejection_surfaces() {
        let registry = registry();
        let mapper = mapper(&registry);

        let e = registry.create();
        registry.add(e, "Position", json!(1)).unwrap();
        registry.add(e, "Velocity", json!(1)).unwrap();

        let err = mapper.map(|_, all, _, _| {
            all[0] = json!("not a number");
        });
        assert!(matches!(err, Err(EcsError::TypeMismatch { .. })));
    }

    #[test]
    fn test_callback_may_mutate_registry_mid_iteration() {
        let registry = registry();
        let mapper = mapper(&registry);

        let mut entities = Vec::new();
        for i in 0..4 {
            let e = registry.create();
            registry.add(e, "Position", json!(i)).unwrap();
            registry.add(e, "Velocity", json!(1)).unwrap();
            entities.push(e);
        }

        // Freeze every other entity from inside the traversal.
        let mut visited = 0;
        mapper.each(|entity, _, _| {
            visited += 1;
            if entity.id() % 2 == 0 {
                registry.add(entity, "Frozen", json!(null)).unwrap();
            }
        });
        assert_eq!(visited, 4);

        let mut second = 0;
        mapper.each(|_, _, _| second += 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_callback_may_destroy_entities_mid_iteration() {
        let registry = registry();
        let mapper = mapper(&registry);

        let a = registry.create();
        let b = registry.create();
        for &e in &[a, b] {
            registry.add(e, "Position", json!(0)).unwrap();
            registry.add(e, "Velocity", json!(0)).unwrap();
        }

        let mut visited = Vec::new();
        mapper.each(|entity, _, _| {
            visited.push(entity);
            // Destroy the other entity on the first callback.
            let other = if entity == a { b } else { a };
            if registry.is_valid(other) {
                registry.destroy(other).unwrap();
            }
        });
        assert_eq!(visited.len(), 1);
        assert_eq!(registry.count_entities(), 1);
    }
}
