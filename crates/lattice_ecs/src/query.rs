//! Query descriptors and compilation.
//!
//! A [`QuerySpec`] declares which components a view selects on, by name. A
//! compiled [`Query`] has resolved those names to pool handles against one
//! registry; it is immutable and cheap to clone, and one compiled query can
//! back any number of [`Mapper`](crate::Mapper)s and
//! [`Reactor`](crate::Reactor)s.

use std::collections::HashSet;
use std::rc::Rc;

use lattice_component::Entity;
use serde_json::Value;

use crate::error::EcsError;
use crate::pool::PoolHandle;
use crate::registry::Registry;

/// Upper bound on `updated` components per query — one bit each in the
/// per-entity update mask.
pub const MAX_UPDATED: usize = 32;

/// Declares the component sets a query selects on.
///
/// At least one of `all`, `updated`, or `any` must be non-empty at compile
/// time.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    all: Vec<String>,
    updated: Vec<String>,
    any: Vec<String>,
    without: Vec<String>,
}

impl QuerySpec {
    /// Create an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every named component to be present.
    #[must_use]
    pub fn all<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.all.extend(names.into_iter().map(Into::into));
        self
    }

    /// Require presence and track `updated` events for the named components.
    #[must_use]
    pub fn updated<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.updated.extend(names.into_iter().map(Into::into));
        self
    }

    /// Require at least one of the named components, when the set is
    /// non-empty.
    #[must_use]
    pub fn any<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any.extend(names.into_iter().map(Into::into));
        self
    }

    /// Exclude entities holding any of the named components.
    #[must_use]
    pub fn without<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.without.extend(names.into_iter().map(Into::into));
        self
    }

    /// Compile against a registry. See [`Query::compile`].
    pub fn compile(self, registry: &Registry) -> Result<Query, EcsError> {
        Query::compile(registry, self)
    }
}

/// A spec resolved to pool handles against one registry.
#[derive(Clone)]
pub struct Query {
    all: Vec<PoolHandle>,
    updated: Vec<PoolHandle>,
    any: Vec<PoolHandle>,
    without: Vec<PoolHandle>,
}

impl Query {
    /// Resolve `spec` against `registry`.
    ///
    /// Fails with [`EcsError::UnknownComponent`] for an unrecognized name,
    /// [`EcsError::EmptyQuery`] when `all`, `updated`, and `any` are all
    /// empty, and [`EcsError::TooManyUpdated`] when `updated` exceeds
    /// [`MAX_UPDATED`]. Update-mask bit positions are assigned by position
    /// in the `updated` list.
    pub fn compile(registry: &Registry, spec: QuerySpec) -> Result<Self, EcsError> {
        if spec.all.is_empty() && spec.updated.is_empty() && spec.any.is_empty() {
            return Err(EcsError::EmptyQuery);
        }
        if spec.updated.len() > MAX_UPDATED {
            return Err(EcsError::TooManyUpdated(spec.updated.len()));
        }

        let resolve = |names: &[String]| -> Result<Vec<PoolHandle>, EcsError> {
            names
                .iter()
                .map(|name| {
                    registry
                        .pool(name)
                        .ok_or_else(|| EcsError::UnknownComponent(name.clone()))
                })
                .collect()
        };

        Ok(Self {
            all: resolve(&spec.all)?,
            updated: resolve(&spec.updated)?,
            any: resolve(&spec.any)?,
            without: resolve(&spec.without)?,
        })
    }

    /// Pools whose presence is required (`all` then `updated`).
    pub(crate) fn required_pools(&self) -> impl Iterator<Item = &PoolHandle> {
        self.all.iter().chain(self.updated.iter())
    }

    /// The `all` pools, in spec order.
    pub(crate) fn all_pools(&self) -> &[PoolHandle] {
        &self.all
    }

    /// The `updated` pools, in spec order (bit index = position).
    pub(crate) fn updated_pools(&self) -> &[PoolHandle] {
        &self.updated
    }

    /// The `any` pools, in spec order.
    pub(crate) fn any_pools(&self) -> &[PoolHandle] {
        &self.any
    }

    /// Every pool whose presence affects membership, deduplicated.
    pub(crate) fn presence_pools(&self) -> Vec<PoolHandle> {
        let mut out: Vec<PoolHandle> = Vec::new();
        let groups = [&self.all, &self.updated, &self.any, &self.without];
        for pool in groups.into_iter().flatten() {
            if !out.iter().any(|seen| Rc::ptr_eq(seen, pool)) {
                out.push(Rc::clone(pool));
            }
        }
        out
    }

    /// Number of tracked `updated` components.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.updated.len()
    }

    /// The membership predicate: all required components present, at least
    /// one `any` component if that set is non-empty, no `without` component.
    #[must_use]
    pub fn matches(&self, entity: Entity) -> bool {
        self.matches_assuming_absent(entity, None)
    }

    /// The membership predicate, with `absent` (when given) treated as not
    /// holding `entity` regardless of its actual contents.
    ///
    /// Pools fire `removed` *before* the physical removal, so a membership
    /// re-test during that dispatch must pretend the removing pool is
    /// already empty for the entity.
    pub(crate) fn matches_assuming_absent(
        &self,
        entity: Entity,
        absent: Option<&PoolHandle>,
    ) -> bool {
        let present = |pool: &PoolHandle| -> bool {
            if absent.is_some_and(|absent| Rc::ptr_eq(pool, absent)) {
                return false;
            }
            pool.has(entity)
        };

        self.required_pools().all(present)
            && (self.any.is_empty() || self.any.iter().any(present))
            && !self.without.iter().any(present)
    }

    /// Candidate entities for a live scan: the smallest required pool's
    /// dense array, or the deduplicated union of the `any` pools when no
    /// required pool exists.
    pub(crate) fn candidates(&self) -> Vec<Entity> {
        if let Some(smallest) = self.required_pools().min_by_key(|pool| pool.len()) {
            return smallest.entities();
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for pool in &self.any {
            for entity in pool.entities() {
                if seen.insert(entity) {
                    out.push(entity);
                }
            }
        }
        out
    }

    /// Collect the row passed to view callbacks: required payloads (`all`
    /// order then `updated` order) and optional `any` payloads. `None` when
    /// the entity does not match.
    pub(crate) fn row(&self, entity: Entity) -> Option<(Vec<Value>, Vec<Option<Value>>)> {
        if !self.matches(entity) {
            return None;
        }
        self.values(entity)
    }

    /// Collect payloads without re-running the membership predicate. Used
    /// where membership was already decided (e.g. attaching during a
    /// `removed` dispatch, when the predicate would see pre-removal state).
    pub(crate) fn values(&self, entity: Entity) -> Option<(Vec<Value>, Vec<Option<Value>>)> {
        let required: Option<Vec<Value>> = self
            .required_pools()
            .map(|pool| pool.get(entity).ok())
            .collect();
        let optional: Vec<Option<Value>> = self
            .any
            .iter()
            .map(|pool| pool.get(entity).ok())
            .collect();
        Some((required?, optional))
    }
}

#[cfg(test)]
mod tests {
    use lattice_component::{ComponentDefinition, validators};
    use serde_json::json;

    use super::*;

    fn registry() -> Registry {
        let registry = Registry::new();
        for name in ["A", "B", "C", "D"] {
            registry
                .define(ComponentDefinition::new(name, validators::any()))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_empty_query_rejected() {
        let registry = registry();
        let err = QuerySpec::new().without(["A"]).compile(&registry);
        assert!(matches!(err, Err(EcsError::EmptyQuery)));
    }

    #[test]
    fn test_unknown_name_rejected() {
        let registry = registry();
        let err = QuerySpec::new().all(["Nope"]).compile(&registry);
        assert!(matches!(err, Err(EcsError::UnknownComponent(_))));
    }

    #[test]
    fn test_too_many_updated_rejected() {
        let registry = Registry::new();
        let mut names = Vec::new();
        for i in 0..33 {
            let name = format!("U{i}");
            registry
                .define(ComponentDefinition::accepting_any(name.clone()))
                .unwrap();
            names.push(name);
        }
        let err = QuerySpec::new().updated(names).compile(&registry);
        assert!(matches!(err, Err(EcsError::TooManyUpdated(33))));
    }

    #[test]
    fn test_matches_all_any_without() {
        let registry = registry();
        let query = QuerySpec::new()
            .all(["A"])
            .any(["B", "C"])
            .without(["D"])
            .compile(&registry)
            .unwrap();

        let e = registry.create();
        assert!(!query.matches(e));

        registry.add(e, "A", json!(null)).unwrap();
        assert!(!query.matches(e)); // `any` unsatisfied

        registry.add(e, "B", json!(null)).unwrap();
        assert!(query.matches(e));

        registry.add(e, "D", json!(null)).unwrap();
        assert!(!query.matches(e)); // excluded

        registry.remove(e, "D").unwrap();
        assert!(query.matches(e));
    }

    #[test]
    fn test_row_orders_required_then_optional() {
        let registry = registry();
        let query = QuerySpec::new()
            .all(["A"])
            .updated(["B"])
            .any(["C", "D"])
            .compile(&registry)
            .unwrap();

        let e = registry.create();
        registry.add(e, "A", json!("a")).unwrap();
        registry.add(e, "B", json!("b")).unwrap();
        registry.add(e, "D", json!("d")).unwrap();

        let (required, optional) = query.row(e).unwrap();
        assert_eq!(required, vec![json!("a"), json!("b")]);
        assert_eq!(optional, vec![None, Some(json!("d"))]);
    }

    #[test]
    fn test_candidates_from_any_union_dedup() {
        let registry = registry();
        let query = QuerySpec::new().any(["A", "B"]).compile(&registry).unwrap();

        let e1 = registry.create();
        let e2 = registry.create();
        registry.add(e1, "A", json!(null)).unwrap();
        registry.add(e1, "B", json!(null)).unwrap();
        registry.add(e2, "B", json!(null)).unwrap();

        let mut candidates = query.candidates();
        candidates.sort();
        assert_eq!(candidates, vec![e1, e2]);
    }

    #[test]
    fn test_presence_pools_dedup_shared_names() {
        let registry = registry();
        let query = QuerySpec::new()
            .all(["A", "B"])
            .updated(["A"])
            .compile(&registry)
            .unwrap();
        assert_eq!(query.presence_pools().len(), 2);
    }
}
