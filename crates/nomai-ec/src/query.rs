//! Declarative entity queries.
//!
//! A [`QueryBuilder`] borrows a live slice of entities and accumulates
//! conditions that are ANDed together. Each condition is a plain predicate
//! over an [`Entity`] that consults the entity's
//! [`ComponentSystem`]; there is no component-type index, so evaluation is
//! `O(entities x conditions)`.
//!
//! Terminal operations ([`first`](QueryBuilder::first),
//! [`all`](QueryBuilder::all), [`count`](QueryBuilder::count),
//! [`exists`](QueryBuilder::exists)) clear the accumulated conditions. A
//! builder reused after a terminal call with no new conditions matches every
//! entity.
//!
//! ```
//! use nomai_ec::prelude::*;
//!
//! struct Player;
//! impl Component for Player {}
//! struct Health(u32);
//! impl Component for Health {}
//! struct Shield;
//! impl Component for Shield {}
//!
//! let mut entities = EntitySet::new();
//! let hero = entities.spawn();
//! hero.add(|| Player)?;
//! hero.add(|| Health(3))?;
//! entities.spawn().add(|| Health(0))?;
//!
//! let exposed = entities
//!     .query()
//!     .with_all_where::<(Player, Health), _>(|(_, health)| health.borrow().0 > 0)
//!     .without::<Shield>()
//!     .all();
//! assert_eq!(exposed, vec![hero]);
//! # Ok::<(), EcError>(())
//! ```

use std::fmt;

use crate::component::{Component, ComponentHandle};
use crate::entity::Entity;
use crate::system::ComponentSystem;

// ---------------------------------------------------------------------------
// ComponentSet -- a tuple of component types
// ---------------------------------------------------------------------------

/// A tuple of component types, `(A,)` through `(A, B, C, D)`, used by the
/// multi-type query conditions.
pub trait ComponentSet: 'static {
    /// Typed handles in tuple order.
    type Handles;

    /// Rust type names in tuple order.
    fn type_names() -> Vec<&'static str>;

    /// Handles for every listed type, or `None` as soon as one is missing.
    fn fetch(components: &ComponentSystem) -> Option<Self::Handles>;

    /// Whether every listed type is attached.
    fn contains_all(components: &ComponentSystem) -> bool;

    /// Whether at least one listed type is attached.
    fn contains_any(components: &ComponentSystem) -> bool;
}

macro_rules! impl_component_set {
    ($($ty:ident),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            type Handles = ($(ComponentHandle<$ty>,)+);

            fn type_names() -> Vec<&'static str> {
                vec![$(std::any::type_name::<$ty>()),+]
            }

            fn fetch(components: &ComponentSystem) -> Option<Self::Handles> {
                Some(($(components.find::<$ty>()?,)+))
            }

            fn contains_all(components: &ComponentSystem) -> bool {
                $(components.has::<$ty>())&&+
            }

            fn contains_any(components: &ComponentSystem) -> bool {
                $(components.has::<$ty>())||+
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);

// ---------------------------------------------------------------------------
// QueryBuilder
// ---------------------------------------------------------------------------

type Condition = Box<dyn Fn(&Entity) -> bool>;

/// Chainable AND-combination of component conditions over a borrowed set of
/// entities.
pub struct QueryBuilder<'s> {
    source: &'s [Entity],
    conditions: Vec<Condition>,
}

/// Start a query over `entities`.
pub fn query(entities: &[Entity]) -> QueryBuilder<'_> {
    QueryBuilder::new(entities)
}

impl<'s> QueryBuilder<'s> {
    pub fn new(source: &'s [Entity]) -> Self {
        Self {
            source,
            conditions: Vec::new(),
        }
    }

    fn push(&mut self, condition: impl Fn(&Entity) -> bool + 'static) -> &mut Self {
        self.conditions.push(Box::new(condition));
        self
    }

    /// Require a `T`.
    pub fn with<T: Component>(&mut self) -> &mut Self {
        self.push(|entity| entity.components().has::<T>())
    }

    /// Require a `T` for which `predicate` returns `true`.
    ///
    /// # Panics
    ///
    /// Panics if the component is mutably borrowed while the query runs.
    pub fn with_where<T>(&mut self, predicate: impl Fn(&T) -> bool + 'static) -> &mut Self
    where
        T: Component,
    {
        self.push(move |entity| match entity.components().find::<T>() {
            Some(handle) => {
                let component = handle.borrow();
                predicate(&component)
            }
            None => false,
        })
    }

    /// Require every type in `S`.
    pub fn with_all<S: ComponentSet>(&mut self) -> &mut Self {
        self.push(|entity| S::contains_all(entity.components()))
    }

    /// Require every type in `S` and a `true` from `predicate`, which receives
    /// the handles in tuple order. The predicate never runs for an entity
    /// missing any of the types.
    pub fn with_all_where<S, P>(&mut self, predicate: P) -> &mut Self
    where
        S: ComponentSet,
        P: Fn(&S::Handles) -> bool + 'static,
    {
        self.push(move |entity| {
            S::fetch(entity.components()).is_some_and(|handles| predicate(&handles))
        })
    }

    /// Require that no `T` is attached.
    pub fn without<T: Component>(&mut self) -> &mut Self {
        self.push(|entity| !entity.components().has::<T>())
    }

    /// Require that none of the types in `S` is attached.
    pub fn without_any<S: ComponentSet>(&mut self) -> &mut Self {
        self.push(|entity| !S::contains_any(entity.components()))
    }

    /// Require an arbitrary entity-level predicate.
    pub fn filter<P>(&mut self, predicate: P) -> &mut Self
    where
        P: Fn(&Entity) -> bool + 'static,
    {
        self.push(predicate)
    }

    /// Number of accumulated conditions.
    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    fn matches(&self, entity: &Entity) -> bool {
        self.conditions.iter().all(|condition| condition(entity))
    }

    // -- terminals ----------------------------------------------------------

    /// The first matching entity in source order. Clears the conditions.
    pub fn first(&mut self) -> Option<Entity> {
        let found = self.source.iter().find(|e| self.matches(e)).cloned();
        self.conditions.clear();
        found
    }

    /// Every matching entity in source order. Clears the conditions.
    pub fn all(&mut self) -> Vec<Entity> {
        let found = self
            .source
            .iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        self.conditions.clear();
        found
    }

    /// Number of matching entities. Clears the conditions.
    pub fn count(&mut self) -> usize {
        let count = self.source.iter().filter(|e| self.matches(e)).count();
        self.conditions.clear();
        count
    }

    /// Whether any entity matches. Clears the conditions.
    pub fn exists(&mut self) -> bool {
        self.first().is_some()
    }
}

impl fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("source", &self.source.len())
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::entity::EntitySet;

    #[derive(Debug)]
    struct X(i32);
    impl Component for X {}

    #[derive(Debug)]
    struct Y(i32);
    impl Component for Y {}

    #[derive(Debug)]
    struct Z;
    impl Component for Z {}

    /// a: X + Y, b: X only, c: Y only
    fn setup() -> (EntitySet, Entity, Entity, Entity) {
        let mut set = EntitySet::new();
        let a = set.spawn();
        a.add(|| X(1)).unwrap();
        a.add(|| Y(1)).unwrap();
        let b = set.spawn();
        b.add(|| X(2)).unwrap();
        let c = set.spawn();
        c.add(|| Y(3)).unwrap();
        (set, a, b, c)
    }

    #[test]
    fn with_and_without() {
        let (set, _a, b, _c) = setup();
        assert_eq!(set.query().with::<X>().without::<Y>().all(), vec![b]);
    }

    #[test]
    fn with_all_requires_every_type() {
        let (set, a, _b, _c) = setup();
        assert_eq!(set.query().with_all::<(X, Y)>().all(), vec![a]);
    }

    #[test]
    fn empty_query_matches_everything_in_order() {
        let (set, a, b, c) = setup();
        assert_eq!(set.query().all(), vec![a, b, c]);
    }

    #[test]
    fn with_where_filters_on_value() {
        let (set, _a, b, c) = setup();
        assert_eq!(set.query().with_where::<X>(|x| x.0 > 1).all(), vec![b]);
        assert_eq!(set.query().with_where::<Y>(|y| y.0 == 3).first(), Some(c));
        assert_eq!(set.query().with_where::<Z>(|_| true).first(), None);
    }

    #[test]
    fn multi_with_predicate_skips_incomplete_entities() {
        let (set, a, _b, _c) = setup();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let matched = set
            .query()
            .with_all_where::<(X, Y), _>(move |(x, y)| {
                counter.set(counter.get() + 1);
                x.borrow().0 == y.borrow().0
            })
            .all();
        assert_eq!(matched, vec![a]);
        assert_eq!(calls.get(), 1, "predicate ran for an entity missing X or Y");
    }

    #[test]
    fn without_any_is_nor() {
        let (set, _a, _b, c) = setup();
        assert_eq!(set.query().without_any::<(X, Z)>().all(), vec![c]);
        assert_eq!(set.query().without_any::<(X, Y)>().count(), 0);
    }

    #[test]
    fn query_over_plain_slice() {
        let (set, _a, b, _c) = setup();
        let loner = Entity::new();
        loner.add(|| Z).unwrap();
        let mut extra: Vec<Entity> = set.iter().cloned().collect();
        extra.push(loner.clone());

        assert_eq!(query(&extra).without_any::<(X, Y)>().all(), vec![loner]);
        assert_eq!(query(&extra).with::<X>().without::<Y>().first(), Some(b));
    }

    #[test]
    fn first_stops_at_first_match() {
        let (set, a, _b, _c) = setup();
        let visited = Rc::new(Cell::new(0));
        let counter = Rc::clone(&visited);
        let found = set
            .query()
            .filter(move |_| {
                counter.set(counter.get() + 1);
                true
            })
            .first();
        assert_eq!(found, Some(a));
        assert_eq!(visited.get(), 1);
    }

    #[test]
    fn conditions_short_circuit_in_registration_order() {
        let (set, _a, _b, _c) = setup();
        let second_runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&second_runs);
        let count = set
            .query()
            .with::<X>()
            .filter(move |_| {
                counter.set(counter.get() + 1);
                true
            })
            .count();
        assert_eq!(count, 2);
        assert_eq!(second_runs.get(), 2, "second condition ran for c");
    }

    #[test]
    fn terminals_clear_conditions() {
        let (set, a, b, c) = setup();
        let mut q = set.query();
        q.with::<X>().without::<Y>();
        assert_eq!(q.condition_count(), 2);
        assert_eq!(q.all(), vec![b.clone()]);
        assert_eq!(q.condition_count(), 0);
        assert_eq!(q.all(), vec![a.clone(), b, c]);

        q.with::<Z>();
        assert!(!q.exists());
        assert!(q.exists());
        q.with::<Y>();
        assert_eq!(q.count(), 2);
        assert_eq!(q.first(), Some(a));
    }

    #[test]
    fn component_set_metadata() {
        let names = <(X, Y, Z)>::type_names();
        assert_eq!(names.len(), 3);
        assert!(names[2].ends_with("Z"));
    }

    #[test]
    fn fetch_returns_handles_in_order() {
        let (_set, a, _b, c) = setup();
        let (x, y) = <(X, Y)>::fetch(a.components()).unwrap();
        assert_eq!((x.borrow().0, y.borrow().0), (1, 1));
        assert!(<(X, Y)>::fetch(c.components()).is_none());
        assert!(<(X, Y, Z, X)>::contains_any(c.components()));
    }
}
