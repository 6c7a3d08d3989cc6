//! Nomai EC -- an Entity-Component layer with per-entity component registries.
//!
//! Entities are lightweight containers. Each [`Entity`](entity::Entity) owns a
//! [`ComponentSystem`](system::ComponentSystem) that maps a component type to
//! its single live instance, keeps a priority-ordered view of those instances,
//! and publishes `add` / `remove` / `update` events. A
//! [`QueryBuilder`](query::QueryBuilder) filters a live set of entities by the
//! components they carry.
//!
//! This is not an archetype ECS: components are stored per entity and the
//! host engine is responsible for visiting them each frame.
//!
//! # Quick Start
//!
//! ```
//! use nomai_ec::prelude::*;
//!
//! #[derive(Debug)]
//! struct Health(u32);
//! impl Component for Health {}
//!
//! // A constructor can discover its owner through the binding context.
//! struct Sprite {
//!     owner: EntityId,
//! }
//! impl Component for Sprite {
//!     fn priority(&self) -> i32 {
//!         10
//!     }
//! }
//!
//! let mut entities = EntitySet::new();
//! let player = entities.spawn();
//! player.add(|| Health(100))?;
//! let sprite = player.add(|| Sprite {
//!     owner: current_entity().map(|e| e.id()).unwrap_or(EntityId::from_raw(0)),
//! })?;
//! assert_eq!(sprite.borrow().owner, player.id());
//!
//! let _rock = entities.spawn();
//! let alive = entities.query().with_where::<Health>(|h| h.0 > 0).all();
//! assert_eq!(alive, vec![player.clone()]);
//! # Ok::<(), EcError>(())
//! ```

#![deny(unsafe_code)]

pub mod binding;
pub mod component;
pub mod entity;
pub mod events;
pub mod query;
pub mod system;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by component registry operations.
///
/// These describe contract violations in calling code rather than transient
/// failures, so there is nothing to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcError {
    /// `add` was called for a component type the entity already carries.
    #[error("component '{component}' is already attached to entity {entity}")]
    DuplicateComponent {
        component: &'static str,
        entity: entity::EntityId,
    },

    /// `get` was called for a component type the entity does not carry.
    #[error("component '{component}' not found on entity {entity}")]
    ComponentNotFound {
        component: &'static str,
        entity: entity::EntityId,
    },

    /// The entity has been destroyed and no longer accepts components.
    #[error("entity {entity} has been destroyed")]
    EntityDestroyed { entity: entity::EntityId },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::binding::{bind, current_entity, BindingGuard};
    pub use crate::component::{AnyComponent, Component, ComponentHandle};
    pub use crate::entity::{Entity, EntityId, EntitySet, WeakEntity};
    pub use crate::events::{ComponentEvent, ComponentEvents, EventKind, ListenerId};
    pub use crate::query::{query, ComponentSet, QueryBuilder};
    pub use crate::system::{ClearPolicy, ComponentSystem, ComponentSystemConfig};
    pub use crate::EcError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::prelude::*;

    // -- test component types -----------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Component for Velocity {}

    #[derive(Debug)]
    struct Renderable {
        layer: i32,
    }
    impl Component for Renderable {
        fn priority(&self) -> i32 {
            self.layer
        }
    }

    /// Records the entity it was bound to during construction.
    struct OwnerWitness {
        seen: Option<EntityId>,
    }
    impl Component for OwnerWitness {}

    impl OwnerWitness {
        fn new() -> Self {
            Self {
                seen: current_entity().map(|e| e.id()),
            }
        }
    }

    // -- registry + query ---------------------------------------------------

    #[test]
    fn add_components_and_query_back() {
        let mut entities = EntitySet::new();
        let e = entities.spawn();
        e.add(|| Position { x: 1.0, y: 2.0 }).unwrap();
        e.add(|| Velocity { dx: 3.0, dy: 4.0 }).unwrap();
        entities.spawn().add(|| Position { x: 0.0, y: 0.0 }).unwrap();

        let moving = entities
            .query()
            .with_all::<(Position, Velocity)>()
            .all();
        assert_eq!(moving, vec![e.clone()]);
        assert_eq!(
            *e.get::<Position>().unwrap().borrow(),
            Position { x: 1.0, y: 2.0 }
        );
    }

    #[test]
    fn mutate_through_handle_is_visible_to_queries() {
        let mut entities = EntitySet::new();
        let e = entities.spawn();
        let pos = e.add(|| Position { x: 0.0, y: 0.0 }).unwrap();
        pos.borrow_mut().x = 42.0;

        let found = entities
            .query()
            .with_where::<Position>(|p| p.x > 40.0)
            .first();
        assert_eq!(found, Some(e));
    }

    #[test]
    fn binding_observes_each_owner_in_turn() {
        let mut entities = EntitySet::new();
        let spawned: Vec<Entity> = (0..5).map(|_| entities.spawn()).collect();
        for e in &spawned {
            let witness = e.add(OwnerWitness::new).unwrap();
            assert_eq!(witness.borrow().seen, Some(e.id()));
        }
        assert!(current_entity().is_none());
    }

    #[test]
    fn renderer_style_observer_sees_attached_component() {
        let e = Entity::new();
        let attached: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&attached);
        e.components().on(EventKind::Add, move |event| {
            if let Some(r) = event
                .component()
                .and_then(|c| c.downcast::<Renderable>())
            {
                sink.borrow_mut().push(r.borrow().layer);
            }
        });

        e.add(|| Position { x: 0.0, y: 0.0 }).unwrap();
        e.add(|| Renderable { layer: 3 }).unwrap();
        assert_eq!(*attached.borrow(), vec![3]);
    }

    #[test]
    fn despawn_destroys_and_removes_from_queries() {
        let mut entities = EntitySet::new();
        let e = entities.spawn();
        e.add(|| Position { x: 0.0, y: 0.0 }).unwrap();
        assert!(entities.despawn(e.id()));
        assert!(e.is_destroyed());
        assert!(!e.has::<Position>());
        assert_eq!(entities.query().with::<Position>().count(), 0);
        assert!(matches!(
            e.add(|| Velocity { dx: 0.0, dy: 0.0 }),
            Err(EcError::EntityDestroyed { .. })
        ));
    }

    #[test]
    fn error_messages_name_type_and_entity() {
        let e = Entity::new();
        let err = e.get::<Velocity>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Velocity"), "{msg}");
        assert!(msg.contains(&e.id().to_string()), "{msg}");
    }
}
