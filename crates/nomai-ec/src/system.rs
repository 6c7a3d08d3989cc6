//! Per-entity component registry and lifecycle engine.
//!
//! A [`ComponentSystem`] maps each component type to its single live instance
//! on one entity. It owns add/remove lifecycle (binding context, `destroy()`,
//! events) and caches a priority-ordered view of its components.
//!
//! ## Ordering cache
//!
//! The sorted view is either [`Stale`](OrderCache::Stale) or
//! [`Valid`](OrderCache::Valid). Every structural mutation marks it stale;
//! the next read re-sorts and stores the result. Sorting is stable over
//! insertion order, so equal priorities keep the order they were added in.
//!
//! ## Reentrancy
//!
//! No internal borrow is held while user code runs (constructors, `destroy()`,
//! listeners), so any of them may call back into the registry.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::binding;
use crate::component::{AnyComponent, Component, ComponentHandle};
use crate::entity::{Entity, EntityId, WeakEntity};
use crate::events::{ComponentEvent, ComponentEvents, EventKind, ListenerId};
use crate::EcError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What [`ComponentSystem::clear`] does with the components it discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearPolicy {
    /// Drop the components without calling `destroy()`. Cleanup then relies
    /// on each component's `Drop` impl.
    #[default]
    Wipe,
    /// Call `destroy()` on each component in priority order, then drop them.
    DestroyEach,
}

/// Registry behavior knobs, fixed when the entity is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentSystemConfig {
    /// Behavior of [`ComponentSystem::clear`]. Default: [`ClearPolicy::Wipe`].
    pub clear_policy: ClearPolicy,
    /// Log a warning when a [`ClearPolicy::Wipe`] clear discards live
    /// components without destroying them. Default: `false`.
    pub warn_on_wipe: bool,
}

// ---------------------------------------------------------------------------
// OrderCache
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum OrderCache {
    Stale,
    Valid(Vec<AnyComponent>),
}

// ---------------------------------------------------------------------------
// ComponentSystem
// ---------------------------------------------------------------------------

/// Component registry of a single entity. Holds at most one instance per
/// component type.
///
/// Created together with its [`Entity`] and reached through
/// [`Entity::components`].
pub struct ComponentSystem {
    owner: WeakEntity,
    config: ComponentSystemConfig,
    /// Insertion order. At most one entry per `TypeId`; entities carry a
    /// handful of components, so lookups scan.
    slots: RefCell<Vec<AnyComponent>>,
    order: RefCell<OrderCache>,
    events: ComponentEvents,
    torn_down: Cell<bool>,
}

impl ComponentSystem {
    pub(crate) fn new(owner: WeakEntity, config: ComponentSystemConfig) -> Self {
        Self {
            owner,
            config,
            slots: RefCell::new(Vec::new()),
            order: RefCell::new(OrderCache::Valid(Vec::new())),
            events: ComponentEvents::new(),
            torn_down: Cell::new(false),
        }
    }

    /// Id of the owning entity.
    pub fn entity_id(&self) -> EntityId {
        self.owner.id()
    }

    /// The owning entity.
    pub fn entity(&self) -> Option<Entity> {
        self.owner.upgrade()
    }

    pub fn config(&self) -> &ComponentSystemConfig {
        &self.config
    }

    /// Lifecycle channel for this entity's components.
    pub fn events(&self) -> &ComponentEvents {
        &self.events
    }

    /// Shorthand for `self.events().on(kind, listener)`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ComponentEvent) + 'static,
    {
        self.events.on(kind, listener)
    }

    // -- lifecycle ----------------------------------------------------------

    /// Construct a `T` and attach it to this entity.
    ///
    /// The owning entity is bound in the [binding context](crate::binding)
    /// while `construct` runs, so the constructor can call
    /// [`current_entity`](crate::binding::current_entity). On success the
    /// registry publishes `add` and then `update`.
    ///
    /// # Errors
    ///
    /// - [`EcError::DuplicateComponent`] if a `T` is already attached. The
    ///   check happens before `construct` runs.
    /// - [`EcError::EntityDestroyed`] if the entity has been destroyed.
    pub fn add<T, F>(&self, construct: F) -> Result<ComponentHandle<T>, EcError>
    where
        T: Component,
        F: FnOnce() -> T,
    {
        let entity = self.owner.id();
        if self.torn_down.get() {
            return Err(EcError::EntityDestroyed { entity });
        }
        if self.has::<T>() {
            return Err(self.duplicate::<T>());
        }
        let owner = self
            .owner
            .upgrade()
            .ok_or(EcError::EntityDestroyed { entity })?;

        let value = binding::with_current_entity(&owner, construct);

        // The constructor itself may have attached a T.
        if self.has::<T>() {
            return Err(self.duplicate::<T>());
        }

        let handle = ComponentHandle::new(self.owner.clone(), value);
        let erased = handle.erase();
        self.slots.borrow_mut().push(erased.clone());
        self.invalidate();
        trace!(
            entity = %entity,
            component = erased.type_name(),
            priority = erased.priority(),
            "component added"
        );

        self.events.emit(&ComponentEvent::Added(erased));
        self.events.emit(&ComponentEvent::Updated);
        Ok(handle)
    }

    /// [`add`](Self::add) using `T::default` as the constructor.
    pub fn add_default<T: Component + Default>(&self) -> Result<ComponentHandle<T>, EcError> {
        self.add(T::default)
    }

    /// Detach and destroy the `T` on this entity.
    ///
    /// Runs `destroy()`, deletes the entry, then publishes `remove` and
    /// `update`, so listeners see a registry without the component. Returns
    /// `false` without publishing anything if no `T` is attached.
    ///
    /// A `destroy()` may remove other components, remove its own type, or
    /// destroy the entity; the instance already being destroyed is skipped.
    ///
    /// # Panics
    ///
    /// Panics if the component is borrowed when `destroy()` runs.
    pub fn remove<T: Component>(&self) -> bool {
        self.remove_type(TypeId::of::<T>())
    }

    fn remove_type(&self, type_id: TypeId) -> bool {
        let Some(component) = self.find_erased(type_id) else {
            return false;
        };
        // Already being destroyed further up the stack; that caller finishes
        // the removal.
        if !component.destroy() {
            return false;
        }

        {
            let mut slots = self.slots.borrow_mut();
            if let Some(pos) = slots.iter().position(|c| c.ptr_eq(&component)) {
                slots.remove(pos);
            }
        }
        self.invalidate();
        trace!(
            entity = %self.owner.id(),
            component = component.type_name(),
            "component removed"
        );

        self.events.emit(&ComponentEvent::Removed(component));
        self.events.emit(&ComponentEvent::Updated);
        true
    }

    /// Empty the registry without publishing events.
    ///
    /// With [`ClearPolicy::Wipe`] (the default) components are dropped
    /// without `destroy()`. With [`ClearPolicy::DestroyEach`] each one is
    /// destroyed in priority order first; components an earlier `destroy()`
    /// already removed are skipped.
    pub fn clear(&self) {
        if self.config.clear_policy == ClearPolicy::DestroyEach {
            for component in self.all() {
                if self.contains(&component) {
                    component.destroy();
                }
            }
        }

        let discarded = std::mem::take(&mut *self.slots.borrow_mut());
        *self.order.borrow_mut() = OrderCache::Valid(Vec::new());

        if self.config.clear_policy == ClearPolicy::Wipe
            && self.config.warn_on_wipe
            && !discarded.is_empty()
        {
            warn!(
                entity = %self.owner.id(),
                count = discarded.len(),
                "clear discarded components without destroy()"
            );
        }
        debug!(
            entity = %self.owner.id(),
            count = discarded.len(),
            policy = ?self.config.clear_policy,
            "components cleared"
        );
    }

    /// Remove every component through [`remove`](Self::remove) and refuse
    /// further adds. Returns `false` if already torn down.
    pub(crate) fn teardown(&self) -> bool {
        if self.torn_down.replace(true) {
            return false;
        }
        for component in self.all() {
            self.remove_type(component.component_type());
        }
        true
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    // -- lookup -------------------------------------------------------------

    /// The attached `T`.
    ///
    /// # Errors
    ///
    /// [`EcError::ComponentNotFound`] if no `T` is attached. Use
    /// [`find`](Self::find) when the component is optional.
    pub fn get<T: Component>(&self) -> Result<ComponentHandle<T>, EcError> {
        self.find::<T>().ok_or_else(|| EcError::ComponentNotFound {
            component: std::any::type_name::<T>(),
            entity: self.owner.id(),
        })
    }

    /// The attached `T`, if any.
    pub fn find<T: Component>(&self) -> Option<ComponentHandle<T>> {
        self.find_erased(TypeId::of::<T>())?.downcast::<T>()
    }

    pub fn has<T: Component>(&self) -> bool {
        self.has_type(TypeId::of::<T>())
    }

    /// Whether a component with the given `TypeId` is attached.
    pub fn has_type(&self, type_id: TypeId) -> bool {
        self.slots
            .borrow()
            .iter()
            .any(|c| c.component_type() == type_id)
    }

    fn contains(&self, component: &AnyComponent) -> bool {
        self.slots.borrow().iter().any(|c| c.ptr_eq(component))
    }

    fn find_erased(&self, type_id: TypeId) -> Option<AnyComponent> {
        self.slots
            .borrow()
            .iter()
            .find(|c| c.component_type() == type_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Type names of the attached components, in insertion order.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.slots.borrow().iter().map(|c| c.type_name()).collect()
    }

    // -- ordered iteration --------------------------------------------------

    /// Snapshot of the attached components, ascending by priority.
    ///
    /// Later mutations do not affect a snapshot already taken.
    pub fn all(&self) -> Vec<AnyComponent> {
        let mut cache = self.order.borrow_mut();
        if let OrderCache::Valid(sorted) = &*cache {
            return sorted.clone();
        }
        let mut sorted = self.slots.borrow().clone();
        sorted.sort_by_key(AnyComponent::priority);
        *cache = OrderCache::Valid(sorted.clone());
        sorted
    }

    /// Call `f` once per component in priority order.
    ///
    /// Iterates a snapshot: components added or removed by `f` do not change
    /// the current pass.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&AnyComponent),
    {
        for component in &self.all() {
            f(component);
        }
    }

    fn invalidate(&self) {
        *self.order.borrow_mut() = OrderCache::Stale;
    }

    fn duplicate<T>(&self) -> EcError {
        EcError::DuplicateComponent {
            component: std::any::type_name::<T>(),
            entity: self.owner.id(),
        }
    }
}

/// Runs the pending `destroy()` hooks of an entity dropped without
/// [`Entity::destroy`]. No events are published since the entity can no
/// longer be upgraded.
impl Drop for ComponentSystem {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let mut remaining = std::mem::take(self.slots.get_mut());
        if remaining.is_empty() {
            return;
        }
        remaining.sort_by_key(AnyComponent::priority);
        for component in &remaining {
            component.destroy();
        }
        trace!(
            entity = %self.owner.id(),
            count = remaining.len(),
            "dropped entity destroyed its components"
        );
    }
}

impl fmt::Debug for ComponentSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSystem")
            .field("entity", &self.owner.id())
            .field("components", &self.type_names())
            .field("config", &self.config)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
