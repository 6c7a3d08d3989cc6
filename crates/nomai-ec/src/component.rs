//! The [`Component`] trait and the handles the registry hands out.
//!
//! The registry wraps every component in a shared cell that also records the
//! owning entity and the priority read at add time. [`ComponentHandle<T>`] is
//! the typed view of that cell; [`AnyComponent`] is the type-erased view used
//! for priority-ordered iteration and event payloads.

use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::entity::{Entity, EntityId, WeakEntity};

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A typed unit of behavior or data attached to exactly one entity.
///
/// Both methods have defaults, so plain data types only need an empty impl.
pub trait Component: 'static {
    /// Iteration order key among an entity's components. Lower runs first.
    ///
    /// Read once when the component is added; later changes do not reorder
    /// the registry.
    fn priority(&self) -> i32 {
        0
    }

    /// Release whatever the component holds. Called exactly once, when the
    /// component is removed, its entity is destroyed, or the last entity
    /// handle is dropped.
    fn destroy(&mut self) {}
}

// ---------------------------------------------------------------------------
// ComponentCell -- registry storage for one instance
// ---------------------------------------------------------------------------

pub(crate) struct ComponentCell<T> {
    owner: WeakEntity,
    priority: i32,
    destroyed: Cell<bool>,
    value: RefCell<T>,
}

/// Object-safe view of a [`ComponentCell`] used by the untyped registry paths.
pub(crate) trait ErasedCell {
    fn type_name(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn owner(&self) -> &WeakEntity;
    /// Runs `destroy()` unless it already started. Returns whether it ran.
    fn destroy(&self) -> bool;
    fn is_destroyed(&self) -> bool;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Component> ErasedCell for ComponentCell<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn owner(&self) -> &WeakEntity {
        &self.owner
    }

    fn destroy(&self) -> bool {
        if self.destroyed.replace(true) {
            return false;
        }
        self.value.borrow_mut().destroy();
        true
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentHandle
// ---------------------------------------------------------------------------

/// Shared, typed handle to a component owned by an entity's registry.
///
/// Cloning is cheap. A handle stays valid after the component is removed, but
/// the registry no longer knows about it.
pub struct ComponentHandle<T: Component> {
    cell: Rc<ComponentCell<T>>,
}

impl<T: Component> ComponentHandle<T> {
    pub(crate) fn new(owner: WeakEntity, value: T) -> Self {
        let priority = value.priority();
        Self {
            cell: Rc::new(ComponentCell {
                owner,
                priority,
                destroyed: Cell::new(false),
                value: RefCell::new(value),
            }),
        }
    }

    /// Immutably borrow the component.
    ///
    /// # Panics
    ///
    /// Panics if the component is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.value.borrow()
    }

    /// Mutably borrow the component.
    ///
    /// # Panics
    ///
    /// Panics if the component is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.value.borrow_mut()
    }

    /// The owning entity, or `None` once it has been dropped.
    pub fn entity(&self) -> Option<Entity> {
        self.cell.owner.upgrade()
    }

    /// Id of the owning entity. Available even after the entity is dropped.
    pub fn entity_id(&self) -> EntityId {
        self.cell.owner.id()
    }

    /// Priority captured when the component was added.
    pub fn priority(&self) -> i32 {
        self.cell.priority
    }

    /// Whether both handles point at the same component instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Type-erased handle to the same instance.
    pub fn erase(&self) -> AnyComponent {
        AnyComponent {
            type_id: TypeId::of::<T>(),
            cell: self.cell.clone(),
        }
    }
}

impl<T: Component> Clone for ComponentHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: Component + fmt::Debug> fmt::Debug for ComponentHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ComponentHandle");
        s.field("entity", &self.entity_id())
            .field("priority", &self.cell.priority);
        match self.cell.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &format_args!("<borrowed>")),
        };
        s.finish()
    }
}

// ---------------------------------------------------------------------------
// AnyComponent
// ---------------------------------------------------------------------------

/// Type-erased handle to a registered component.
///
/// Returned by priority-ordered iteration and carried by lifecycle events.
/// Use [`downcast`](Self::downcast) to recover the typed handle.
#[derive(Clone)]
pub struct AnyComponent {
    type_id: TypeId,
    cell: Rc<dyn ErasedCell>,
}

impl AnyComponent {
    /// Rust type name of the concrete component.
    pub fn type_name(&self) -> &'static str {
        self.cell.type_name()
    }

    /// `TypeId` of the concrete component.
    pub fn component_type(&self) -> TypeId {
        self.type_id
    }

    /// Priority captured when the component was added.
    pub fn priority(&self) -> i32 {
        self.cell.priority()
    }

    /// The owning entity, or `None` once it has been dropped.
    pub fn entity(&self) -> Option<Entity> {
        self.cell.owner().upgrade()
    }

    /// Id of the owning entity.
    pub fn entity_id(&self) -> EntityId {
        self.cell.owner().id()
    }

    /// Whether the concrete component type is `T`.
    pub fn is<T: Component>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Recover the typed handle, or `None` if the component is not a `T`.
    pub fn downcast<T: Component>(&self) -> Option<ComponentHandle<T>> {
        if !self.is::<T>() {
            return None;
        }
        let cell = Rc::clone(&self.cell)
            .into_any()
            .downcast::<ComponentCell<T>>()
            .ok()?;
        Some(ComponentHandle { cell })
    }

    /// Whether both handles point at the same component instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.cell), Rc::as_ptr(&other.cell))
    }

    /// Whether `destroy()` has started for this instance.
    pub fn is_destroyed(&self) -> bool {
        self.cell.is_destroyed()
    }

    /// Runs `destroy()` at most once per instance. Returns `false` if it
    /// already started.
    pub(crate) fn destroy(&self) -> bool {
        self.cell.destroy()
    }
}

impl fmt::Debug for AnyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyComponent")
            .field("type", &self.type_name())
            .field("priority", &self.priority())
            .field("entity", &self.entity_id())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
