//! Binding context: the entity whose component is currently being constructed.
//!
//! [`ComponentSystem::add`](crate::system::ComponentSystem::add) binds its
//! owning entity around the constructor call, so a component can look up its
//! owner with [`current_entity`] without every constructor taking an entity
//! parameter.
//!
//! The slot is thread-local. Binding goes through a [`BindingGuard`] that
//! restores the previous value on drop, including while unwinding from a
//! panicking constructor, so a binding never leaks into an unrelated
//! construction.
//!
//! The slot must be read synchronously inside the constructor. Once the
//! constructor returns the binding is gone.

use std::cell::RefCell;

use crate::entity::Entity;

thread_local! {
    static CURRENT_ENTITY: RefCell<Option<Entity>> = const { RefCell::new(None) };
}

fn replace_current(entity: Option<Entity>) -> Option<Entity> {
    CURRENT_ENTITY.with(|slot| slot.replace(entity))
}

/// Store `entity` as the current construction target.
///
/// Prefer [`bind`], which clears the slot again when the guard drops.
pub fn set_current_entity(entity: &Entity) {
    replace_current(Some(entity.clone()));
}

/// Clear the current construction target.
pub fn reset_current_entity() {
    replace_current(None);
}

/// The entity currently under component construction, if any.
pub fn current_entity() -> Option<Entity> {
    CURRENT_ENTITY.with(|slot| slot.borrow().clone())
}

/// Scoped binding returned by [`bind`]. Restores the previous binding on drop.
#[must_use = "the binding is released as soon as the guard is dropped"]
pub struct BindingGuard {
    previous: Option<Entity>,
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The slot may already be gone during thread teardown.
        let _ = CURRENT_ENTITY.try_with(|slot| slot.replace(previous));
    }
}

/// Bind `entity` as the current construction target until the guard drops.
///
/// Nested bindings are allowed: dropping the inner guard restores the outer
/// entity.
pub fn bind(entity: &Entity) -> BindingGuard {
    BindingGuard {
        previous: replace_current(Some(entity.clone())),
    }
}

/// Run `f` with `entity` bound as the current construction target.
pub fn with_current_entity<R>(entity: &Entity, f: impl FnOnce() -> R) -> R {
    let _guard = bind(entity);
    f()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
