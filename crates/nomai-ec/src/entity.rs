//! Entity identifiers, entity handles, and the host-owned live entity set.
//!
//! An [`Entity`] is a reference-counted handle to an identity plus the
//! [`ComponentSystem`] created with it. Components keep a [`WeakEntity`]
//! back-reference, so entity -> component ownership stays acyclic.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::component::{Component, ComponentHandle};
use crate::query::QueryBuilder;
use crate::system::{ComponentSystem, ComponentSystemConfig};
use crate::EcError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Stable entity identity, assigned monotonically starting from 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

struct EntityInner {
    id: EntityId,
    components: ComponentSystem,
}

/// Shared handle to an entity. Clones refer to the same entity; equality and
/// hashing go by [`EntityId`].
#[derive(Clone)]
pub struct Entity(Rc<EntityInner>);

impl Entity {
    /// Create an entity with the default [`ComponentSystemConfig`].
    pub fn new() -> Self {
        Self::with_config(ComponentSystemConfig::default())
    }

    /// Create an entity whose registry uses `config`.
    pub fn with_config(config: ComponentSystemConfig) -> Self {
        let id = EntityId::next();
        Self(Rc::new_cyclic(|weak| EntityInner {
            id,
            components: ComponentSystem::new(
                WeakEntity {
                    id,
                    inner: weak.clone(),
                },
                config,
            ),
        }))
    }

    pub fn id(&self) -> EntityId {
        self.0.id
    }

    /// The entity's component registry.
    pub fn components(&self) -> &ComponentSystem {
        &self.0.components
    }

    /// Non-owning reference to this entity.
    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            id: self.0.id,
            inner: Rc::downgrade(&self.0),
        }
    }

    /// Destroy the entity: every component is removed in priority order,
    /// running its `destroy()` and publishing `remove`/`update`. Afterwards
    /// the entity rejects new components. Calling this twice is a no-op.
    pub fn destroy(&self) {
        if self.0.components.teardown() {
            debug!(entity = %self.0.id, "entity destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.components.is_torn_down()
    }

    // -- registry shorthands ------------------------------------------------

    /// Shorthand for [`ComponentSystem::add`].
    pub fn add<T, F>(&self, construct: F) -> Result<ComponentHandle<T>, EcError>
    where
        T: Component,
        F: FnOnce() -> T,
    {
        self.0.components.add(construct)
    }

    /// Shorthand for [`ComponentSystem::add_default`].
    pub fn add_default<T: Component + Default>(&self) -> Result<ComponentHandle<T>, EcError> {
        self.0.components.add_default()
    }

    /// Shorthand for [`ComponentSystem::remove`].
    pub fn remove<T: Component>(&self) -> bool {
        self.0.components.remove::<T>()
    }

    /// Shorthand for [`ComponentSystem::get`].
    pub fn get<T: Component>(&self) -> Result<ComponentHandle<T>, EcError> {
        self.0.components.get::<T>()
    }

    /// Shorthand for [`ComponentSystem::find`].
    pub fn find<T: Component>(&self) -> Option<ComponentHandle<T>> {
        self.0.components.find::<T>()
    }

    /// Shorthand for [`ComponentSystem::has`].
    pub fn has<T: Component>(&self) -> bool {
        self.0.components.has::<T>()
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.0.id)
            .field("components", &self.0.components.type_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WeakEntity
// ---------------------------------------------------------------------------

/// Non-owning back-reference to an [`Entity`]. Keeps the id even after the
/// entity is dropped.
#[derive(Clone)]
pub struct WeakEntity {
    id: EntityId,
    inner: Weak<EntityInner>,
}

impl WeakEntity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The entity, or `None` if every strong handle has been dropped.
    pub fn upgrade(&self) -> Option<Entity> {
        self.inner.upgrade().map(Entity)
    }
}

impl fmt::Debug for WeakEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakEntity({})", self.id.0)
    }
}

// ---------------------------------------------------------------------------
// EntitySet
// ---------------------------------------------------------------------------

/// Insertion-ordered set of live entities, the source queries run over.
///
/// Removing an entity keeps the relative order of the rest.
#[derive(Debug, Default)]
pub struct EntitySet {
    entities: Vec<Entity>,
    /// EntityId -> position in `entities`.
    index: HashMap<EntityId, usize>,
    config: ComponentSystemConfig,
}

impl EntitySet {
    /// Create an empty set whose spawned entities use the default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty set whose spawned entities use `config`.
    pub fn with_config(config: ComponentSystemConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Create a new entity, add it to the set, and return a handle to it.
    pub fn spawn(&mut self) -> Entity {
        let entity = Entity::with_config(self.config.clone());
        self.insert(entity.clone());
        entity
    }

    /// Add an existing entity. Returns `false` if it is already present.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.index.contains_key(&entity.id()) {
            return false;
        }
        self.index.insert(entity.id(), self.entities.len());
        self.entities.push(entity);
        true
    }

    /// Take an entity out of the set without destroying it.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let pos = self.index.remove(&id)?;
        let entity = self.entities.remove(pos);
        for moved in &self.entities[pos..] {
            if let Some(slot) = self.index.get_mut(&moved.id()) {
                *slot -= 1;
            }
        }
        Some(entity)
    }

    /// Remove and destroy an entity. Returns `false` if it was not present.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        match self.remove(id) {
            Some(entity) => {
                entity.destroy();
                debug!(entity = %id, remaining = self.entities.len(), "entity despawned");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.index.get(&id).map(|&pos| &self.entities[pos])
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.index.contains_key(&entity.id())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }

    /// Start a query over this set.
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.entities)
    }

    /// Destroy every entity and empty the set.
    pub fn clear(&mut self) {
        let count = self.entities.len();
        for entity in self.entities.drain(..) {
            entity.destroy();
        }
        self.index.clear();
        debug!(count, "entity set cleared");
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Extend<Entity> for EntitySet {
    fn extend<I: IntoIterator<Item = Entity>>(&mut self, iter: I) {
        for entity in iter {
            self.insert(entity);
        }
    }
}

impl FromIterator<Entity> for EntitySet {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
