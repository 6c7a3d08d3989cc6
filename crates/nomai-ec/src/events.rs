//! Per-entity publish/subscribe channel for component lifecycle changes.
//!
//! Every [`ComponentSystem`](crate::system::ComponentSystem) owns one
//! [`ComponentEvents`]. `add` publishes [`ComponentEvent::Added`] followed by
//! [`ComponentEvent::Updated`]; `remove` publishes [`ComponentEvent::Removed`]
//! followed by [`ComponentEvent::Updated`]. Both are published after the
//! registry mutation has been applied.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::component::AnyComponent;

/// The three named lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Remove,
    Update,
}

impl EventKind {
    /// Event name as used by listeners: `"add"`, `"remove"` or `"update"`.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Add => "add",
            EventKind::Remove => "remove",
            EventKind::Update => "update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lifecycle event and its payload.
#[derive(Debug, Clone)]
pub enum ComponentEvent {
    /// A component was attached.
    Added(AnyComponent),
    /// A component was detached and destroyed.
    Removed(AnyComponent),
    /// The registry changed. Carries no component.
    Updated,
}

impl ComponentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ComponentEvent::Added(_) => EventKind::Add,
            ComponentEvent::Removed(_) => EventKind::Remove,
            ComponentEvent::Updated => EventKind::Update,
        }
    }

    /// The affected component, `None` for [`ComponentEvent::Updated`].
    pub fn component(&self) -> Option<&AnyComponent> {
        match self {
            ComponentEvent::Added(c) | ComponentEvent::Removed(c) => Some(c),
            ComponentEvent::Updated => None,
        }
    }
}

/// Token returned by [`ComponentEvents::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&ComponentEvent)>;

/// Named-event channel scoped to one entity's components.
pub struct ComponentEvents {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, EventKind, Listener)>>,
}

impl ComponentEvents {
    pub(crate) fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Subscribe `listener` to events of `kind`. Listeners run in subscription
    /// order.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ComponentEvent) + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .push((id, kind, Rc::new(listener)));
        trace!(event = %kind, listener = id.0, "listener subscribed");
        id
    }

    /// Unsubscribe a listener. Returns `false` if it was not subscribed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    /// Number of listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    /// Deliver `event` to every listener of its kind.
    ///
    /// The listener list is snapshotted first: listeners may subscribe,
    /// unsubscribe, or mutate the registry while being notified, and such
    /// changes take effect from the next emission.
    pub(crate) fn emit(&self, event: &ComponentEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| Rc::clone(l))
            .collect();
        for listener in targets {
            listener(event);
        }
    }
}

impl fmt::Debug for ComponentEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentEvents")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
