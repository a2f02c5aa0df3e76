//! Typed notifications emitted by the facade and the collision resolver.
//!
//! Listeners are plain closures keyed by [`EventKind`]. Emission is
//! synchronous: every listener of the event's kind runs before `emit`
//! returns, in the order it subscribed.

use std::fmt;

use citadel_ecs::entity::InstanceHandle;
use citadel_ecs::glam::{Vec2, Vec3};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    InstanceCreated {
        handle: InstanceHandle,
    },
    InstanceDestroyed {
        handle: InstanceHandle,
    },
    InstanceMoved {
        handle: InstanceHandle,
        translation: Vec3,
    },
    /// A dynamic body was pushed out of a static one by `push` (X/Z).
    StaticCollision {
        dynamic: InstanceHandle,
        fixed: InstanceHandle,
        push: Vec2,
    },
    /// Dynamic body `a` was pushed out of dynamic body `b` by `push` (X/Z).
    DynamicCollision {
        a: InstanceHandle,
        b: InstanceHandle,
        push: Vec2,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::InstanceCreated { .. } => EventKind::InstanceCreated,
            Event::InstanceDestroyed { .. } => EventKind::InstanceDestroyed,
            Event::InstanceMoved { .. } => EventKind::InstanceMoved,
            Event::StaticCollision { .. } => EventKind::StaticCollision,
            Event::DynamicCollision { .. } => EventKind::DynamicCollision,
        }
    }
}

const KIND_COUNT: usize = 5;

/// Discriminant of [`Event`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    InstanceCreated,
    InstanceDestroyed,
    InstanceMoved,
    StaticCollision,
    DynamicCollision,
}

impl EventKind {
    pub const ALL: [EventKind; KIND_COUNT] = [
        EventKind::InstanceCreated,
        EventKind::InstanceDestroyed,
        EventKind::InstanceMoved,
        EventKind::StaticCollision,
        EventKind::DynamicCollision,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Returned by [`EventBus::subscribe`]; pass to `unsubscribe` to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&Event)>;

/// Listener registry keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    listeners: [Vec<(ListenerId, Listener)>; KIND_COUNT],
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<_> = EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.listener_count(*kind)))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: impl FnMut(&Event) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners[kind.slot()].push((id, Box::new(listener)));
        id
    }

    /// Detach a listener. Returns `false` if `id` is unknown.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        for bucket in &mut self.listeners {
            if let Some(pos) = bucket.iter().position(|(lid, _)| *lid == id) {
                // `remove`, not `swap_remove`: order is observable.
                drop(bucket.remove(pos));
                return true;
            }
        }
        false
    }

    pub fn emit(&mut self, event: &Event) {
        for (_, listener) in &mut self.listeners[event.kind().slot()] {
            listener(event);
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners[kind.slot()].len()
    }

    pub fn clear(&mut self) {
        self.listeners.iter_mut().for_each(Vec::clear);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn created(i: u32) -> Event {
        Event::InstanceCreated {
            handle: InstanceHandle::new(i, 0),
        }
    }

    #[test]
    fn listeners_run_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second", "third"] {
            let log = Rc::clone(&log);
            bus.subscribe(EventKind::InstanceCreated, move |_| log.borrow_mut().push(tag));
        }
        bus.emit(&created(0));
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_notified() {
        let hits = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        let counter = Rc::clone(&hits);
        bus.subscribe(EventKind::InstanceDestroyed, move |_| *counter.borrow_mut() += 1);

        bus.emit(&created(1));
        assert_eq!(*hits.borrow(), 0);
        bus.emit(&Event::InstanceDestroyed {
            handle: InstanceHandle::new(1, 0),
        });
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn unsubscribe_keeps_remaining_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let ids: Vec<_> = (0..3)
            .map(|n| {
                let log = Rc::clone(&log);
                bus.subscribe(EventKind::InstanceCreated, move |_| log.borrow_mut().push(n))
            })
            .collect();

        assert!(bus.unsubscribe(ids[0]));
        assert!(!bus.unsubscribe(ids[0]));
        assert_eq!(bus.listener_count(EventKind::InstanceCreated), 2);

        bus.emit(&created(0));
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn event_reports_its_kind() {
        let event = Event::StaticCollision {
            dynamic: InstanceHandle::new(0, 0),
            fixed: InstanceHandle::new(1, 0),
            push: Vec2::X,
        };
        assert_eq!(event.kind(), EventKind::StaticCollision);
        assert!(EventKind::ALL.iter().enumerate().all(|(i, k)| k.slot() == i));
    }
}
