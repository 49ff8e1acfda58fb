//! Synchronous multicast signals for pool events.
//!
//! A [`Signal`] is an explicit observer list: subscribers are invoked in
//! subscription order, synchronously, during the mutating call that emits.
//! There is no deferred queue — consumers depend on immediate, ordered
//! visibility (a reactor's membership must be current before the triggering
//! registry call returns).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lattice_component::Entity;
use serde_json::Value;

type Callback = Rc<dyn Fn(Entity, &Value)>;

/// Identifies one subscription so it can be disconnected later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// A multicast notification point carrying an entity and a payload.
#[derive(Default)]
pub struct Signal {
    subscribers: RefCell<Vec<(SubscriberId, Callback)>>,
    next_id: Cell<u64>,
}

impl Signal {
    /// Create a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Subscribers fire in subscription order.
    pub fn connect(&self, callback: impl Fn(Entity, &Value) + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.subscribers.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns `true` if it was connected.
    pub fn disconnect(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Invoke every subscriber with `entity` and `value`.
    ///
    /// The subscriber list is snapshotted first, so handlers may connect or
    /// disconnect (including themselves) without corrupting the dispatch in
    /// flight.
    pub fn emit(&self, entity: Entity, value: &Value) {
        let snapshot: Vec<Callback> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(entity, value);
        }
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;

    fn entity() -> Entity {
        Entity::new(1, 0)
    }

    #[test]
    fn test_subscribers_fire_in_order() {
        let signal = Signal::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s1 = Rc::clone(&seen);
        signal.connect(move |_, _| s1.borrow_mut().push(1));
        let s2 = Rc::clone(&seen);
        signal.connect(move |_, _| s2.borrow_mut().push(2));

        signal.emit(entity(), &json!(null));
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let signal = Signal::new();
        let count = Rc::new(Cell::new(0u32));

        let c = Rc::clone(&count);
        let id = signal.connect(move |_, _| c.set(c.get() + 1));

        signal.emit(entity(), &json!(null));
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(entity(), &json!(null));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_connect_during_dispatch_is_deferred_to_next_emit() {
        let signal = Rc::new(Signal::new());
        let count = Rc::new(Cell::new(0u32));

        let sig = Rc::clone(&signal);
        let c = Rc::clone(&count);
        signal.connect(move |_, _| {
            let c2 = Rc::clone(&c);
            sig.connect(move |_, _| c2.set(c2.get() + 1));
        });

        // The handler added during dispatch must not fire within it.
        signal.emit(entity(), &json!(null));
        assert_eq!(count.get(), 0);
        signal.emit(entity(), &json!(null));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_payload_is_passed_through() {
        let signal = Signal::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        signal.connect(move |e, v| s.borrow_mut().push((e, v.clone())));

        signal.emit(entity(), &json!({"hp": 3}));
        assert_eq!(*seen.borrow(), vec![(entity(), json!({"hp": 3}))]);
    }
}
