use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

pub type Listener = Rc<dyn Fn(Option<&Value>)>;

/// Fan-out for host events that are not addressed to a node, such as
/// `keydown`.
#[derive(Default)]
pub struct HostEventBus {
    next_id: u64,
    listeners: BTreeMap<String, BTreeMap<SubscriptionId, Listener>>,
}

impl HostEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, event: &str, listener: impl Fn(Option<&Value>) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners
            .entry(event.to_string())
            .or_default()
            .insert(id, Rc::new(listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, listeners| {
            removed |= listeners.remove(&id).is_some();
            !listeners.is_empty()
        });
        removed
    }

    /// Snapshot of the listeners for `event`, in subscription order. Callers
    /// invoke them after releasing any borrow of the bus.
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.listeners
            .get(event)
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dispatch(&self, event: &str, payload: Option<&Value>) -> usize {
        let listeners = self.listeners(event);
        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for HostEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn dispatch_reaches_only_matching_subscribers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = HostEventBus::new();
        let log = Rc::clone(&seen);
        bus.subscribe("keydown", move |payload| {
            log.borrow_mut().push(payload.cloned());
        });
        bus.subscribe("other", |_| panic!("wrong event"));

        let hits = bus.dispatch("keydown", Some(&json!({ "input": "k" })));

        assert_eq!(hits, 1);
        assert_eq!(*seen.borrow(), vec![Some(json!({ "input": "k" }))]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let mut bus = HostEventBus::new();
        let counter = Rc::clone(&count);
        let id = bus.subscribe("keydown", move |_| *counter.borrow_mut() += 1);

        bus.dispatch("keydown", None);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.dispatch("keydown", None);

        assert_eq!(*count.borrow(), 1);
        assert!(bus.is_empty());
    }
}
