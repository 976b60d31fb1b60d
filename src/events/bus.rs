//! Synchronous publish/subscribe bus
//!
//! Subscribers run on the publisher's thread, in subscription order:
//! per-event subscribers first, then wildcard subscribers. A subscriber that
//! returns an error or panics is logged and counted; the remaining
//! subscribers still run and the publisher never sees the failure.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::error;

/// Handle returned by the subscribe methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback<P> = Box<dyn FnMut(&P) -> anyhow::Result<()>>;
type WildcardCallback<P> = Box<dyn FnMut(&str, &P) -> anyhow::Result<()>>;

struct Subscriber<P> {
    callback: Callback<P>,
    once: bool,
}

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Event bus generic over its payload type
pub struct EventBus<P> {
    topics: HashMap<String, BTreeMap<SubscriptionId, Subscriber<P>>>,
    wildcard: BTreeMap<SubscriptionId, WildcardCallback<P>>,
    /// Subscription to its topic, `None` for wildcard
    index: HashMap<SubscriptionId, Option<String>>,
    next_id: u64,
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self {
            topics: HashMap::new(),
            wildcard: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.topics.len())
            .field("wildcard", &self.wildcard.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }

    fn add(&mut self, event: String, callback: Callback<P>, once: bool) -> SubscriptionId {
        let id = self.next_id();
        self.topics
            .entry(event.clone())
            .or_default()
            .insert(id, Subscriber { callback, once });
        self.index.insert(id, Some(event));
        id
    }

    /// Subscribe to one event
    pub fn subscribe<F>(&mut self, event: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: FnMut(&P) -> anyhow::Result<()> + 'static,
    {
        self.add(event.into(), Box::new(callback), false)
    }

    /// Subscribe to the next occurrence of one event
    pub fn subscribe_once<F>(&mut self, event: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: FnMut(&P) -> anyhow::Result<()> + 'static,
    {
        self.add(event.into(), Box::new(callback), true)
    }

    /// Subscribe to every event; the callback also receives the event name
    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&str, &P) -> anyhow::Result<()> + 'static,
    {
        let id = self.next_id();
        self.wildcard.insert(id, Box::new(callback));
        self.index.insert(id, None);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.index.remove(&id) {
            Some(Some(event)) => {
                let removed = self
                    .topics
                    .get_mut(&event)
                    .map_or(false, |subscribers| subscribers.remove(&id).is_some());
                if self.topics.get(&event).map_or(false, BTreeMap::is_empty) {
                    self.topics.remove(&event);
                }
                removed
            }
            Some(None) => self.wildcard.remove(&id).is_some(),
            None => false,
        }
    }

    /// Deliver `payload` to every subscriber of `event`
    pub fn publish(&mut self, event: &str, payload: &P) -> PublishReport {
        let mut report = PublishReport::default();
        let mut fired_once = Vec::new();

        if let Some(subscribers) = self.topics.get_mut(event) {
            for (id, subscriber) in subscribers.iter_mut() {
                let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(payload)));
                record(&mut report, event, *id, outcome);
                if subscriber.once {
                    fired_once.push(*id);
                }
            }
        }

        for (id, callback) in self.wildcard.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(event, payload)));
            record(&mut report, event, *id, outcome);
        }

        for id in fired_once {
            self.unsubscribe(id);
        }
        report
    }

    /// Remove every subscriber of one event
    pub fn clear(&mut self, event: &str) -> usize {
        let Some(subscribers) = self.topics.remove(event) else {
            return 0;
        };
        for id in subscribers.keys() {
            self.index.remove(id);
        }
        subscribers.len()
    }

    /// Remove every subscriber, wildcard included
    pub fn clear_all(&mut self) -> usize {
        let count = self.index.len();
        self.topics.clear();
        self.wildcard.clear();
        self.index.clear();
        count
    }

    /// Subscribers that would receive `event`, wildcard included
    pub fn listener_count(&self, event: &str) -> usize {
        self.topics.get(event).map_or(0, BTreeMap::len) + self.wildcard.len()
    }
}

fn record(
    report: &mut PublishReport,
    event: &str,
    id: SubscriptionId,
    outcome: std::thread::Result<anyhow::Result<()>>,
) {
    match outcome {
        Ok(Ok(())) => report.delivered += 1,
        Ok(Err(e)) => {
            error!(event = %event, subscription = %id, "Subscriber failed: {:#}", e);
            report.failed += 1;
        }
        Err(panic) => {
            error!(
                event = %event,
                subscription = %id,
                "Subscriber panicked: {}",
                panic_message(panic.as_ref())
            );
            report.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_delivery_order() {
        let mut bus: EventBus<u32> = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        bus.subscribe_all(move |event, n| {
            l.borrow_mut().push(format!("all:{}:{}", event, n));
            Ok(())
        });
        let l = log.clone();
        bus.subscribe("tick", move |n| {
            l.borrow_mut().push(format!("first:{}", n));
            Ok(())
        });
        let l = log.clone();
        bus.subscribe("tick", move |n| {
            l.borrow_mut().push(format!("second:{}", n));
            Ok(())
        });

        let report = bus.publish("tick", &7);
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.borrow(), vec!["first:7", "second:7", "all:tick:7"]);
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let mut bus: EventBus<u32> = EventBus::new();
        let seen = Rc::new(RefCell::new(0));

        bus.subscribe("tick", |_| anyhow::bail!("subscriber error"));
        bus.subscribe("tick", |_| panic!("subscriber panic"));
        let s = seen.clone();
        bus.subscribe("tick", move |n| {
            *s.borrow_mut() += *n;
            Ok(())
        });

        let report = bus.publish("tick", &5);
        assert_eq!(report, PublishReport { delivered: 1, failed: 2 });
        assert_eq!(*seen.borrow(), 5);
    }

    #[test]
    fn test_subscribe_once() {
        let mut bus: EventBus<u32> = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        bus.subscribe_once("tick", move |_| {
            *c.borrow_mut() += 1;
            Ok(())
        });

        bus.publish("tick", &1);
        bus.publish("tick", &2);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.listener_count("tick"), 0);
    }

    #[test]
    fn test_unsubscribe_and_clear() {
        let mut bus: EventBus<u32> = EventBus::new();
        let a = bus.subscribe("a", |_| Ok(()));
        bus.subscribe("a", |_| Ok(()));
        bus.subscribe("b", |_| Ok(()));
        let all = bus.subscribe_all(|_, _| Ok(()));

        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        assert_eq!(bus.listener_count("a"), 2);
        assert_eq!(bus.clear("a"), 1);
        assert!(bus.unsubscribe(all));
        assert_eq!(bus.clear_all(), 1);
        assert_eq!(bus.publish("b", &0), PublishReport::default());
    }
}
