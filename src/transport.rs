// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{Patch, SessionConfig};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Called once per patch received on a topic, including echoes of the
/// subscriber's own publications. Handlers should only enqueue; the
/// dispatch loop does the merging on its own schedule.
pub type Handler = Box<dyn Fn(Patch) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subscription {
    pub topic: String,
    pub(crate) id: u64,
}

/// A publish/subscribe medium. Delivery is at-least-once and unordered;
/// `publish` never blocks and never fails from the caller's point of view.
pub trait Transport {
    fn publish(&self, topic: &str, patch: &Patch);

    fn subscribe(&self, topic: &str, handler: Handler) -> Subscription;

    /// Releases a subscription. Unknown or already released subscriptions
    /// are ignored.
    fn unsubscribe(&self, subscription: &Subscription);

    /// Gives backends that have to go and fetch updates a chance to do so.
    /// Push-based backends deliver from `publish` and leave this empty.
    fn poll(&self) {}
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn publish(&self, topic: &str, patch: &Patch) {
        (**self).publish(topic, patch)
    }
    fn subscribe(&self, topic: &str, handler: Handler) -> Subscription {
        (**self).subscribe(topic, handler)
    }
    fn unsubscribe(&self, subscription: &Subscription) {
        (**self).unsubscribe(subscription)
    }
    fn poll(&self) {
        (**self).poll()
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A handler that panicked mid-delivery leaves nothing half-written in
    // the maps guarded here.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    handlers: BTreeMap<String, BTreeMap<u64, Arc<Handler>>>,
    online: bool,
    backlog: Vec<(String, Patch)>,
}

/// An in-process broadcast bus, the same-device backend: every clone of a
/// bus is a connection to the same medium, scoped to one namespace.
///
/// The bus can be taken offline. While offline, publications are held back
/// and delivered, in order, once it comes back.
#[derive(Clone)]
pub struct LocalBus {
    namespace: String,
    state: Arc<Mutex<BusState>>,
}

impl LocalBus {
    pub fn new(namespace: impl Into<String>) -> Self {
        let state = BusState {
            online: true,
            ..BusState::default()
        };
        LocalBus {
            namespace: namespace.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A bus for the configured namespace.
    pub fn from_config(config: &SessionConfig) -> Self {
        LocalBus::new(config.namespace.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn channel(&self, topic: &str) -> String {
        format!("{}/{}", self.namespace, topic)
    }

    pub fn set_online(&self, online: bool) {
        let backlog = {
            let mut state = lock(&self.state);
            state.online = online;
            if !online {
                debug!("bus {} went offline", self.namespace);
                return;
            }
            std::mem::take(&mut state.backlog)
        };
        debug!(
            "bus {} back online, flushing {} held patches",
            self.namespace,
            backlog.len()
        );
        for (channel, patch) in backlog {
            self.deliver(&channel, patch);
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let state = lock(&self.state);
        state
            .handlers
            .get(&self.channel(topic))
            .map_or(0, |subs| subs.len())
    }

    fn deliver(&self, channel: &str, patch: Patch) {
        // Handlers run outside the lock so one may publish or unsubscribe.
        let handlers: Vec<Arc<Handler>> = {
            let state = lock(&self.state);
            match state.handlers.get(channel) {
                Some(subs) => subs.values().cloned().collect(),
                None => Vec::new(),
            }
        };
        trace!(
            "bus delivering {} writes on {} to {} subscribers",
            patch.len(),
            channel,
            handlers.len()
        );
        for handler in handlers {
            handler(patch.clone());
        }
    }
}

impl Transport for LocalBus {
    fn publish(&self, topic: &str, patch: &Patch) {
        let channel = self.channel(topic);
        {
            let mut state = lock(&self.state);
            if !state.online {
                trace!("bus offline, holding patch for {}", channel);
                state.backlog.push((channel, patch.clone()));
                return;
            }
        }
        self.deliver(&channel, patch.clone());
    }

    fn subscribe(&self, topic: &str, handler: Handler) -> Subscription {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state
            .handlers
            .entry(self.channel(topic))
            .or_default()
            .insert(id, Arc::new(handler));
        Subscription {
            topic: topic.to_string(),
            id,
        }
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        let mut state = lock(&self.state);
        let channel = self.channel(&subscription.topic);
        if let Some(subs) = state.handlers.get_mut(&channel) {
            subs.remove(&subscription.id);
            if subs.is_empty() {
                state.handlers.remove(&channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemberIdentity, Role, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn patch() -> Patch {
        Patch::new(vec![Write::Enroll {
            identity: MemberIdentity::new("m1", "Member One", Role::Delegate),
        }])
    }

    fn counter(bus: &LocalBus, topic: &str) -> (Subscription, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let sub = bus.subscribe(
            topic,
            Box::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (sub, seen)
    }

    #[test]
    fn publisher_hears_its_own_echo() {
        let bus = LocalBus::new("ns");
        let (_sub, seen) = counter(&bus, "session");
        bus.publish("session", &patch());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topics_and_namespaces_are_separate() {
        let bus = LocalBus::new("ns");
        let other = LocalBus::new("elsewhere");
        let (_sub, seen) = counter(&bus, "session");
        bus.publish("other-topic", &patch());
        other.publish("session", &patch());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bus_takes_its_namespace_from_config() {
        let cfg = SessionConfig {
            namespace: "bop20-council".to_string(),
            ..SessionConfig::default()
        };
        assert_eq!(LocalBus::from_config(&cfg).namespace(), "bop20-council");
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = LocalBus::new("ns");
        let (sub, seen) = counter(&bus, "session");
        bus.unsubscribe(&sub);
        bus.unsubscribe(&sub);
        bus.publish("session", &patch());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("session"), 0);
    }

    #[test]
    fn offline_publications_are_held_back() {
        let bus = LocalBus::new("ns");
        let (_sub, seen) = counter(&bus, "session");
        bus.set_online(false);
        bus.publish("session", &patch());
        bus.publish("session", &patch());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        bus.set_online(true);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
